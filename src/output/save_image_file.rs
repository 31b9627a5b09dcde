// 该文件是 SpaceGuard 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use image::{Rgb, RgbImage};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::Render,
  postprocess::Processed,
  url_path, url_query,
  utils::{
    ColorParseError, DISPLAY_BACKGROUND, LetterboxError, SizeParseError, letterbox_pad,
    parse_hex_color, parse_size,
  },
};

/// 保存标注后的图像；`display=WxH` 时先等比缩放填充到展示尺寸
pub struct SaveImageFileOutput {
  path: String,
  display: Option<(u32, u32)>,
  background: Rgb<u8>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("展示尺寸错误: {0}")]
  SizeError(#[from] SizeParseError),
  #[error("背景颜色错误: {0}")]
  ColorError(#[from] ColorParseError),
  #[error("缩放填充错误: {0}")]
  LetterboxError(#[from] LetterboxError),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let display = url_query(uri, "display")
      .map(|value| parse_size(&value))
      .transpose()?;
    let background = url_query(uri, "background")
      .map(|value| parse_hex_color(&value))
      .transpose()?
      .unwrap_or(DISPLAY_BACKGROUND);

    Ok(SaveImageFileOutput {
      path: url_path(uri),
      display,
      background,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      display: None,
      background: DISPLAY_BACKGROUND,
    }
  }

  pub fn with_display(mut self, size: (u32, u32), background: Rgb<u8>) -> Self {
    self.display = Some(size);
    self.background = background;
    self
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    match self.display {
      Some(size) => letterbox_pad(image, size, self.background)?.save(&self.path)?,
      None => image.save(&self.path)?,
    }

    warn!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

impl Render<Processed> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, _frame: &Frame, result: &Processed) -> Result<(), Self::Error> {
    self.save_image(&result.annotated)
  }
}
