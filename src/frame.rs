// 该文件是 SpaceGuard 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

/// 一帧已解码的 RGB 图像
#[derive(Debug, Clone)]
pub struct Frame {
  pub index: usize,
  /// 来源名称（通常是文件名）
  pub source: String,
  pub image: RgbImage,
}

impl Frame {
  pub fn new(index: usize, source: impl Into<String>, image: RgbImage) -> Self {
    Self {
      index,
      source: source.into(),
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 去掉扩展名的来源名称
  pub fn stem(&self) -> &str {
    let name = self
      .source
      .rsplit(['/', '\\'])
      .next()
      .unwrap_or(&self.source);
    match name.rsplit_once('.') {
      Some((stem, _)) if !stem.is_empty() => stem,
      _ => name,
    }
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::new(0, "memory", image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stem_strips_directory_and_extension() {
    let frame = Frame::new(0, "/data/test/images/0001.jpg", RgbImage::new(1, 1));
    assert_eq!(frame.stem(), "0001");
    assert_eq!(Frame::new(0, ".hidden", RgbImage::new(1, 1)).stem(), ".hidden");
    assert_eq!(Frame::from(RgbImage::new(2, 3)).stem(), "memory");
  }
}
