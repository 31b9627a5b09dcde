// 该文件是 SpaceGuard 项目的一部分。
// src/utils.rs - 图像工具：等比缩放填充（letterbox）、颜色解析
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

use image::{Rgb, RgbImage, imageops};
use thiserror::Error;

use crate::model::Detection;

/// 展示区域默认尺寸
pub const DISPLAY_SIZE: (u32, u32) = (800, 450);
/// 展示背景色 #0b0c10
pub const DISPLAY_BACKGROUND: Rgb<u8> = Rgb([0x0b, 0x0c, 0x10]);
/// 预处理时使用的灰色背景
pub const PREPROCESS_BACKGROUND: Rgb<u8> = Rgb([114, 114, 114]);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LetterboxError {
  #[error("输入图像为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("目标尺寸为空: {0}x{1}")]
  EmptyTarget(u32, u32),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ColorParseError {
  #[error("无效的颜色: {0}, 期望 #rrggbb")]
  InvalidColor(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SizeParseError {
  #[error("无效的尺寸: {0}, 期望 WxH")]
  InvalidSize(String),
}

/// 原图坐标到填充画布坐标的映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  pub scaled_width: u32,
  pub scaled_height: u32,
  pub offset_x: u32,
  pub offset_y: u32,
  pub scale_x: f32,
  pub scale_y: f32,
}

impl LetterboxTransform {
  pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
    (
      x * self.scale_x + self.offset_x as f32,
      y * self.scale_y + self.offset_y as f32,
    )
  }

  pub fn map_bbox(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (x1, y1) = self.map_point(bbox[0], bbox[1]);
    let (x2, y2) = self.map_point(bbox[2], bbox[3]);
    [x1, y1, x2, y2]
  }

  pub fn map_detection(&self, det: &Detection) -> Detection {
    Detection {
      bbox: self.map_bbox(det.bbox),
      ..*det
    }
  }
}

/// 计算等比缩放后的尺寸与居中偏移。缩放尺寸用整数运算向下取整，至少 1 像素；
/// 偏移为 `((W - sw) / 2, (H - sh) / 2)`，余数为奇数时偏向左上。
pub fn letterbox_transform(
  source: (u32, u32),
  target: (u32, u32),
) -> Result<LetterboxTransform, LetterboxError> {
  let (width, height) = source;
  let (target_width, target_height) = target;
  if width == 0 || height == 0 {
    return Err(LetterboxError::EmptyImage(width, height));
  }
  if target_width == 0 || target_height == 0 {
    return Err(LetterboxError::EmptyTarget(target_width, target_height));
  }

  // scale = min(W / w, H / h)，比较 W * h 与 H * w 避免浮点误差
  let (w, h, tw, th) = (
    width as u64,
    height as u64,
    target_width as u64,
    target_height as u64,
  );
  let (scaled_width, scaled_height) = if tw * h <= th * w {
    (tw, (h * tw / w).max(1))
  } else {
    ((w * th / h).max(1), th)
  };
  let (scaled_width, scaled_height) = (scaled_width as u32, scaled_height as u32);

  Ok(LetterboxTransform {
    scaled_width,
    scaled_height,
    offset_x: (target_width - scaled_width) / 2,
    offset_y: (target_height - scaled_height) / 2,
    scale_x: scaled_width as f32 / width as f32,
    scale_y: scaled_height as f32 / height as f32,
  })
}

/// 等比缩放到 `target` 内（不裁剪），居中放置，其余区域用 `background` 填充
pub fn letterbox_pad(
  image: &RgbImage,
  target: (u32, u32),
  background: Rgb<u8>,
) -> Result<RgbImage, LetterboxError> {
  letterbox_pad_with_transform(image, target, background).map(|(canvas, _)| canvas)
}

pub fn letterbox_pad_with_transform(
  image: &RgbImage,
  target: (u32, u32),
  background: Rgb<u8>,
) -> Result<(RgbImage, LetterboxTransform), LetterboxError> {
  let transform = letterbox_transform(image.dimensions(), target)?;

  let resized = if (transform.scaled_width, transform.scaled_height) == image.dimensions() {
    image.clone()
  } else {
    imageops::resize(
      image,
      transform.scaled_width,
      transform.scaled_height,
      imageops::FilterType::Triangle,
    )
  };

  let mut canvas = RgbImage::from_pixel(target.0, target.1, background);
  imageops::replace(
    &mut canvas,
    &resized,
    transform.offset_x as i64,
    transform.offset_y as i64,
  );

  Ok((canvas, transform))
}

/// 解析 `#rrggbb` 或 `rrggbb`
pub fn parse_hex_color(s: &str) -> Result<Rgb<u8>, ColorParseError> {
  let hex = s.trim().trim_start_matches('#');
  if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
    return Err(ColorParseError::InvalidColor(s.to_string()));
  }
  let channel = |i: usize| {
    u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ColorParseError::InvalidColor(s.to_string()))
  };
  Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// 解析 `800x450`
pub fn parse_size(s: &str) -> Result<(u32, u32), SizeParseError> {
  let invalid = || SizeParseError::InvalidSize(s.to_string());
  let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
  let w = w.trim().parse::<u32>().map_err(|_| invalid())?;
  let h = h.trim().parse::<u32>().map_err(|_| invalid())?;
  if w == 0 || h == 0 {
    return Err(invalid());
  }
  Ok((w, h))
}
