// 该文件是 SpaceGuard 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  model::{ClassTable, Detection},
  postprocess::{DEFAULT_MIN_AREA, select},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（无字体时的粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: u32 = 2;
const PALETTE_SIZE: usize = 80;
// 像素坐标限制在此范围内，避免极端坐标溢出
const COORD_LIMIT: f32 = (1 << 20) as f32;

const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无法解析字体文件: {0}")]
  InvalidFont(String),
}

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  thickness: u32,
  min_area: f32,
  clamp_labels: bool,
  colors: Vec<Rgb<u8>>,
  text_color: Rgb<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    let font = match FontArc::try_from_slice(EMBEDDED_FONT) {
      Ok(font) => Some(font),
      Err(e) => {
        warn!("内置字体解析失败: {}，标签将只绘制背景", e);
        None
      }
    };
    Self::new(font)
  }
}

impl Draw {
  pub fn new(font: Option<FontArc>) -> Self {
    // 每个类别一种颜色（色相均分）
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      thickness: BOX_THICKNESS,
      min_area: DEFAULT_MIN_AREA,
      clamp_labels: false,
      colors,
      text_color: Rgb([255, 255, 255]),
    }
  }

  pub fn without_font() -> Self {
    Self::new(None)
  }

  pub fn with_font_path(path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|_| DrawError::InvalidFont(path.display().to_string()))?;
    Ok(Self::new(Some(font)))
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn with_min_area(mut self, min_area: f32) -> Self {
    self.min_area = min_area;
    self
  }

  /// 是否把标签限制在画布内。默认不限制：贴着上边缘的框，标签会落到画布外。
  pub fn with_clamped_labels(mut self, clamp: bool) -> Self {
    self.clamp_labels = clamp;
    self
  }

  pub fn min_area(&self) -> f32 {
    self.min_area
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 对原始候选框做面积、置信度过滤后绘制到图像副本上，输入图像不会被修改
  pub fn render(
    &self,
    image: &RgbImage,
    boxes: &[Detection],
    class_table: &ClassTable,
    conf_threshold: f32,
  ) -> RgbImage {
    let detections = select(boxes, class_table, self.min_area, conf_threshold);
    self.draw_on_copy(image, &detections, class_table)
  }

  /// 绘制已过滤的检测结果到图像副本上
  pub fn draw_on_copy(
    &self,
    image: &RgbImage,
    detections: &[Detection],
    class_table: &ClassTable,
  ) -> RgbImage {
    let mut annotated = image.clone();
    self.draw_detections_on_image(&mut annotated, detections, class_table);
    annotated
  }

  pub fn draw_detections_on_image(
    &self,
    image: &mut RgbImage,
    detections: &[Detection],
    class_table: &ClassTable,
  ) {
    for det in detections {
      match class_table.name(det.class_id) {
        Some(name) => self.draw_bbox_with_label(image, det, name),
        None => debug!("跳过未知类别 {} 的检测框", det.class_id),
      }
    }
  }

  /// 标签文本的像素尺寸 (宽, 高)，包括上下留白
  fn label_extent(&self, label: &str) -> (i32, i32) {
    match &self.font {
      Some(font) => {
        let (w, h) = text_size(PxScale::from(self.font_size), font, label);
        (
          w as i32,
          (h as i32 + 2 * self.label_text_vertical_padding).max(self.label_text_height),
        )
      }
      None => (
        (label.chars().count() as f32 * self.label_char_width) as i32,
        self.label_text_height,
      ),
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, det: &Detection, name: &str) {
    let color = self.color_of(det.class_id);
    let [x_min, y_min, x_max, y_max] = det.bbox.map(to_pixel);

    // 边框，(x_min, y_min)-(x_max, y_max) 两端都包含
    let width = (x_max - x_min + 1).max(1);
    let height = (y_max - y_min + 1).max(1);
    for t in 0..self.thickness as i32 {
      let (w, h) = (width - 2 * t, height - 2 * t);
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!("{} {:.2}", name, det.confidence);
    let (text_width, text_height) = self.label_extent(&label);
    if text_width <= 0 || text_height <= 0 {
      return;
    }

    // 标签背景紧贴边框上沿
    let mut label_x = x_min;
    let mut label_y = y_min - text_height;
    if self.clamp_labels {
      label_x = label_x.min(image.width() as i32 - text_width).max(0);
      label_y = label_y.max(0);
    }

    // 超出画布的部分由 imageproc 裁剪
    let rect = Rect::at(label_x, label_y).of_size(text_width as u32, text_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        self.text_color,
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}

fn to_pixel(v: f32) -> i32 {
  v.clamp(-COORD_LIMIT, COORD_LIMIT) as i32
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

  fn table() -> ClassTable {
    ["crack", "leak"].into_iter().collect()
  }

  fn patterned(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([(x % 251) as u8, (y % 251) as u8, 7]))
  }

  #[test]
  fn render_does_not_touch_input() {
    let image = patterned(96, 96);
    let before = image.clone();
    let boxes = vec![Detection::new(0, 0.9, [10.0, 40.0, 50.0, 80.0])];

    let annotated = Draw::without_font().render(&image, &boxes, &table(), 0.25);

    assert_eq!(image.as_raw(), before.as_raw());
    assert_ne!(annotated.as_raw(), image.as_raw());
    assert_eq!(annotated.dimensions(), image.dimensions());
  }

  #[test]
  fn empty_input_returns_unchanged_copy() {
    let image = patterned(32, 32);
    let annotated = Draw::without_font().render(&image, &[], &table(), 0.25);
    assert_eq!(annotated, image);
  }

  #[test]
  fn outline_is_drawn_with_class_color() {
    let draw = Draw::without_font();
    let image = RgbImage::new(64, 64);
    let boxes = vec![Detection::new(1, 0.9, [10.0, 30.0, 40.0, 60.0])];

    let annotated = draw.render(&image, &boxes, &table(), 0.25);
    let color = draw.color_of(1);

    assert_eq!(*annotated.get_pixel(10, 45), color);
    assert_eq!(*annotated.get_pixel(11, 45), color);
    assert_eq!(*annotated.get_pixel(40, 45), color);
    assert_eq!(*annotated.get_pixel(25, 60), color);
    // 边框内部保持原样
    assert_eq!(*annotated.get_pixel(12, 45), BLACK);
    assert_eq!(*annotated.get_pixel(25, 45), BLACK);
  }

  #[test]
  fn label_tag_sits_above_the_box() {
    let draw = Draw::without_font();
    let image = RgbImage::new(200, 100);
    let boxes = vec![Detection::new(0, 0.9, [10.0, 40.0, 60.0, 90.0])];

    let annotated = draw.render(&image, &boxes, &table(), 0.25);
    let color = draw.color_of(0);

    // "crack 0.90" 估算宽度 110，高度 24，位于 y ∈ [16, 40)
    assert_eq!(*annotated.get_pixel(100, 20), color);
    assert_eq!(*annotated.get_pixel(119, 39), color);
    assert_eq!(*annotated.get_pixel(121, 20), BLACK);
    assert_eq!(*annotated.get_pixel(100, 10), BLACK);
  }

  #[test]
  fn label_at_top_edge_is_off_canvas_by_default() {
    let draw = Draw::without_font();
    let image = RgbImage::new(200, 100);
    let boxes = vec![Detection::new(0, 0.9, [10.0, 0.0, 60.0, 50.0])];

    let annotated = draw.render(&image, &boxes, &table(), 0.25);
    assert_eq!(*annotated.get_pixel(30, 10), BLACK);
    assert_eq!(*annotated.get_pixel(100, 5), BLACK);
  }

  #[test]
  fn clamped_label_stays_on_canvas() {
    let draw = Draw::without_font().with_clamped_labels(true);
    let image = RgbImage::new(200, 100);
    let boxes = vec![Detection::new(0, 0.9, [10.0, 0.0, 60.0, 50.0])];

    let annotated = draw.render(&image, &boxes, &table(), 0.25);
    let color = draw.color_of(0);
    assert_eq!(*annotated.get_pixel(30, 10), color);
    assert_eq!(*annotated.get_pixel(100, 5), color);
  }

  #[test]
  fn filtered_candidates_are_not_drawn() {
    let image = patterned(64, 64);
    let boxes = vec![
      // 零宽度但高置信度
      Detection::new(0, 0.99, [5.0, 5.0, 5.0, 40.0]),
      // 低置信度
      Detection::new(0, 0.1, [10.0, 30.0, 40.0, 60.0]),
      // NaN 置信度
      Detection::new(0, f32::NAN, [10.0, 30.0, 40.0, 60.0]),
      // 未知类别
      Detection::new(42, 0.9, [10.0, 30.0, 40.0, 60.0]),
    ];

    let annotated = Draw::without_font().render(&image, &boxes, &table(), 0.25);
    assert_eq!(annotated, image);
  }

  #[test]
  fn boxes_beyond_canvas_are_clipped() {
    let image = RgbImage::new(32, 32);
    let boxes = vec![Detection::new(0, 0.9, [-100.0, 20.0, 1.0e9, 1.0e9])];
    let annotated = Draw::without_font().render(&image, &boxes, &table(), 0.25);
    assert_eq!(annotated.dimensions(), (32, 32));
  }

  #[test]
  fn palette_cycles_per_class() {
    let draw = Draw::without_font();
    assert_eq!(draw.color_of(3), draw.color_of(3 + PALETTE_SIZE as u32));
    assert_ne!(draw.color_of(0), draw.color_of(1));
  }

  #[test]
  fn default_draw_writes_label_text_inside_measured_tag() {
    let draw = Draw::default();
    assert!(draw.has_font());
    let font = draw.font.clone().unwrap();

    let image = RgbImage::new(240, 140);
    let boxes = vec![Detection::new(0, 0.9, [20.0, 60.0, 140.0, 110.0])];
    let annotated = draw.render(&image, &boxes, &table(), 0.25);
    let color = draw.color_of(0);

    let (text_w, text_h) = text_size(PxScale::from(LABEL_FONT_SIZE), &font, "crack 0.90");
    let tag_w = text_w as i32;
    let tag_h = (text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING).max(LABEL_TEXT_HEIGHT);
    let (tag_x, tag_y) = (20, 60 - tag_h);
    let in_tag = |x: i32, y: i32| {
      (tag_x..tag_x + tag_w).contains(&x) && (tag_y..tag_y + tag_h).contains(&y)
    };

    // 标签首行只有背景色，宽度与字体测量一致
    for x in tag_x..tag_x + tag_w {
      assert_eq!(*annotated.get_pixel(x as u32, tag_y as u32), color);
    }
    assert_eq!(*annotated.get_pixel((tag_x + tag_w) as u32, tag_y as u32), BLACK);
    assert_eq!(*annotated.get_pixel((tag_x - 1) as u32, tag_y as u32), BLACK);
    assert_eq!(*annotated.get_pixel(tag_x as u32, (tag_y - 1) as u32), BLACK);

    let mut text_pixels = 0;
    for (x, y, pixel) in annotated.enumerate_pixels() {
      let (x, y) = (x as i32, y as i32);
      if in_tag(x, y) {
        // 白色文字与背景混合后绿色分量明显升高
        if pixel[1] > 150 {
          text_pixels += 1;
        }
      } else {
        assert!(
          *pixel == BLACK || *pixel == color,
          "标签外出现文字像素 ({}, {}): {:?}",
          x,
          y,
          pixel
        );
      }
    }
    assert!(text_pixels > 0);
  }

  #[test]
  fn without_font_has_no_text() {
    assert!(!Draw::without_font().has_font());
  }
}
