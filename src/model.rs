// 该文件是 SpaceGuard 项目的一部分。
// src/model.rs - 检测模型与检测结果定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 检测器：给定一帧图像，返回未经校验的候选框
pub trait Detector {
  type Error;

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error>;
}

/// 单个候选检测框，坐标为图像像素坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub confidence: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

impl Detection {
  pub fn new(class_id: u32, confidence: f32, bbox: [f32; 4]) -> Self {
    Self {
      class_id,
      confidence,
      bbox,
    }
  }

  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// 宽、高为正且面积不小于 `min_area`。NaN 坐标比较恒为假，因此视为无效。
  pub fn is_valid(&self, min_area: f32) -> bool {
    let (width, height) = (self.width(), self.height());
    width > 0.0 && height > 0.0 && width * height >= min_area
  }

  /// NaN 置信度视为不达标
  pub fn passes_confidence(&self, threshold: f32) -> bool {
    self.confidence >= threshold
  }
}

/// 类别表：class_id -> 类别名称
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClassTableRepr", into = "BTreeMap<String, String>")]
pub struct ClassTable {
  names: BTreeMap<u32, String>,
}

impl ClassTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(&class_id).map(String::as_str)
  }

  pub fn insert(&mut self, class_id: u32, name: impl Into<String>) {
    self.names.insert(class_id, name.into());
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
    self.names.iter().map(|(id, name)| (*id, name.as_str()))
  }
}

impl<S: Into<String>> FromIterator<S> for ClassTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let names = iter
      .into_iter()
      .enumerate()
      .map(|(id, name)| (id as u32, name.into()))
      .collect();
    Self { names }
  }
}

// 类别表在 JSON 中既可能是列表，也可能是以字符串为键的映射
#[derive(Deserialize)]
#[serde(untagged)]
enum ClassTableRepr {
  List(Vec<String>),
  Map(BTreeMap<String, String>),
}

impl TryFrom<ClassTableRepr> for ClassTable {
  type Error = String;

  fn try_from(repr: ClassTableRepr) -> Result<Self, Self::Error> {
    match repr {
      ClassTableRepr::List(names) => Ok(names.into_iter().collect()),
      ClassTableRepr::Map(map) => {
        let mut table = ClassTable::new();
        for (key, name) in map {
          let id = key
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("无效的类别编号: {}", key))?;
          table.insert(id, name);
        }
        Ok(table)
      }
    }
  }
}

impl From<ClassTable> for BTreeMap<String, String> {
  fn from(table: ClassTable) -> Self {
    table
      .names
      .into_iter()
      .map(|(id, name)| (id.to_string(), name))
      .collect()
  }
}

/// 检测器对一帧图像的输出
#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Vec<Detection>,
  pub class_table: ClassTable,
}

impl DetectResult {
  pub fn new(items: Vec<Detection>, class_table: ClassTable) -> Self {
    Self { items, class_table }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

pub mod raw;
pub use self::raw::{RawBox, RawValue, normalize_boxes};

#[cfg(feature = "replay_detector")]
mod replay;
#[cfg(feature = "replay_detector")]
pub use self::replay::{RawDocument, ReplayDetector, ReplayDetectorError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validity_follows_area_and_shape() {
    assert!(Detection::new(0, 0.9, [10.0, 10.0, 20.0, 20.0]).is_valid(10.0));
    // 零宽度
    assert!(!Detection::new(1, 0.99, [5.0, 5.0, 5.0, 8.0]).is_valid(10.0));
    // 反向坐标
    assert!(!Detection::new(0, 0.5, [20.0, 20.0, 10.0, 10.0]).is_valid(0.0));
    // 面积 2x4 = 8 < 10
    assert!(!Detection::new(0, 0.5, [0.0, 0.0, 2.0, 4.0]).is_valid(10.0));
    // 面积恰好等于阈值
    assert!(Detection::new(0, 0.5, [0.0, 0.0, 2.0, 5.0]).is_valid(10.0));
    assert!(!Detection::new(0, 0.5, [f32::NAN, 0.0, 20.0, 20.0]).is_valid(10.0));
  }

  #[test]
  fn nan_confidence_never_passes() {
    let det = Detection::new(0, f32::NAN, [0.0, 0.0, 10.0, 10.0]);
    assert!(!det.passes_confidence(0.0));
    assert!(Detection::new(0, 0.25, [0.0, 0.0, 10.0, 10.0]).passes_confidence(0.25));
  }

  #[test]
  fn class_table_accepts_list_and_map() {
    let list: ClassTable = serde_json::from_str(r#"["crack", "leak"]"#).unwrap();
    assert_eq!(list.name(0), Some("crack"));
    assert_eq!(list.name(1), Some("leak"));
    assert_eq!(list.name(2), None);

    let map: ClassTable = serde_json::from_str(r#"{"3": "toolbox", "0": "crack"}"#).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.name(3), Some("toolbox"));

    assert!(serde_json::from_str::<ClassTable>(r#"{"x": "bad"}"#).is_err());
  }
}
