// 该文件是 SpaceGuard 项目的一部分。
// src/postprocess.rs - 检测结果后处理：过滤、统计
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
use serde::{Serialize, ser::SerializeMap};
use tracing::debug;

use crate::{
  model::{ClassTable, DetectResult, Detection},
  output::draw::Draw,
};

pub const DEFAULT_MIN_AREA: f32 = 10.0;
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// 丢弃宽或高不为正、面积小于 `min_area` 的候选框，保持相对顺序
pub fn filter_valid(boxes: &[Detection], min_area: f32) -> Vec<Detection> {
  boxes
    .iter()
    .filter(|det| {
      let valid = det.is_valid(min_area);
      if !valid {
        debug!("丢弃退化候选框: {:?}", det.bbox);
      }
      valid
    })
    .copied()
    .collect()
}

/// 面积过滤后再按置信度和类别表过滤。面积过滤总是执行，与置信度阈值无关。
pub fn select(
  boxes: &[Detection],
  class_table: &ClassTable,
  min_area: f32,
  confidence: f32,
) -> Vec<Detection> {
  filter_valid(boxes, min_area)
    .into_iter()
    .filter(|det| det.passes_confidence(confidence))
    .filter(|det| {
      let known = class_table.name(det.class_id).is_some();
      if !known {
        debug!("丢弃未知类别 {} 的候选框", det.class_id);
      }
      known
    })
    .collect()
}

/// 单个类别的统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassStat {
  pub count: usize,
  pub confidence_sum: f64,
}

impl ClassStat {
  /// 算术平均置信度
  pub fn mean_confidence(&self) -> f64 {
    if self.count == 0 {
      0.0
    } else {
      self.confidence_sum / self.count as f64
    }
  }
}

/// 展示用的统计行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
  #[serde(rename = "class")]
  pub class_name: String,
  pub count: usize,
  pub avg_confidence: f64,
}

/// 类别名称 -> 统计，按首次出现的顺序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSummary {
  entries: Vec<(String, ClassStat)>,
}

impl DetectionSummary {
  fn record(&mut self, class_name: &str, confidence: f32) {
    let index = match self.entries.iter().position(|(name, _)| name == class_name) {
      Some(index) => index,
      None => {
        self
          .entries
          .push((class_name.to_string(), ClassStat::default()));
        self.entries.len() - 1
      }
    };
    let stat = &mut self.entries[index].1;
    stat.count += 1;
    stat.confidence_sum += confidence as f64;
  }

  pub fn get(&self, class_name: &str) -> Option<&ClassStat> {
    self
      .entries
      .iter()
      .find(|(name, _)| name == class_name)
      .map(|(_, stat)| stat)
  }

  pub fn count(&self, class_name: &str) -> usize {
    self.get(class_name).map(|stat| stat.count).unwrap_or(0)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassStat)> {
    self.entries.iter().map(|(name, stat)| (name.as_str(), stat))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(name, _)| name.as_str())
  }

  /// 所有类别的检测数之和
  pub fn total(&self) -> usize {
    self.entries.iter().map(|(_, stat)| stat.count).sum()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn report(&self) -> Vec<SummaryEntry> {
    self
      .iter()
      .map(|(name, stat)| SummaryEntry {
        class_name: name.to_string(),
        count: stat.count,
        avg_confidence: stat.mean_confidence(),
      })
      .collect()
  }
}

// 序列化为 {类别: 数量}，保持插入顺序
impl Serialize for DetectionSummary {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (name, stat) in &self.entries {
      map.serialize_entry(name, &stat.count)?;
    }
    map.end()
  }
}

/// 统计已过滤的检测结果，总数总是等于输入长度。
/// 类别表中查不到的编号记为 `Class_{id}`。
pub fn summarize(valid_boxes: &[Detection], class_table: &ClassTable) -> DetectionSummary {
  let mut summary = DetectionSummary::default();
  for det in valid_boxes {
    match class_table.name(det.class_id) {
      Some(name) => summary.record(name, det.confidence),
      None => {
        debug!("未知类别 {}，按编号统计", det.class_id);
        summary.record(&fallback_class_name(det.class_id), det.confidence);
      }
    }
  }
  summary
}

fn fallback_class_name(class_id: u32) -> String {
  format!("Class_{}", class_id)
}

/// 接口返回的一条检测记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  #[serde(rename = "class")]
  pub class_name: String,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

/// `{"detections": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionResponse {
  pub detections: Vec<DetectionRecord>,
}

impl DetectionResponse {
  pub fn new(detections: &[Detection], class_table: &ClassTable) -> Self {
    let detections = detections
      .iter()
      .filter_map(|det| {
        class_table.name(det.class_id).map(|name| DetectionRecord {
          class_name: name.to_string(),
          confidence: det.confidence,
          bbox: det.bbox,
        })
      })
      .collect();
    Self { detections }
  }
}

/// 一次后处理的全部产出
#[derive(Debug, Clone)]
pub struct Processed {
  pub detections: Vec<Detection>,
  pub class_table: ClassTable,
  pub summary: DetectionSummary,
  pub annotated: RgbImage,
}

impl Processed {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  pub fn response(&self) -> DetectionResponse {
    DetectionResponse::new(&self.detections, &self.class_table)
  }
}

/// 检测结果后处理器
/// 面积阈值只保存在 `Draw` 中，过滤与绘制共用同一个值。
pub struct ResultPostprocessor {
  confidence: f32,
  draw: Draw,
}

impl Default for ResultPostprocessor {
  fn default() -> Self {
    Self::new(Draw::default())
  }
}

impl ResultPostprocessor {
  pub fn new(draw: Draw) -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE,
      draw,
    }
  }

  pub fn with_min_area(mut self, min_area: f32) -> Self {
    self.draw = self.draw.with_min_area(min_area);
    self
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn min_area(&self) -> f32 {
    self.draw.min_area()
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn draw(&self) -> &Draw {
    &self.draw
  }

  pub fn process(&self, image: &RgbImage, result: &DetectResult) -> Processed {
    let detections = select(
      &result.items,
      &result.class_table,
      self.min_area(),
      self.confidence,
    );
    debug!(
      "后处理: {} 个候选框, 保留 {} 个",
      result.items.len(),
      detections.len()
    );

    let summary = summarize(&detections, &result.class_table);
    let annotated = self
      .draw
      .draw_on_copy(image, &detections, &result.class_table);

    Processed {
      detections,
      class_table: result.class_table.clone(),
      summary,
      annotated,
    }
  }
}
