// 该文件是 SpaceGuard 项目的一部分。
// src/model/raw.rs - 检测器原始输出的规整
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::Detection;

/// 检测器序列化出的数值：可能是裸数字，也可能被包在张量形式的数组里，
/// 例如 `0.9`、`[0.9]` 或 `[[0.9]]`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
  Number(f64),
  Boxed(Vec<RawValue>),
  Other(serde_json::Value),
}

impl RawValue {
  /// 取出单个数值，多层单元素数组会被逐层拆开
  pub fn scalar(&self) -> Option<f64> {
    match self {
      RawValue::Number(n) => Some(*n),
      RawValue::Boxed(values) if values.len() == 1 => values[0].scalar(),
      _ => None,
    }
  }

  /// 展平为数值序列；遇到非数值则整体失败
  pub fn numbers(&self) -> Option<Vec<f64>> {
    let mut out = Vec::new();
    self.collect_numbers(&mut out)?;
    Some(out)
  }

  fn collect_numbers(&self, out: &mut Vec<f64>) -> Option<()> {
    match self {
      RawValue::Number(n) => out.push(*n),
      RawValue::Boxed(values) => {
        for value in values {
          value.collect_numbers(out)?;
        }
      }
      RawValue::Other(_) => return None,
    }
    Some(())
  }
}

impl From<f64> for RawValue {
  fn from(n: f64) -> Self {
    RawValue::Number(n)
  }
}

/// 检测器输出的一个原始候选框
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBox {
  #[serde(default, alias = "class_id", alias = "class")]
  pub cls: Option<RawValue>,
  #[serde(default, alias = "confidence", alias = "score")]
  pub conf: Option<RawValue>,
  #[serde(default, alias = "bbox")]
  pub xyxy: Option<RawValue>,
}

impl RawBox {
  /// 规整为 [`Detection`]；字段缺失、非数值、类别编号为负或坐标非有限值时返回 `None`
  pub fn normalize(&self) -> Option<Detection> {
    let class_id = self.cls.as_ref()?.scalar()?;
    if !class_id.is_finite() || class_id < 0.0 || class_id > u32::MAX as f64 {
      return None;
    }

    // 置信度允许越界或 NaN，交由后处理过滤
    let confidence = self.conf.as_ref()?.scalar()? as f32;

    let coords = self.xyxy.as_ref()?.numbers()?;
    if coords.len() != 4 || coords.iter().any(|c| !c.is_finite()) {
      return None;
    }

    Some(Detection::new(
      class_id as u32,
      confidence,
      [
        coords[0] as f32,
        coords[1] as f32,
        coords[2] as f32,
        coords[3] as f32,
      ],
    ))
  }
}

impl From<Detection> for RawBox {
  fn from(det: Detection) -> Self {
    RawBox {
      cls: Some(RawValue::Number(det.class_id as f64)),
      conf: Some(RawValue::Number(det.confidence as f64)),
      xyxy: Some(RawValue::Boxed(
        det.bbox.iter().map(|c| RawValue::Number(*c as f64)).collect(),
      )),
    }
  }
}

/// 逐个规整候选框，丢弃格式错误的条目，保持原有顺序
pub fn normalize_boxes(raw: &[RawBox]) -> Vec<Detection> {
  raw
    .iter()
    .enumerate()
    .filter_map(|(index, raw_box)| {
      let det = raw_box.normalize();
      if det.is_none() {
        debug!("丢弃格式错误的候选框 #{}: {:?}", index, raw_box);
      }
      det
    })
    .collect()
}
