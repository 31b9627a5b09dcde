// 该文件是 SpaceGuard 项目的一部分。
// src/model/replay.rs - 回放检测器：从 JSON 文件读取检测器原始输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassTable, DetectResult, Detector, RawBox, normalize_boxes},
  url_path, url_query,
};

const REPLAY_DEFAULT_CONFIDENCE: f32 = 0.25;

#[derive(Error, Debug)]
pub enum ReplayDetectorError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("无效的置信度阈值: {0}")]
  InvalidConfidence(String),
}

/// 检测器原始输出文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
  #[serde(default)]
  pub names: ClassTable,
  #[serde(default)]
  pub boxes: Vec<RawBox>,
}

/// 回放检测器。每次推理都返回同一份记录下来的原始输出，
/// 按检测器自身的置信度阈值过滤，坐标不做任何校验。
#[derive(Debug, Clone)]
pub struct ReplayDetector {
  document: RawDocument,
  confidence: f32,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayDetectorError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let confidence = match url_query(url, "confidence") {
      Some(value) => value
        .parse::<f32>()
        .map_err(|_| ReplayDetectorError::InvalidConfidence(value))?,
      None => REPLAY_DEFAULT_CONFIDENCE,
    };

    let path = url_path(url);
    info!("加载检测记录: {}", path);
    let data = std::fs::read(&path)?;
    let document: RawDocument = serde_json::from_slice(&data)?;
    debug!(
      "检测记录包含 {} 个类别, {} 个候选框",
      document.names.len(),
      document.boxes.len()
    );

    Ok(Self::new(document).with_confidence(confidence))
  }
}

impl ReplayDetector {
  pub fn new(document: RawDocument) -> Self {
    Self {
      document,
      confidence: REPLAY_DEFAULT_CONFIDENCE,
    }
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn class_table(&self) -> &ClassTable {
    &self.document.names
  }
}

impl Detector for ReplayDetector {
  type Error = std::convert::Infallible;

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    debug!("回放检测: 图像尺寸 {}x{}", image.width(), image.height());
    // NaN 置信度不在此处剔除，留给后处理
    let items = normalize_boxes(&self.document.boxes)
      .into_iter()
      .filter(|det| det.confidence.is_nan() || det.confidence >= self.confidence)
      .collect();

    Ok(DetectResult::new(items, self.document.names.clone()))
  }
}
