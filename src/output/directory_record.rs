// 该文件是 SpaceGuard 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{
    Render,
    json_response::{JsonResponseOutputError, write_response_file},
  },
  postprocess::Processed,
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录写入错误: {0}")]
  RecordError(#[from] JsonResponseOutputError),
}

/// 记录方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
  /// 保存标注后的图像
  Draw,
  /// 保存原图，并在旁边写入同名 `.json` 检测结果
  Record,
}

impl RecordMode {
  fn save_result(
    &self,
    path: &Path,
    frame: &Frame,
    result: &Processed,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      RecordMode::Draw => {
        result.annotated.save(path)?;
      }
      RecordMode::Record => {
        frame.image.save(path)?;
        write_response_file(&path.with_extension("json"), result, true)?;
      }
    };

    Ok(())
  }
}

/// 按日期分目录保存每一帧：`目录/YYYY/MM/DD/HH-MM-SS-XXXX.png`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  mode: RecordMode,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mode = if uri.query_pairs().any(|(k, _)| k == "record") {
      RecordMode::Record
    } else {
      RecordMode::Draw
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(url_path(uri), mode).with_always(always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, mode: RecordMode) -> Self {
    Self {
      directory: directory.into(),
      mode,
      frame_counter: Mutex::new(0),
      always: false,
    }
  }

  /// 没有检测结果的帧也保存
  pub fn with_always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn mode(&self) -> RecordMode {
    self.mode
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Processed> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &Processed) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("帧 {} 没有检测结果，跳过记录", frame.index);
      return Ok(());
    }

    let path = self.frame_path(Utc::now())?;
    debug!("记录帧 {} 到 {}", frame.index, path.display());
    self.mode.save_result(&path, frame, result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{ClassTable, DetectResult, Detection},
    output::draw::Draw,
    postprocess::ResultPostprocessor,
  };
  use image::RgbImage;

  fn processed(items: Vec<Detection>) -> (Frame, Processed) {
    let image = RgbImage::new(48, 48);
    let table: ClassTable = ["crack"].into_iter().collect();
    let processed = ResultPostprocessor::new(Draw::without_font())
      .process(&image, &DetectResult::new(items, table));
    (Frame::new(3, "frame.png", image), processed)
  }

  fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().and_then(|e| e.to_str()) == Some(ext) {
          found.push(path);
        }
      }
    }
    found
  }

  #[test]
  fn record_mode_writes_plain_image_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.mode(), RecordMode::Record);

    let (frame, result) = processed(vec![Detection::new(0, 0.9, [4.0, 20.0, 30.0, 40.0])]);
    output.render_result(&frame, &result).unwrap();

    let images = files_with_extension(dir.path(), "png");
    let records = files_with_extension(dir.path(), "json");
    assert_eq!(images.len(), 1);
    assert_eq!(records.len(), 1);
    assert_eq!(images[0].with_extension("json"), records[0]);

    let saved = image::open(&images[0]).unwrap().into_rgb8();
    assert_eq!(saved, frame.image);
  }

  #[test]
  fn empty_frames_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let (frame, result) = processed(vec![]);

    DirectoryRecordOutput::new(dir.path(), RecordMode::Draw)
      .render_result(&frame, &result)
      .unwrap();
    assert!(files_with_extension(dir.path(), "png").is_empty());

    DirectoryRecordOutput::new(dir.path(), RecordMode::Draw)
      .with_always(true)
      .render_result(&frame, &result)
      .unwrap();
    assert_eq!(files_with_extension(dir.path(), "png").len(), 1);
  }

  #[test]
  fn frame_ids_increase() {
    let output = DirectoryRecordOutput::new("/unused", RecordMode::Draw);
    assert_eq!(output.frame_id(), 1);
    assert_eq!(output.frame_id(), 2);
  }
}
