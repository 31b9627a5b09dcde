// 该文件是 SpaceGuard 项目的一部分。
// src/output/json_response.rs - JSON 检测结果输出
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

use std::{
  io::Write,
  path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::Render,
  postprocess::{DetectionResponse, Processed, SummaryEntry},
  url_path, url_query,
};

#[derive(Error, Debug)]
pub enum JsonResponseOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JsonDocument {
  #[serde(flatten)]
  response: DetectionResponse,
  #[serde(skip_serializing_if = "Option::is_none")]
  summary: Option<Vec<SummaryEntry>>,
}

/// 检测结果写入位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonTarget {
  Stdout,
  File(PathBuf),
}

/// 以 `{"detections": [...]}` 格式输出检测结果，`json:-` 写到标准输出
pub struct JsonResponseOutput {
  target: JsonTarget,
  with_summary: bool,
}

impl FromUrlWithScheme for JsonResponseOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonResponseOutput {
  type Error = JsonResponseOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonResponseOutputError::SchemeMismatch);
    }

    let path = url_path(url);
    let target = if path == "-" || path.is_empty() {
      JsonTarget::Stdout
    } else {
      JsonTarget::File(PathBuf::from(path))
    };
    let with_summary = url_query(url, "summary").is_some();

    Ok(JsonResponseOutput {
      target,
      with_summary,
    })
  }
}

impl JsonResponseOutput {
  pub fn new(target: JsonTarget) -> Self {
    Self {
      target,
      with_summary: false,
    }
  }

  pub fn with_summary(mut self, with_summary: bool) -> Self {
    self.with_summary = with_summary;
    self
  }

  pub fn target(&self) -> &JsonTarget {
    &self.target
  }
}

/// 把检测结果写成 JSON 文档
pub fn write_response<W: Write>(
  writer: W,
  result: &Processed,
  with_summary: bool,
) -> Result<(), JsonResponseOutputError> {
  let document = JsonDocument {
    response: result.response(),
    summary: with_summary.then(|| result.summary.report()),
  };
  serde_json::to_writer_pretty(writer, &document)?;
  Ok(())
}

pub(crate) fn write_response_file(
  path: &Path,
  result: &Processed,
  with_summary: bool,
) -> Result<(), JsonResponseOutputError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  let file = std::io::BufWriter::new(std::fs::File::create(path)?);
  write_response(file, result, with_summary)
}

impl Render<Processed> for JsonResponseOutput {
  type Error = JsonResponseOutputError;

  fn render_result(&self, frame: &Frame, result: &Processed) -> Result<(), Self::Error> {
    match &self.target {
      JsonTarget::Stdout => {
        let mut stdout = std::io::stdout().lock();
        write_response(&mut stdout, result, self.with_summary)?;
        writeln!(stdout)?;
      }
      JsonTarget::File(path) => {
        write_response_file(path, result, self.with_summary)?;
        info!(
          "帧 {} 的检测结果写入: {}",
          frame.source,
          path.display()
        );
      }
    }
    Ok(())
  }
}
