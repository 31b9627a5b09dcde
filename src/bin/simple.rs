// 该文件是 SpaceGuard 项目的一部分。
// src/bin/simple.rs - 单张图像检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use spaceguard::{
  FromUrl,
  input::InputWrapper,
  model::ReplayDetector,
  output::{OutputWrapper, draw::Draw},
  postprocess::{DEFAULT_CONFIDENCE, DEFAULT_MIN_AREA, ResultPostprocessor},
  task::{OneShotTask, Task},
};
use tracing::info;

/// SpaceGuard 单张图像检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器（replay:///path/raw.json）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源（image:///path.jpg）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，可重复（image:///out.png、json:///out.json、json:-）
  #[arg(long, value_name = "OUTPUT", required = true)]
  pub output: Vec<Url>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 检测框最小面积（像素²）
  #[arg(long, default_value_t = DEFAULT_MIN_AREA, value_name = "AREA")]
  pub min_area: f32,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 把标签限制在画布内
  #[arg(long)]
  pub clamp_labels: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测器: {}", args.model);
  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出路径: {}", output);
  }
  info!("置信度阈值: {}, 最小面积: {}", args.confidence, args.min_area);

  let draw = match &args.font {
    Some(path) => Draw::with_font_path(path)?,
    None => Draw::default(),
  }
  .with_clamped_labels(args.clamp_labels);
  let postprocessor = ResultPostprocessor::new(draw)
    .with_min_area(args.min_area)
    .with_confidence(args.confidence);

  let input = InputWrapper::from_url(&args.input)?;
  let detector = ReplayDetector::from_url(&args.model)?;
  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  let report = OneShotTask.run_task(input, detector, &postprocessor, outputs)?;
  info!("检测到 {} 个目标", report.detections);

  Ok(())
}
