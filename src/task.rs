// 该文件是 SpaceGuard 项目的一部分。
// src/task.rs - 推理任务
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{
  frame::Frame,
  model::Detector,
  output::Render,
  postprocess::{Processed, ResultPostprocessor},
};

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    detector: D,
    postprocessor: &ResultPostprocessor,
    output: O,
  ) -> Result<TaskReport, Self::Error>;
}

/// 任务统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskReport {
  pub frames: usize,
  pub detections: usize,
  pub inference_time: Duration,
}

impl TaskReport {
  /// 平均每帧推理时间，没有处理任何帧时为 `None`
  pub fn average_inference_time(&self) -> Option<Duration> {
    (self.frames > 0).then(|| self.inference_time.div_f64(self.frames as f64))
  }
}

fn process_frame<D, O, DE, RE>(
  frame: &Frame,
  detector: &D,
  postprocessor: &ResultPostprocessor,
  output: &O,
) -> anyhow::Result<(Processed, Duration)>
where
  D: Detector<Error = DE>,
  O: Render<Processed, Error = RE>,
  DE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
{
  let now = Instant::now();
  let result = detector.detect(&frame.image)?;
  let elapsed = now.elapsed();
  let processed = postprocessor.process(&frame.image, &result);
  output.render_result(frame, &processed)?;
  Ok((processed, elapsed))
}

fn log_summary(frame: &Frame, processed: &Processed) {
  if processed.summary.is_empty() {
    info!("帧 {} ({}): 未检测到目标", frame.index, frame.source);
    return;
  }
  for entry in processed.summary.report() {
    info!(
      "帧 {} ({}): {} x{}，平均置信度 {:.2}",
      frame.index, frame.source, entry.class_name, entry.count, entry.avg_confidence
    );
  }
}

/// 只处理第一帧
pub struct OneShotTask;

impl<I, D, O, DE, RE> Task<I, D, O> for OneShotTask
where
  I: Iterator<Item = Frame>,
  D: Detector<Error = DE>,
  O: Render<Processed, Error = RE>,
  DE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    detector: D,
    postprocessor: &ResultPostprocessor,
    output: O,
  ) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let (processed, elapsed) = process_frame(&frame, &detector, postprocessor, &output)?;
    info!("推理完成，耗时: {:.2?}", elapsed);
    log_summary(&frame, &processed);

    Ok(TaskReport {
      frames: 1,
      detections: processed.detections.len(),
      inference_time: elapsed,
    })
  }
}

/// 依次处理所有帧
#[derive(Default, Debug)]
pub struct BatchTask {
  frame_number: Option<usize>,
}

impl BatchTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<I, D, O, DE, RE> Task<I, D, O> for BatchTask
where
  I: Iterator<Item = Frame>,
  D: Detector<Error = DE>,
  O: Render<Processed, Error = RE>,
  DE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    detector: D,
    postprocessor: &ResultPostprocessor,
    output: O,
  ) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let mut report = TaskReport::default();

    for frame in input {
      if self.frame_number.is_some_and(|n| report.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", report.frames);
        break;
      }

      info!("处理第 {} 帧图像: {}", frame.index, frame.source);
      let (processed, elapsed) = process_frame(&frame, &detector, postprocessor, &output)?;
      info!("推理完成，耗时: {:.2?}", elapsed);
      log_summary(&frame, &processed);

      report.frames += 1;
      report.detections += processed.detections.len();
      report.inference_time += elapsed;
    }

    match report.average_inference_time() {
      Some(average) => warn!(
        "共处理 {} 帧，检测到 {} 个目标，平均推理时间: {:.2?}",
        report.frames, report.detections, average
      ),
      None => warn!("没有可处理的输入帧"),
    }

    info!("任务完成，退出");
    Ok(report)
  }
}
