// 该文件是 Xiaotu （小图） 项目的一部分。
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<TaskSummary, Self::Error>;
}

/// 任务结束时的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSummary {
  pub frames: usize,
  pub mean_latency: Option<Duration>,
}

fn mean(times: &[Duration]) -> Option<Duration> {
  if times.is_empty() {
    return None;
  }
  let total: f64 = times.iter().map(Duration::as_secs_f64).sum();
  Some(average(total, times.len()))
}

fn average(total_secs: f64, count: usize) -> Duration {
  Duration::from_secs_f64(total_secs / count as f64)
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: IntoIterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input
      .into_iter()
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;

    Ok(TaskSummary {
      frames: 1,
      mean_latency: Some(elapsed),
    })
  }
}

/// 对第一张图像重复分类，统计平均耗时
pub struct RepeatShotTask {
  repeat_times: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat_times: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times;
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: IntoIterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input
      .into_iter()
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat_times);
    for i in 0..self.repeat_times {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    // 预热轮次不计入平均值
    let measured = if times.len() > self.warmup {
      &times[self.warmup..]
    } else {
      &times[..]
    };
    let mean_latency = mean(measured);
    if let Some(mean_latency) = mean_latency {
      warn!("平均推理时间: {:.2?}", mean_latency);
    }

    Ok(TaskSummary {
      frames: times.len(),
      mean_latency,
    })
  }
}

/// 逐张处理所有输入，直到输入耗尽、达到指定数量或收到中断信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 使用外部停止标志代替 Ctrl-C 处理器
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn stop_flag(&self) -> anyhow::Result<Arc<AtomicBool>> {
    if let Some(stop) = &self.stop {
      return Ok(stop.clone());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      handler_stop.store(true, Ordering::SeqCst);
    })?;
    Ok(stop)
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: IntoIterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let stop = self.stop_flag()?;

    let mut frame_index = 0;
    let mut times = Vec::new();
    for frame in input {
      if stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      frame_index += 1;
      info!("处理第 {} 张图像", frame_index);
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      times.push(elapsed_a);
      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定数量 {}, 退出任务循环", frame_index);
        break;
      }
    }

    info!("任务完成，共处理 {} 张图像", frame_index);
    Ok(TaskSummary {
      frames: frame_index,
      mean_latency: mean(&times),
    })
  }
}
