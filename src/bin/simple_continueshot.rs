// 该文件是 Xiaotu （小图） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续图像分类
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use tracing::info;
use xiaotu::{
  FromUrl,
  postprocess::SoftmaxMode,
  task::{ContinuousTask, Task},
};

/// Xiaotu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径，例如 onnx:///assets/model.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 folder:///data/thumbnails
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "console://")]
  pub output: Url,
  /// 标签表 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  #[arg(long, value_name = "MODE", default_value = "stable")]
  pub softmax: SoftmaxMode,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let classifier =
    xiaotu::pipeline::onnx_classifier(&args.model, args.labels.as_deref(), args.softmax)?;
  let input = xiaotu::input::InputWrapper::from_url(&args.input)?;
  let output = xiaotu::output::OutputWrapper::from_url(&args.output)?;

  let summary = ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input, &classifier, output)?;

  info!(
    "共处理 {} 张图像, 平均耗时: {:.2?}",
    summary.frames,
    summary.mean_latency.unwrap_or_default()
  );

  Ok(())
}
