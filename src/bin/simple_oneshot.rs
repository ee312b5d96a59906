// 该文件是 Xiaotu （小图） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像分类
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
  output::Render,
  postprocess::SoftmaxMode,
  task::{OneShotTask, Task},
};

/// Xiaotu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径，例如 onnx:///assets/model.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "console://")]
  pub output: Url,
  /// 标签表 JSON 文件，缺省使用内置的 17 个类别
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// softmax 模式: stable 或 unstabilized
  #[arg(long, value_name = "MODE", default_value = "stable")]
  pub softmax: SoftmaxMode,
  /// 额外输出概率最高的前 K 个类别
  #[arg(long, value_name = "K", default_value = "0")]
  pub top_k: usize,
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

  if args.top_k == 0 {
    OneShotTask.run_task(input, &classifier, output)?;
    return Ok(());
  }

  let frame = input
    .into_iter()
    .next()
    .ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
  let (result, ranked) = classifier.rank(&frame.image, args.top_k)?;
  output.render_result(&frame, &result)?;
  for (rank, class) in ranked.iter().enumerate() {
    info!(
      "#{} {} (下标 {}): {:.2}%",
      rank + 1,
      class.category,
      class.index,
      class.probability * 100.0
    );
  }

  Ok(())
}
