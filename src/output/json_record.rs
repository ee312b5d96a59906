// 该文件是 Xiaotu （小图） 项目的一部分。
// src/output/json_record.rs - JSON Lines 结果记录
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
  fs::{File, OpenOptions},
  io::Write,
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, input::ImageFrame, output::Render,
  pipeline::ClassificationResult,
};

#[derive(Error, Debug)]
pub enum JsonRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("记录文件锁已损坏")]
  Poisoned,
}

/// 每张图像一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
  pub timestamp: DateTime<Utc>,
  pub source: String,
  pub frame: u64,
  pub index: usize,
  pub category: String,
  pub confidence: f32,
  pub latency_ms: f64,
}

pub struct JsonRecordOutput {
  path: PathBuf,
  file: Mutex<File>,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordOutputError::SchemeMismatch);
    }
    Self::create(uri.path())
  }
}

impl JsonRecordOutput {
  /// 以追加方式打开记录文件，必要时创建上级目录
  pub fn create(path: impl AsRef<Path>) -> Result<Self, JsonRecordOutputError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    Ok(Self {
      path,
      file: Mutex::new(file),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<ImageFrame, ClassificationResult> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(
    &self,
    frame: &ImageFrame,
    result: &ClassificationResult,
  ) -> Result<(), Self::Error> {
    let record = JsonRecord {
      timestamp: Utc::now(),
      source: frame.source.clone(),
      frame: frame.index,
      index: result.index,
      category: result.category.clone(),
      confidence: result.confidence,
      latency_ms: result.latency_ms,
    };
    let mut line = serde_json::to_string(&record)?;
    line.push('\n');

    let mut file = self
      .file
      .lock()
      .map_err(|_| JsonRecordOutputError::Poisoned)?;
    file.write_all(line.as_bytes())?;
    debug!("写入记录到 {}: {}", self.path.display(), line.trim_end());

    Ok(())
  }
}
