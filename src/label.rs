// 该文件是 Xiaotu （小图） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::{borrow::Cow, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// 训练脚本中的类别编号与显示名称，下标即模型输出下标
const THUMBNAIL_CATEGORIES: [(u32, &str); 17] = [
  (1, "Film & Animation"),
  (2, "Autos & Vehicles"),
  (10, "Music"),
  (15, "Pets & Animals"),
  (17, "Sports"),
  (19, "Travel & Events"),
  (20, "Gaming"),
  (22, "People & Blogs"),
  (23, "Comedy"),
  (24, "Entertainment"),
  (25, "News & Politics"),
  (26, "Howto & Style"),
  (27, "Education"),
  (28, "Science & Technology"),
  (29, "Nonprofits & Activism"),
  (30, "Movies"),
  (43, "Shows"),
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("标签表为空")]
  Empty,
}

/// 单个类别。`id` 是训练数据集中的原始编号，仅作记录用途。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabel {
  pub id: u32,
  pub name: String,
}

/// 按模型输出下标排列的只读标签表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabelTable {
  labels: Box<[ClassLabel]>,
}

impl ClassLabelTable {
  /// 缩略图分类模型使用的 17 个视频类别
  pub fn thumbnail_categories() -> Self {
    let labels = THUMBNAIL_CATEGORIES
      .iter()
      .map(|&(id, name)| ClassLabel {
        id,
        name: name.to_string(),
      })
      .collect();
    Self { labels }
  }

  pub fn new(labels: Vec<ClassLabel>) -> Result<Self, LabelError> {
    if labels.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self {
      labels: labels.into_boxed_slice(),
    })
  }

  /// 从 JSON 数组 `[{"id": 1, "name": "..."}, ...]` 读取，数组顺序即下标顺序
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn from_json_str(text: &str) -> Result<Self, LabelError> {
    let labels: Vec<ClassLabel> = serde_json::from_str(text)?;
    debug!("标签数量: {}", labels.len());
    Self::new(labels)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&ClassLabel> {
    self.labels.get(index)
  }

  /// 下标越界时退回 `Category <index>`
  pub fn label_for(&self, index: usize) -> Cow<'_, str> {
    match self.labels.get(index) {
      Some(label) => Cow::Borrowed(label.name.as_str()),
      None => Cow::Owned(format!("Category {}", index)),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &ClassLabel> {
    self.labels.iter()
  }
}

impl Default for ClassLabelTable {
  fn default() -> Self {
    Self::thumbnail_categories()
  }
}
