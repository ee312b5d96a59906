// 该文件是 Xiaotu （小图） 项目的一部分。
// src/postprocess.rs - 分数后处理
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

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::{frame::ScoreVector, label::ClassLabelTable};

#[derive(Error, Debug, PartialEq)]
pub enum PostprocessError {
  #[error("模型输出为空")]
  EmptyScores,
  #[error("概率分布包含非有限值 (下标 {0})")]
  NonFinite(usize),
}

/// Softmax 计算方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SoftmaxMode {
  /// 先减去最大分数再取指数
  #[default]
  Stable,
  /// 直接对原始分数取指数，只在分布有限时与旧版结果一致。
  ///
  /// 大分数溢出后概率为 NaN，这里报告 [`PostprocessError::NonFinite`]，
  /// 不会像旧版那样返回首个非 NaN 下标和 NaN/0 置信度。
  Unstabilized,
}

impl std::str::FromStr for SoftmaxMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "stable" => Ok(SoftmaxMode::Stable),
      "unstabilized" => Ok(SoftmaxMode::Unstabilized),
      other => Err(format!("未知的 softmax 模式: {}", other)),
    }
  }
}

/// 单次分类的决策结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub index: usize,
  pub category: String,
  pub confidence: f32,
}

/// 排序后的候选类别
#[derive(Debug, Clone, PartialEq)]
pub struct RankedClass {
  pub index: usize,
  pub category: String,
  pub probability: f32,
}

pub fn softmax(scores: &[f32], mode: SoftmaxMode) -> Vec<f32> {
  let shift = match mode {
    SoftmaxMode::Stable => scores.iter().copied().fold(f32::NEG_INFINITY, f32::max),
    SoftmaxMode::Unstabilized => 0.0,
  };
  let exps: Vec<f32> = scores.iter().map(|&s| (s - shift).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|e| e / sum).collect()
}

/// 最大值下标，相等时取最小下标
pub fn argmax(values: &[f32]) -> Option<usize> {
  let mut best: Option<(usize, f32)> = None;
  for (i, &v) in values.iter().enumerate() {
    match best {
      Some((_, max)) if v <= max => {}
      Some(_) => best = Some((i, v)),
      None => best = Some((i, v)),
    }
  }
  best.map(|(i, _)| i)
}

/// 分数 → 概率 → (类别, 置信度)
#[derive(Debug, Clone)]
pub struct Postprocessor {
  labels: Arc<ClassLabelTable>,
  mode: SoftmaxMode,
}

impl Postprocessor {
  pub fn new(labels: Arc<ClassLabelTable>) -> Self {
    Self {
      labels,
      mode: SoftmaxMode::default(),
    }
  }

  pub fn with_mode(mut self, mode: SoftmaxMode) -> Self {
    self.mode = mode;
    self
  }

  /// 完整的概率分布
  pub fn distribution(&self, scores: &ScoreVector) -> Result<Vec<f32>, PostprocessError> {
    if scores.is_empty() {
      return Err(PostprocessError::EmptyScores);
    }
    let probs = softmax(scores.as_slice(), self.mode);
    if let Some(i) = probs.iter().position(|p| !p.is_finite()) {
      return Err(PostprocessError::NonFinite(i));
    }
    Ok(probs)
  }

  pub fn postprocess(&self, scores: &ScoreVector) -> Result<Prediction, PostprocessError> {
    let probs = self.distribution(scores)?;
    let index = argmax(&probs).ok_or(PostprocessError::EmptyScores)?;
    let confidence = probs[index];

    if index >= self.labels.len() {
      debug!(
        "输出下标 {} 超出标签表范围 ({} 个类别)",
        index,
        self.labels.len()
      );
    }

    Ok(Prediction {
      index,
      category: self.labels.label_for(index).into_owned(),
      confidence,
    })
  }

  /// 概率最高的前 `k` 个类别，降序排列
  pub fn top_k(&self, scores: &ScoreVector, k: usize) -> Result<Vec<RankedClass>, PostprocessError> {
    let probs = self.distribution(scores)?;
    let mut order: Vec<usize> = (0..probs.len()).collect();
    // 稳定排序保证相等概率按下标升序
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    Ok(
      order
        .into_iter()
        .take(k)
        .map(|index| RankedClass {
          index,
          category: self.labels.label_for(index).into_owned(),
          probability: probs[index],
        })
        .collect(),
    )
  }
}
