// 该文件是 Xiaotu （小图） 项目的一部分。
// src/pipeline.rs - 分类流水线
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
  sync::Arc,
  time::{Duration, Instant},
};

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::{INPUT_H, INPUT_W, ScoreVector},
  input::ImageFrame,
  label::ClassLabelTable,
  model::{EngineLoader, InferenceError, Model, ModelHandle, ModelStatus},
  postprocess::{Postprocessor, RankedClass, SoftmaxMode},
  preprocess::{PreprocessError, Preprocessor},
};

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("模型尚未就绪")]
  NotReady,
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理错误: {0}")]
  Inference(InferenceError),
}

impl From<InferenceError> for ClassifyError {
  fn from(err: InferenceError) -> Self {
    match err {
      InferenceError::NotReady => ClassifyError::NotReady,
      other => ClassifyError::Inference(other),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
  pub index: usize,
  pub category: String,
  pub confidence: f32,
  /// 仅统计模型推理耗时
  pub latency_ms: f64,
}

/// 模型句柄 + 预处理 + 后处理
pub struct Classifier<L: EngineLoader> {
  handle: ModelHandle<L>,
  preprocessor: Preprocessor<INPUT_W, INPUT_H>,
  postprocessor: Postprocessor,
}

impl<L: EngineLoader> Classifier<L> {
  pub fn new(handle: ModelHandle<L>, labels: Arc<ClassLabelTable>) -> Self {
    Self {
      handle,
      preprocessor: Preprocessor::default(),
      postprocessor: Postprocessor::new(labels),
    }
  }

  pub fn with_softmax(mut self, mode: SoftmaxMode) -> Self {
    self.postprocessor = self.postprocessor.with_mode(mode);
    self
  }

  pub fn initialize(&mut self) {
    self.handle.initialize();
  }

  pub fn is_ready(&self) -> bool {
    self.handle.is_ready()
  }

  pub fn status(&self) -> &ModelStatus {
    self.handle.status()
  }

  pub fn handle(&self) -> &ModelHandle<L> {
    &self.handle
  }

  /// 预处理并推理一次，耗时只统计模型调用
  fn infer_scores(&self, image: &DynamicImage) -> Result<(ScoreVector, Duration), ClassifyError> {
    if !self.handle.is_ready() {
      return Err(ClassifyError::NotReady);
    }

    let tensor = self.preprocessor.preprocess(image)?;

    let now = Instant::now();
    let scores = self.handle.invoke(&tensor)?;
    let elapsed = now.elapsed();
    debug!("推理完成，耗时: {:.2?}", elapsed);

    Ok((scores, elapsed))
  }

  fn decide(
    &self,
    scores: &ScoreVector,
    elapsed: Duration,
  ) -> Result<ClassificationResult, ClassifyError> {
    let prediction = self
      .postprocessor
      .postprocess(scores)
      .map_err(InferenceError::from)?;

    Ok(ClassificationResult {
      index: prediction.index,
      category: prediction.category,
      confidence: prediction.confidence,
      latency_ms: elapsed.as_secs_f64() * 1000.0,
    })
  }

  pub fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult, ClassifyError> {
    let (scores, elapsed) = self.infer_scores(image)?;
    self.decide(&scores, elapsed)
  }

  pub fn classify_bytes(&self, bytes: &[u8]) -> Result<ClassificationResult, ClassifyError> {
    if !self.handle.is_ready() {
      return Err(ClassifyError::NotReady);
    }
    let image = crate::preprocess::decode(bytes)?;
    self.classify(&image)
  }

  /// 分类结果以及概率最高的前 `k` 个类别，两者来自同一次推理
  pub fn rank(
    &self,
    image: &DynamicImage,
    k: usize,
  ) -> Result<(ClassificationResult, Vec<RankedClass>), ClassifyError> {
    let (scores, elapsed) = self.infer_scores(image)?;
    let result = self.decide(&scores, elapsed)?;
    let ranked = self
      .postprocessor
      .top_k(&scores, k)
      .map_err(InferenceError::from)?;
    info!("前 {} 个类别: {:?}", k, ranked);
    Ok((result, ranked))
  }
}

/// 按命令行参数构造并初始化 ONNX 分类器，加载失败时返回错误
#[cfg(feature = "onnxruntime")]
pub fn onnx_classifier(
  model: &url::Url,
  labels: Option<&std::path::Path>,
  softmax: SoftmaxMode,
) -> anyhow::Result<Classifier<crate::model::OnnxLoader>> {
  use crate::FromUrl;

  let labels = match labels {
    Some(path) => ClassLabelTable::from_json_file(path)?,
    None => ClassLabelTable::thumbnail_categories(),
  };
  let loader = crate::model::OnnxLoader::from_url(model)?;
  let mut classifier = Classifier::new(ModelHandle::new(loader), Arc::new(labels)).with_softmax(softmax);

  classifier.initialize();
  info!("模型状态: {}", classifier.handle().status_text());
  if let ModelStatus::Failed(reason) = classifier.status() {
    anyhow::bail!("模型加载失败: {}", reason);
  }
  Ok(classifier)
}

impl<L: EngineLoader> Model for Classifier<L> {
  type Input = ImageFrame;
  type Output = ClassificationResult;
  type Error = ClassifyError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.classify(&input.image)
  }
}
