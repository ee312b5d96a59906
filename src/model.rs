// 该文件是 Xiaotu （小图） 项目的一部分。
// src/model.rs - 模型句柄与推理引擎接口
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

use std::{fmt, path::Path};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::{NchwTensor, ScoreVector, TensorView},
  postprocess::PostprocessError,
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("推理后端错误: {0}")]
  Backend(String),
  #[error("模型缺少 {kind} 绑定 '{name}'")]
  MissingBinding { kind: &'static str, name: String },
  #[error("模型路径错误: {0}")]
  ModelPath(String),
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型尚未就绪")]
  NotReady,
  #[error("推理执行错误: {0}")]
  Engine(String),
  #[error("模型输出 '{0}' 不存在")]
  MissingOutput(String),
  #[error("模型输出为空")]
  EmptyOutput,
  #[error("模型输出无效: {0}")]
  InvalidOutput(#[from] PostprocessError),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
}

/// 与模型文件约定的输入、输出名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
  pub input: String,
  pub output: String,
}

impl Default for Bindings {
  fn default() -> Self {
    Self {
      input: "input".to_string(),
      output: "output".to_string(),
    }
  }
}

/// 模型旁的元数据文件，至少包含 `version`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
  #[serde(default, deserialize_with = "version_text")]
  pub version: Option<String>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `version` 可以是字符串或数字，数字按 JSON 文本显示
fn version_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
  Ok(
    match Option::<serde_json::Value>::deserialize(deserializer)? {
      None | Some(serde_json::Value::Null) => None,
      Some(serde_json::Value::String(version)) => Some(version),
      Some(other) => Some(other.to_string()),
    },
  )
}

/// 尽力读取元数据，失败只记录日志
pub fn read_metadata(path: &Path) -> Option<ModelMetadata> {
  let text = match std::fs::read_to_string(path) {
    Ok(text) => text,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      warn!("元数据文件不存在: {}", path.display());
      return None;
    }
    Err(e) => {
      warn!("元数据读取失败: {}, 错误: {}", path.display(), e);
      return None;
    }
  };

  match serde_json::from_str::<ModelMetadata>(&text) {
    Ok(metadata) => {
      debug!("模型元数据: {:?}", metadata);
      Some(metadata)
    }
    Err(e) => {
      warn!("元数据解析失败: {}, 错误: {}", path.display(), e);
      None
    }
  }
}

/// 不透明的推理引擎：张量进，分数出
pub trait Engine {
  fn run(&self, bindings: &Bindings, tensor: TensorView<'_>) -> Result<Vec<f32>, InferenceError>;
}

pub struct Loaded<E> {
  pub engine: E,
  pub metadata: Option<ModelMetadata>,
}

/// 加载模型文件并构造推理引擎
pub trait EngineLoader {
  type Engine: Engine;

  fn load(&self, bindings: &Bindings) -> Result<Loaded<Self::Engine>, LoadError>;

  fn bindings(&self) -> Bindings {
    Bindings::default()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
  Unloaded,
  Ready,
  Failed(String),
}

impl fmt::Display for ModelStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ModelStatus::Unloaded => write!(f, "Model Loading"),
      ModelStatus::Ready => write!(f, "Model Ready"),
      ModelStatus::Failed(_) => write!(f, "Model Failed"),
    }
  }
}

/// 持有推理引擎及其就绪状态。
///
/// 状态只在 [`ModelHandle::initialize`] 中写入一次：`Unloaded → Ready` 或
/// `Unloaded → Failed`，之后不再变化。需要重试时构造新的句柄。
pub struct ModelHandle<L: EngineLoader> {
  loader: L,
  bindings: Bindings,
  engine: Option<L::Engine>,
  metadata: Option<ModelMetadata>,
  status: ModelStatus,
}

impl<L: EngineLoader> ModelHandle<L> {
  pub fn new(loader: L) -> Self {
    let bindings = loader.bindings();
    Self {
      loader,
      bindings,
      engine: None,
      metadata: None,
      status: ModelStatus::Unloaded,
    }
  }

  /// 加载模型。失败不会返回错误，只会进入 `Failed` 状态。
  pub fn initialize(&mut self) {
    if self.status != ModelStatus::Unloaded {
      warn!("模型已初始化 ({}), 忽略重复初始化", self.status);
      return;
    }

    info!(
      "加载模型, 输入绑定: {}, 输出绑定: {}",
      self.bindings.input, self.bindings.output
    );
    match self.loader.load(&self.bindings) {
      Ok(Loaded { engine, metadata }) => {
        self.engine = Some(engine);
        self.metadata = metadata;
        self.status = ModelStatus::Ready;
        info!("模型加载完成: {}", self.status_text());
      }
      Err(e) => {
        error!("模型加载失败: {}", e);
        self.status = ModelStatus::Failed(e.to_string());
      }
    }
  }

  pub fn is_ready(&self) -> bool {
    self.status == ModelStatus::Ready
  }

  pub fn status(&self) -> &ModelStatus {
    &self.status
  }

  pub fn metadata(&self) -> Option<&ModelMetadata> {
    self.metadata.as_ref()
  }

  pub fn version(&self) -> Option<&str> {
    self.metadata.as_ref()?.version.as_deref()
  }

  pub fn bindings(&self) -> &Bindings {
    &self.bindings
  }

  /// 仅在 `Ready` 状态下存在
  pub fn engine(&self) -> Option<&L::Engine> {
    self.engine.as_ref()
  }

  /// 状态提示文本，例如 `Model Ready (v3)`
  pub fn status_text(&self) -> String {
    match (&self.status, self.version()) {
      (ModelStatus::Ready, Some(version)) => format!("{} ({})", self.status, version),
      (status, _) => status.to_string(),
    }
  }

  pub fn invoke<const W: u32, const H: u32>(
    &self,
    tensor: &NchwTensor<W, H>,
  ) -> Result<ScoreVector, InferenceError> {
    let engine = match (&self.status, &self.engine) {
      (ModelStatus::Ready, Some(engine)) => engine,
      _ => return Err(InferenceError::NotReady),
    };

    debug!("执行模型推理, 输入形状: {:?}", tensor.shape());
    let scores = engine.run(&self.bindings, tensor.view())?;
    if scores.is_empty() {
      return Err(InferenceError::EmptyOutput);
    }
    debug!("模型输出: {:?}", scores);

    Ok(ScoreVector::from(scores))
  }
}

#[cfg(feature = "onnxruntime")]
mod onnx;
#[cfg(feature = "onnxruntime")]
pub use self::onnx::{OnnxEngine, OnnxLoader};
