// 该文件是 Xiaotu （小图） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use std::{borrow::Cow, path::PathBuf, sync::Mutex};

use ort::{
  execution_providers::CPUExecutionProvider,
  session::{Session, SessionInputs, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::TensorView,
  model::{Bindings, Engine, EngineLoader, InferenceError, LoadError, Loaded, read_metadata},
};

const METADATA_FILE_NAME: &str = "model_metadata.json";

impl From<ort::Error> for LoadError {
  fn from(err: ort::Error) -> Self {
    LoadError::Backend(err.to_string())
  }
}

/// 从 `onnx:///path/model.onnx?metadata=...&threads=N&input=...&output=...` 构造
#[derive(Debug, Clone)]
pub struct OnnxLoader {
  model_path: PathBuf,
  metadata_path: Option<PathBuf>,
  threads: usize,
  bindings: Bindings,
}

impl FromUrlWithScheme for OnnxLoader {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxLoader {
  type Error = LoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LoadError::ModelPath(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut loader = OnnxLoader::new(url.path());
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "metadata" => loader.metadata_path = Some(PathBuf::from(value.as_ref())),
        "no-metadata" => loader.metadata_path = None,
        "threads" => {
          loader.threads = value
            .parse()
            .map_err(|_| LoadError::ModelPath(format!("无效的线程数: {}", value)))?;
        }
        "input" => loader.bindings.input = value.into_owned(),
        "output" => loader.bindings.output = value.into_owned(),
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(loader)
  }
}

impl OnnxLoader {
  /// 元数据默认位于模型文件同目录下的 `model_metadata.json`
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    let model_path = model_path.into();
    let metadata_path = Some(model_path.with_file_name(METADATA_FILE_NAME));
    Self {
      model_path,
      metadata_path,
      threads: 0,
      bindings: Bindings::default(),
    }
  }
}

impl EngineLoader for OnnxLoader {
  type Engine = OnnxEngine;

  fn load(&self, bindings: &Bindings) -> Result<Loaded<OnnxEngine>, LoadError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话 (CPU)");
    let mut builder = Session::builder()?
      .with_execution_providers([CPUExecutionProvider::default().build()])?
      .with_optimization_level(GraphOptimizationLevel::Level3)?;
    if self.threads > 0 {
      builder = builder.with_intra_threads(self.threads)?;
    }
    let session = builder.commit_from_memory(&model_data)?;

    if !session.inputs.iter().any(|i| i.name == bindings.input) {
      return Err(LoadError::MissingBinding {
        kind: "输入",
        name: bindings.input.clone(),
      });
    }
    if !session.outputs.iter().any(|o| o.name == bindings.output) {
      return Err(LoadError::MissingBinding {
        kind: "输出",
        name: bindings.output.clone(),
      });
    }
    debug!("模型输入数量: {}", session.inputs.len());
    debug!("模型输出数量: {}", session.outputs.len());

    let metadata = self.metadata_path.as_deref().and_then(read_metadata);

    Ok(Loaded {
      engine: OnnxEngine {
        session: Mutex::new(session),
      },
      metadata,
    })
  }

  fn bindings(&self) -> Bindings {
    self.bindings.clone()
  }
}

/// 运行会话需要独占访问，并发调用在锁上串行
pub struct OnnxEngine {
  session: Mutex<Session>,
}

impl Engine for OnnxEngine {
  fn run(&self, bindings: &Bindings, tensor: TensorView<'_>) -> Result<Vec<f32>, InferenceError> {
    let dims: Vec<i64> = tensor.shape.iter().map(|&d| d as i64).collect();
    let input = TensorRef::from_array_view((dims, tensor.data))
      .map_err(|e| InferenceError::Engine(format!("无法创建输入张量: {}", e)))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| InferenceError::SessionPoisoned)?;

    let inputs: SessionInputs<'_, '_, 0> =
      SessionInputs::ValueMap(vec![(Cow::Borrowed(bindings.input.as_str()), input.into())]);
    let outputs = session
      .run(inputs)
      .map_err(|e| InferenceError::Engine(e.to_string()))?;

    let value = outputs
      .get(bindings.output.as_str())
      .ok_or_else(|| InferenceError::MissingOutput(bindings.output.clone()))?;
    let (shape, data) = value
      .try_extract_tensor::<f32>()
      .map_err(|e| InferenceError::Engine(format!("无法读取输出张量: {}", e)))?;
    debug!("输出形状: {:?}", shape);

    Ok(data.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_model_url() {
    let url = Url::parse("onnx:///opt/models/model.onnx?threads=2&output=logits").unwrap();
    let loader = OnnxLoader::from_url(&url).unwrap();
    assert_eq!(loader.model_path, PathBuf::from("/opt/models/model.onnx"));
    assert_eq!(
      loader.metadata_path,
      Some(PathBuf::from("/opt/models/model_metadata.json"))
    );
    assert_eq!(loader.threads, 2);
    assert_eq!(loader.bindings().input, "input");
    assert_eq!(loader.bindings().output, "logits");
  }

  #[test]
  fn query_overrides_metadata_and_bindings() {
    let url =
      Url::parse("onnx:///opt/models/model.onnx?metadata=/etc/xiaotu/meta.json&input=pixels").unwrap();
    let loader = OnnxLoader::from_url(&url).unwrap();
    assert_eq!(loader.metadata_path, Some(PathBuf::from("/etc/xiaotu/meta.json")));
    assert_eq!(loader.threads, 0);
    assert_eq!(
      loader.bindings(),
      Bindings {
        input: "pixels".to_string(),
        output: "output".to_string(),
      }
    );

    let url = Url::parse("onnx:///opt/models/model.onnx?no-metadata").unwrap();
    assert_eq!(OnnxLoader::from_url(&url).unwrap().metadata_path, None);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("tflite:///opt/models/classifier.tflite").unwrap();
    assert!(matches!(
      OnnxLoader::from_url(&url),
      Err(LoadError::ModelPath(_))
    ));
    let url = Url::parse("onnx:///m.onnx?threads=many").unwrap();
    assert!(OnnxLoader::from_url(&url).is_err());
  }

  #[test]
  fn missing_model_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let loader = OnnxLoader::new(dir.path().join("model.onnx"));
    assert!(matches!(
      loader.load(&Bindings::default()),
      Err(LoadError::Io(_))
    ));
  }

  #[test]
  fn corrupt_model_fails_in_the_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.onnx");
    std::fs::write(&path, b"not a protobuf").unwrap();

    let mut handle = crate::model::ModelHandle::new(OnnxLoader::new(&path));
    handle.initialize();
    assert!(!handle.is_ready());
    assert!(matches!(
      handle.status(),
      crate::model::ModelStatus::Failed(_)
    ));
  }
}
