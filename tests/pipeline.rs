// 该文件是 Xiaotu （小图） 项目的一部分。
// tests/pipeline.rs - 分类流水线测试
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

use std::{cell::RefCell, sync::Arc};

use approx::assert_abs_diff_eq;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use xiaotu::{
  ClassifyError, Classifier,
  frame::TensorView,
  input::ImageFrame,
  label::ClassLabelTable,
  model::{
    Bindings, Engine, EngineLoader, InferenceError, LoadError, Loaded, ModelHandle, ModelMetadata,
    ModelStatus,
  },
  output::{JsonRecord, JsonRecordOutput},
  postprocess::SoftmaxMode,
  preprocess::PreprocessError,
  task::{ContinuousTask, OneShotTask, Task},
};

/// 记录收到的张量，返回固定分数
struct RecordingEngine {
  scores: Vec<f32>,
  tensors: RefCell<Vec<Vec<f32>>>,
}

impl Engine for RecordingEngine {
  fn run(&self, _bindings: &Bindings, tensor: TensorView<'_>) -> Result<Vec<f32>, InferenceError> {
    if tensor.shape != [1, 3, 224, 224] {
      return Err(InferenceError::Engine(format!(
        "unexpected shape {:?}",
        tensor.shape
      )));
    }
    self.tensors.borrow_mut().push(tensor.data.to_vec());
    Ok(self.scores.clone())
  }
}

enum Behaviour {
  Scores(Vec<f32>),
  Broken,
  Fault,
}

struct FakeLoader(Behaviour);

struct FaultyEngine;

impl Engine for FaultyEngine {
  fn run(&self, _bindings: &Bindings, _tensor: TensorView<'_>) -> Result<Vec<f32>, InferenceError> {
    Err(InferenceError::Engine("backend crashed".to_string()))
  }
}

enum AnyEngine {
  Recording(RecordingEngine),
  Faulty(FaultyEngine),
}

impl Engine for AnyEngine {
  fn run(&self, bindings: &Bindings, tensor: TensorView<'_>) -> Result<Vec<f32>, InferenceError> {
    match self {
      AnyEngine::Recording(engine) => engine.run(bindings, tensor),
      AnyEngine::Faulty(engine) => engine.run(bindings, tensor),
    }
  }
}

impl EngineLoader for FakeLoader {
  type Engine = AnyEngine;

  fn load(&self, _bindings: &Bindings) -> Result<Loaded<AnyEngine>, LoadError> {
    match &self.0 {
      Behaviour::Scores(scores) => Ok(Loaded {
        engine: AnyEngine::Recording(RecordingEngine {
          scores: scores.clone(),
          tensors: RefCell::new(Vec::new()),
        }),
        metadata: Some(ModelMetadata {
          version: Some("v1.0.3".to_string()),
          ..Default::default()
        }),
      }),
      Behaviour::Broken => Err(LoadError::Backend("malformed protobuf".to_string())),
      Behaviour::Fault => Ok(Loaded {
        engine: AnyEngine::Faulty(FaultyEngine),
        metadata: None,
      }),
    }
  }
}

fn classifier(behaviour: Behaviour) -> Classifier<FakeLoader> {
  Classifier::new(
    ModelHandle::new(FakeLoader(behaviour)),
    Arc::new(ClassLabelTable::thumbnail_categories()),
  )
}

fn dominant(index: usize) -> Vec<f32> {
  let mut scores = vec![0.0; 17];
  scores[index] = 10.0;
  scores
}

fn thumbnail() -> DynamicImage {
  DynamicImage::ImageRgb8(RgbImage::from_fn(320, 180, |x, y| {
    Rgb([(x % 256) as u8, (y % 256) as u8, 128])
  }))
}

#[test]
fn classify_before_initialize_is_not_ready() {
  let classifier = classifier(Behaviour::Scores(dominant(0)));
  assert!(!classifier.is_ready());
  assert!(matches!(
    classifier.classify(&thumbnail()),
    Err(ClassifyError::NotReady)
  ));
  // 就绪检查先于预处理
  let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
  assert!(matches!(
    classifier.classify(&empty),
    Err(ClassifyError::NotReady)
  ));
}

#[test]
fn classify_returns_label_confidence_and_latency() {
  let mut classifier = classifier(Behaviour::Scores(dominant(3)));
  classifier.initialize();
  assert!(classifier.is_ready());
  assert_eq!(classifier.handle().status_text(), "Model Ready (v1.0.3)");

  let result = classifier.classify(&thumbnail()).unwrap();
  assert_eq!(result.index, 3);
  assert_eq!(result.category, "Pets & Animals");
  assert!(result.confidence > 0.99 && result.confidence <= 1.0);
  assert!(result.latency_ms >= 0.0);
}

#[test]
fn red_pixel_reaches_the_engine_normalized() {
  let mut classifier = classifier(Behaviour::Scores(dominant(0)));
  classifier.initialize();

  let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255])));
  classifier.classify(&red).unwrap();

  let tensors = match engine(&classifier) {
    AnyEngine::Recording(engine) => engine.tensors.borrow().clone(),
    AnyEngine::Faulty(_) => unreachable!(),
  };
  assert_eq!(tensors.len(), 1);
  let plane = 224 * 224;
  assert_eq!(tensors[0].len(), 3 * plane);
  for v in &tensors[0][..plane] {
    assert_abs_diff_eq!(*v, 2.2489, epsilon = 1e-3);
  }
  for v in &tensors[0][plane..2 * plane] {
    assert_abs_diff_eq!(*v, -2.0357, epsilon = 1e-3);
  }
  for v in &tensors[0][2 * plane..] {
    assert_abs_diff_eq!(*v, -1.8044, epsilon = 1e-3);
  }
}

fn engine(classifier: &Classifier<FakeLoader>) -> &AnyEngine {
  classifier
    .handle()
    .engine()
    .expect("initialized classifier has an engine")
}

#[test]
fn failed_load_keeps_the_pipeline_queryable() {
  let mut classifier = classifier(Behaviour::Broken);
  classifier.initialize();
  assert!(!classifier.is_ready());
  assert!(matches!(classifier.status(), ModelStatus::Failed(reason) if reason.contains("malformed")));
  assert_eq!(classifier.handle().status_text(), "Model Failed");
  assert!(matches!(
    classifier.classify(&thumbnail()),
    Err(ClassifyError::NotReady)
  ));
}

#[test]
fn engine_faults_propagate_as_inference_errors() {
  let mut classifier = classifier(Behaviour::Fault);
  classifier.initialize();
  assert!(matches!(
    classifier.classify(&thumbnail()),
    Err(ClassifyError::Inference(InferenceError::Engine(_)))
  ));
}

#[test]
fn bad_input_propagates_as_preprocess_error() {
  let mut classifier = classifier(Behaviour::Scores(dominant(0)));
  classifier.initialize();

  let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 4));
  assert!(matches!(
    classifier.classify(&empty),
    Err(ClassifyError::Preprocess(PreprocessError::EmptyImage { .. }))
  ));
  assert!(matches!(
    classifier.classify_bytes(b"GIF89a-truncated"),
    Err(ClassifyError::Preprocess(PreprocessError::Decode(_)))
  ));
}

#[test]
fn label_table_shorter_than_output_synthesizes_category() {
  let mut scores = vec![0.0; 19];
  scores[18] = 4.0;
  let mut classifier = classifier(Behaviour::Scores(scores));
  classifier.initialize();
  let result = classifier.classify(&thumbnail()).unwrap();
  assert_eq!(result.category, "Category 18");
}

#[test]
fn unstabilized_softmax_overflow_is_reported() {
  let mut scores = dominant(1);
  scores[1] = 1000.0;
  let mut classifier = classifier(Behaviour::Scores(scores)).with_softmax(SoftmaxMode::Unstabilized);
  classifier.initialize();
  assert!(matches!(
    classifier.classify(&thumbnail()),
    Err(ClassifyError::Inference(InferenceError::InvalidOutput(_)))
  ));
}

#[test]
fn rank_lists_most_probable_categories() {
  let mut scores = dominant(12);
  scores[2] = 8.0;
  let mut classifier = classifier(Behaviour::Scores(scores));
  classifier.initialize();
  let (result, ranked) = classifier.rank(&thumbnail(), 2).unwrap();
  assert_eq!(ranked.len(), 2);
  assert_eq!(ranked[0].category, "Education");
  assert_eq!(ranked[1].category, "Music");
  assert_eq!(result.index, ranked[0].index);
  assert_eq!(result.category, ranked[0].category);
  assert_abs_diff_eq!(result.confidence, ranked[0].probability);

  // 分类结果与排序共用一次推理
  match engine(&classifier) {
    AnyEngine::Recording(engine) => assert_eq!(engine.tensors.borrow().len(), 1),
    AnyEngine::Faulty(_) => unreachable!(),
  }
}

#[test]
fn tasks_drive_the_classifier_into_records() {
  let mut classifier = classifier(Behaviour::Scores(dominant(9)));
  classifier.initialize();

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("results.jsonl");
  let output = JsonRecordOutput::create(&path).unwrap();

  let frames: Vec<ImageFrame> = (0..3)
    .map(|index| ImageFrame {
      source: format!("thumb-{}.png", index),
      index,
      image: thumbnail(),
    })
    .collect();

  OneShotTask
    .run_task(frames.clone(), &classifier, &output)
    .unwrap();
  let summary = ContinuousTask::default()
    .with_stop_flag(Arc::new(std::sync::atomic::AtomicBool::new(false)))
    .run_task(frames, &classifier, &output)
    .unwrap();
  assert_eq!(summary.frames, 3);

  let records: Vec<JsonRecord> = std::fs::read_to_string(&path)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();
  assert_eq!(records.len(), 4);
  assert!(records.iter().all(|r| r.category == "Entertainment"));
  assert_eq!(records[3].source, "thumb-2.png");
}
