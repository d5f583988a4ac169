// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 ONNX 模型
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

use std::{marker::PhantomData, path::PathBuf};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::{
  execution_providers::CPUExecutionProvider,
  session::{Session, builder::GraphOptimizationLevel},
  value::{Tensor, ValueType},
};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, Letterbox},
  model::{DetectItem, DetectResult, InferenceError, LoadError, LoadModel, Model, WithLabel},
  path_from_url,
};

const YOLOV5_NUM_INPUTS: usize = 1;
const YOLOV5_INPUT_W: u32 = 640;
const YOLOV5_INPUT_H: u32 = 640;
// 每一行: cx, cy, w, h, objectness, 类别分数...
const YOLOV5_BOX_FIELDS: usize = 5;
const YOLOV5_MAX_DETECTIONS: usize = 300;
const YOLOV5_INTRA_THREADS: usize = 4;

/// 推理设备
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExecutionProvider {
  #[default]
  Cpu,
  Cuda,
}

pub struct Yolov5<L> {
  session: Session,
  input_name: String,
  output_name: String,
  input_width: u32,
  input_height: u32,
  confidence: f32,
  iou_threshold: f32,
  _label: PhantomData<fn() -> L>,
}

#[derive(Debug, Clone)]
pub struct Yolov5Builder<L> {
  model_path: PathBuf,
  confidence: f32,
  iou_threshold: f32,
  provider: ExecutionProvider,
  _label: PhantomData<fn() -> L>,
}

impl<L> FromUrlWithScheme for Yolov5Builder<L> {
  const SCHEME: &'static str = "yolov5";
}

impl<L> FromUrl for Yolov5Builder<L> {
  type Error = LoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let model_path = path_from_url(url, Self::SCHEME)?;
    Ok(Self::new(model_path))
  }
}

impl<L> Yolov5Builder<L> {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      confidence: 0.25,
      iou_threshold: 0.45,
      provider: ExecutionProvider::default(),
      _label: PhantomData,
    }
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn provider(mut self, provider: ExecutionProvider) -> Self {
    self.provider = provider;
    self
  }

  pub fn model_path(&self) -> &PathBuf {
    &self.model_path
  }

  pub fn build(&self) -> Result<Yolov5<L>, LoadError> {
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(LoadError::ModelMissing(self.model_path.clone()));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let size = std::fs::metadata(&self.model_path)?.len();
    debug!("模型文件大小: {:.2} MB", size as f64 / (1024.0 * 1024.0));

    let builder = Session::builder()?;
    let builder = match self.provider {
      ExecutionProvider::Cpu => {
        builder.with_execution_providers([CPUExecutionProvider::default().build()])?
      }
      #[cfg(feature = "cuda")]
      ExecutionProvider::Cuda => {
        info!("使用 CUDA 推理");
        builder.with_execution_providers([CUDAExecutionProvider::default().build()])?
      }
      #[cfg(not(feature = "cuda"))]
      ExecutionProvider::Cuda => {
        return Err(LoadError::ModelInvalid(
          "未启用 cuda 特性，无法使用 CUDA 推理".to_string(),
        ));
      }
    };

    info!("创建 ONNX Runtime 推理会话");
    let session = builder
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_intra_threads(YOLOV5_INTRA_THREADS)?
      .commit_from_file(&self.model_path)?;

    if session.inputs.len() != YOLOV5_NUM_INPUTS {
      return Err(LoadError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLOV5_NUM_INPUTS,
        session.inputs.len()
      )));
    }
    let Some(output) = session.outputs.first() else {
      return Err(LoadError::ModelInvalid("模型没有输出".to_string()));
    };

    let input = &session.inputs[0];
    let (input_width, input_height) = match &input.input_type {
      ValueType::Tensor { dimensions, .. } if dimensions.len() == 4 => {
        if dimensions[1] > 0 && dimensions[1] != 3 {
          return Err(LoadError::ModelInvalid(format!(
            "模型输入通道数应为 3, 实际为 {}",
            dimensions[1]
          )));
        }
        (
          static_dim(dimensions[3], YOLOV5_INPUT_W),
          static_dim(dimensions[2], YOLOV5_INPUT_H),
        )
      }
      other => {
        return Err(LoadError::ModelInvalid(format!(
          "模型输入应为 NCHW 张量, 实际为 {:?}",
          other
        )));
      }
    };

    if let ValueType::Tensor { dimensions, .. } = &output.output_type {
      let fields = dimensions.last().copied().unwrap_or(-1);
      if dimensions.len() != 3 || (fields > 0 && fields as usize <= YOLOV5_BOX_FIELDS) {
        return Err(LoadError::ModelInvalid(format!(
          "模型输出应为 [1, N, 5 + 类别数], 实际为 {:?}",
          dimensions
        )));
      }
    }

    debug!("模型输入: {} {}x{}", input.name, input_width, input_height);
    debug!("模型输出: {}", output.name);
    info!("模型加载完成");

    Ok(Yolov5 {
      input_name: input.name.clone(),
      output_name: output.name.clone(),
      session,
      input_width,
      input_height,
      confidence: self.confidence,
      iou_threshold: self.iou_threshold,
      _label: PhantomData,
    })
  }
}

impl<L> LoadModel for Yolov5Builder<L> {
  type Model = Yolov5<L>;

  fn load(&self) -> Result<Self::Model, LoadError> {
    self.build()
  }
}

fn static_dim(dim: i64, fallback: u32) -> u32 {
  if dim > 0 { dim as u32 } else { fallback }
}

impl<L: WithLabel> Model for Yolov5<L> {
  type Input = Frame;
  type Output = DetectResult<L>;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let (tensor, letterbox) = input.to_letterboxed_nchw(self.input_width, self.input_height);
    let tensor = Tensor::from_array(tensor)?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => tensor]?)?;

    debug!("获取模型输出");
    let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
    let shape = output.shape().to_vec();
    let Some(data) = output.as_slice() else {
      return Err(InferenceError::Backend("模型输出不是连续内存".to_string()));
    };

    postprocess(
      data,
      &shape,
      &letterbox,
      self.confidence,
      self.iou_threshold,
    )
  }
}

/// 解码 `[1, N, 5 + 类别数]` 的输出，做阈值过滤和按类别 NMS
pub(crate) fn postprocess<L: WithLabel>(
  data: &[f32],
  shape: &[usize],
  letterbox: &Letterbox,
  confidence: f32,
  iou_threshold: f32,
) -> Result<DetectResult<L>, InferenceError> {
  let (rows, fields) = match shape {
    [1, rows, fields] | [rows, fields] => (*rows, *fields),
    _ => return Err(InferenceError::OutputShape(shape.to_vec())),
  };
  if fields <= YOLOV5_BOX_FIELDS || data.len() != rows * fields {
    return Err(InferenceError::OutputShape(shape.to_vec()));
  }

  let mut candidates = Vec::new();
  for row in data.chunks_exact(fields) {
    let objectness = row[4];
    if objectness < confidence {
      continue;
    }

    let (class_id, class_score) = row[YOLOV5_BOX_FIELDS..]
      .iter()
      .enumerate()
      .fold((0usize, f32::MIN), |best, (idx, &score)| {
        if score > best.1 { (idx, score) } else { best }
      });
    let score = objectness * class_score;
    if score < confidence {
      continue;
    }

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    let (x_min, y_min) = letterbox.to_normalized(cx - w / 2.0, cy - h / 2.0);
    let (x_max, y_max) = letterbox.to_normalized(cx + w / 2.0, cy + h / 2.0);
    if x_min >= x_max || y_min >= y_max {
      continue;
    }

    candidates.push((class_id as u32, score, [x_min, y_min, x_max, y_max]));
  }

  let kept = non_max_suppression(candidates, iou_threshold);
  debug!("检测到 {} 个物体", kept.len());

  let items = kept
    .into_iter()
    .map(|(class_id, score, bbox)| DetectItem {
      kind: L::from_label_id(class_id),
      score,
      bbox,
    })
    .collect::<Vec<_>>();

  Ok(DetectResult {
    items: items.into_boxed_slice(),
  })
}

fn non_max_suppression(
  mut candidates: Vec<(u32, f32, [f32; 4])>,
  iou_threshold: f32,
) -> Vec<(u32, f32, [f32; 4])> {
  candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

  let mut kept: Vec<(u32, f32, [f32; 4])> = Vec::new();
  for candidate in candidates {
    let suppressed = kept
      .iter()
      .any(|k| k.0 == candidate.0 && iou(&k.2, &candidate.2) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
      if kept.len() >= YOLOV5_MAX_DETECTIONS {
        break;
      }
    }
  }
  kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = w * h;
  let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::PpeLabel;

  fn row(cx: f32, cy: f32, w: f32, h: f32, obj: f32, classes: &[f32]) -> Vec<f32> {
    let mut row = vec![cx, cy, w, h, obj];
    row.extend_from_slice(classes);
    row
  }

  #[test]
  fn postprocess_maps_boxes_into_source_space() {
    let letterbox = Letterbox::fit(640, 640, 640, 640);
    let data = row(320.0, 160.0, 64.0, 32.0, 0.9, &[0.95, 0.1, 0.0, 0.0, 0.0]);

    let result: DetectResult<PpeLabel> =
      postprocess(&data, &[1, 1, 10], &letterbox, 0.25, 0.45).unwrap();

    assert_eq!(result.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.kind, PpeLabel::Helmet);
    assert!((item.score - 0.855).abs() < 1e-4);
    assert!((item.bbox[0] - 0.45).abs() < 1e-4);
    assert!((item.bbox[1] - 0.225).abs() < 1e-4);
    assert!((item.bbox[2] - 0.55).abs() < 1e-4);
    assert!((item.bbox[3] - 0.275).abs() < 1e-4);
  }

  #[test]
  fn postprocess_drops_low_confidence_rows() {
    let letterbox = Letterbox::fit(640, 640, 640, 640);
    let mut data = row(100.0, 100.0, 50.0, 50.0, 0.9, &[0.1, 0.2]);
    data.extend(row(200.0, 200.0, 50.0, 50.0, 0.1, &[0.9, 0.0]));

    let result: DetectResult<PpeLabel> =
      postprocess(&data, &[1, 2, 7], &letterbox, 0.25, 0.45).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn postprocess_suppresses_overlaps_per_class() {
    let letterbox = Letterbox::fit(640, 640, 640, 640);
    let mut data = row(100.0, 100.0, 80.0, 80.0, 0.9, &[0.9, 0.0]);
    data.extend(row(104.0, 102.0, 80.0, 80.0, 0.8, &[0.9, 0.0]));
    // 同样位置但类别不同，保留
    data.extend(row(100.0, 100.0, 80.0, 80.0, 0.7, &[0.0, 0.9]));

    let result: DetectResult<PpeLabel> =
      postprocess(&data, &[1, 3, 7], &letterbox, 0.25, 0.45).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.items[0].kind, PpeLabel::Helmet);
    assert_eq!(result.items[1].kind, PpeLabel::Gloves);
  }

  #[test]
  fn postprocess_rejects_unexpected_shapes() {
    let letterbox = Letterbox::fit(640, 640, 640, 640);
    let err = postprocess::<PpeLabel>(&[0.0; 10], &[1, 2, 5], &letterbox, 0.25, 0.45);
    assert!(matches!(err, Err(InferenceError::OutputShape(_))));
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    assert_eq!(iou(&[0.0, 0.0, 0.1, 0.1], &[0.5, 0.5, 0.6, 0.6]), 0.0);
    assert!((iou(&[0.0, 0.0, 0.2, 0.2], &[0.0, 0.0, 0.2, 0.2]) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn missing_model_is_a_load_error() {
    let builder = Yolov5Builder::<PpeLabel>::new("/nonexistent/model/best.onnx");
    assert!(matches!(builder.build(), Err(LoadError::ModelMissing(_))));
  }

  #[test]
  fn builder_from_url_decodes_path() {
    let url = Url::parse("yolov5:///opt/models/ppe%20v5.onnx").unwrap();
    let builder = Yolov5Builder::<PpeLabel>::from_url(&url).unwrap();
    assert_eq!(builder.model_path(), &PathBuf::from("/opt/models/ppe v5.onnx"));
  }
}
