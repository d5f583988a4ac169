// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/model.rs - 模型
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
  path::PathBuf,
  sync::{Arc, Mutex},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::UrlError;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，相对原图归一化
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl<T> Default for DetectResult<T> {
  fn default() -> Self {
    Self {
      items: Box::new([]),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

/// 个人防护装备类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PpeLabel {
  Helmet,
  Gloves,
  Vest,
  Boots,
  Goggles,
  /// 模型中额外的类别
  Other(u32),
}

impl WithLabel for PpeLabel {
  fn to_label_str(&self) -> String {
    match self {
      PpeLabel::Helmet => "helmet".to_string(),
      PpeLabel::Gloves => "gloves".to_string(),
      PpeLabel::Vest => "vest".to_string(),
      PpeLabel::Boots => "boots".to_string(),
      PpeLabel::Goggles => "goggles".to_string(),
      PpeLabel::Other(id) => format!("class-{}", id),
    }
  }

  fn to_label_id(&self) -> u32 {
    match self {
      PpeLabel::Helmet => 0,
      PpeLabel::Gloves => 1,
      PpeLabel::Vest => 2,
      PpeLabel::Boots => 3,
      PpeLabel::Goggles => 4,
      PpeLabel::Other(id) => *id,
    }
  }

  fn from_label_id(id: u32) -> Self {
    match id {
      0 => PpeLabel::Helmet,
      1 => PpeLabel::Gloves,
      2 => PpeLabel::Vest,
      3 => PpeLabel::Boots,
      4 => PpeLabel::Goggles,
      other => PpeLabel::Other(other),
    }
  }
}

/// 模型加载错误，只在启动时出现，无法恢复
#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型文件不存在: {0}")]
  ModelMissing(PathBuf),
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("ONNX Runtime 错误: {0}")]
  Session(#[from] ort::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型路径错误: {0}")]
  ModelPath(#[from] UrlError),
}

/// 推理错误，只终止当前这次检测
#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("ONNX Runtime 错误: {0}")]
  Session(#[from] ort::Error),
  #[error("模型输出形状异常: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("推理失败: {0}")]
  Backend(String),
}

/// 按配置构建模型
pub trait LoadModel {
  type Model;

  fn load(&self) -> Result<Self::Model, LoadError>;
}

/// 每个进程只加载一次模型，之后返回同一个句柄
pub struct ModelLoader<B: LoadModel> {
  builder: B,
  handle: Mutex<Option<Arc<B::Model>>>,
}

impl<B: LoadModel> ModelLoader<B> {
  pub fn new(builder: B) -> Self {
    Self {
      builder,
      handle: Mutex::new(None),
    }
  }

  pub fn load(&self) -> Result<Arc<B::Model>, LoadError> {
    let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(model) = handle.as_ref() {
      debug!("复用已加载的模型");
      return Ok(Arc::clone(model));
    }

    let model = Arc::new(self.builder.load()?);
    info!("模型已缓存");
    *handle = Some(Arc::clone(&model));
    Ok(model)
  }
}

mod yolov5;
pub use self::yolov5::{ExecutionProvider, Yolov5, Yolov5Builder};

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingBuilder {
    calls: AtomicUsize,
    fail: bool,
  }

  impl LoadModel for CountingBuilder {
    type Model = String;

    fn load(&self) -> Result<Self::Model, LoadError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.fail {
        return Err(LoadError::ModelMissing(PathBuf::from("model/best.onnx")));
      }
      Ok("detector".to_string())
    }
  }

  #[test]
  fn loader_returns_the_same_handle() {
    let loader = ModelLoader::new(CountingBuilder {
      calls: AtomicUsize::new(0),
      fail: false,
    });

    let first = loader.load().unwrap();
    let second = loader.load().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.builder.calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn loader_surfaces_load_errors() {
    let loader = ModelLoader::new(CountingBuilder {
      calls: AtomicUsize::new(0),
      fail: true,
    });

    assert!(matches!(loader.load(), Err(LoadError::ModelMissing(_))));
  }

  #[test]
  fn ppe_labels_round_trip_ids() {
    for id in 0..7 {
      assert_eq!(PpeLabel::from_label_id(id).to_label_id(), id);
    }
    assert_eq!(PpeLabel::from_label_id(0).to_label_str(), "helmet");
    assert_eq!(PpeLabel::from_label_id(9).to_label_str(), "class-9");
  }

  #[test]
  fn empty_result_reports_empty() {
    let result = DetectResult::<PpeLabel>::default();
    assert!(result.is_empty());
    assert_eq!(result.len(), 0);
  }
}
