// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/context.rs - 应用上下文
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

use std::{sync::Arc, time::Instant};

use tracing::{debug, info};

use crate::{
  frame::Frame,
  model::{DetectResult, InferenceError, Model, PpeLabel, WithLabel},
  output::{Annotated, draw::Draw},
};

/// 输出 PPE 检测结果的模型
pub trait PpeModel:
  Model<Input = Frame, Output = DetectResult<PpeLabel>, Error = InferenceError> + Send + Sync + 'static
{
}

impl<M> PpeModel for M where
  M: Model<Input = Frame, Output = DetectResult<PpeLabel>, Error = InferenceError>
    + Send
    + Sync
    + 'static
{
}

/// 启动时构造一次的应用上下文，持有只读的模型句柄和绘制器
pub struct AppContext<M> {
  model: Arc<M>,
  draw: Draw,
}

impl<M> AppContext<M> {
  pub fn new(model: Arc<M>, draw: Draw) -> Self {
    Self { model, draw }
  }
}

impl<M, L> AppContext<M>
where
  M: Model<Input = Frame, Output = DetectResult<L>, Error = InferenceError>,
  L: WithLabel,
{
  /// 推理并绘制检测框，输入帧不会被修改
  pub fn detect(&self, frame: &Frame) -> Result<Annotated<L>, InferenceError> {
    let now = Instant::now();
    let result = self.model.infer(frame)?;
    let elapsed = now.elapsed();
    info!(
      "第 {} 帧推理完成，检测到 {} 个对象，耗时: {:.2?}",
      frame.index,
      result.len(),
      elapsed
    );
    for item in result.items.iter() {
      debug!(
        "  - {}: {:.2}% at {:?}",
        item.kind.to_label_str(),
        item.score * 100.0,
        item.bbox
      );
    }

    Ok(self.draw.annotate(frame, result))
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::model::DetectItem;

  /// 返回固定检测结果的模型
  pub(crate) struct FakeModel {
    pub(crate) items: Vec<DetectItem<PpeLabel>>,
    pub(crate) fail_on_call: Option<usize>,
    pub(crate) calls: AtomicUsize,
  }

  impl FakeModel {
    pub(crate) fn helmet() -> Self {
      Self {
        items: vec![DetectItem {
          kind: PpeLabel::Helmet,
          score: 0.88,
          bbox: [0.3, 0.1, 0.7, 0.4],
        }],
        fail_on_call: None,
        calls: AtomicUsize::new(0),
      }
    }

    pub(crate) fn failing_on(call: usize) -> Self {
      Self {
        fail_on_call: Some(call),
        ..Self::helmet()
      }
    }
  }

  impl Model for FakeModel {
    type Input = Frame;
    type Output = DetectResult<PpeLabel>;
    type Error = InferenceError;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      if self.fail_on_call == Some(call) {
        return Err(InferenceError::Backend("模拟推理失败".to_string()));
      }
      Ok(DetectResult {
        items: self.items.clone().into_boxed_slice(),
      })
    }
  }

  pub(crate) fn context(model: FakeModel) -> AppContext<FakeModel> {
    AppContext::new(Arc::new(model), Draw::default())
  }
}
