// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/task.rs - 单张检测与视频流任务
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use thiserror::Error;

use crate::model::InferenceError;

mod single_shot;
mod streaming;

pub use self::single_shot::{SingleShotSession, SingleShotState};
pub use self::streaming::{StopReason, StreamState, StreamStatus, StreamingSession};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("还没有上传图像")]
  NoImage,
  #[error("视频流已在运行")]
  AlreadyRunning,
  #[error("检测期间图像已被替换")]
  Superseded,
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
  #[error("无法创建视频流线程: {0}")]
  Spawn(std::io::Error),
}

/// 停止信号，由界面、Ctrl-C 等设置，视频流每轮检查一次
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn trigger(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_triggered(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  pub fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }
}
