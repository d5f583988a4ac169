// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/task/streaming.rs - 摄像头视频流会话
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

use std::{fmt, sync::Mutex, time::Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
  context::AppContext,
  frame::Frame,
  input::{CaptureError, InputSource, InputSourceType},
  model::{DetectResult, InferenceError, Model, WithLabel},
  output::{Annotated, Render},
  task::{SessionError, StopSignal},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
  #[default]
  Idle,
  Running,
  Stopped,
}

/// 视频流结束的原因
#[derive(Debug)]
pub enum StopReason {
  /// 收到停止信号
  Signal,
  /// 达到指定帧数
  FrameLimit,
  Capture(CaptureError),
  Inference(InferenceError),
  Render(String),
}

impl fmt::Display for StopReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StopReason::Signal => write!(f, "已停止"),
      StopReason::FrameLimit => write!(f, "达到指定帧数"),
      StopReason::Capture(e) => write!(f, "无法获取画面: {}", e),
      StopReason::Inference(e) => write!(f, "推理失败: {}", e),
      StopReason::Render(e) => write!(f, "显示失败: {}", e),
    }
  }
}

impl StopReason {
  pub fn is_failure(&self) -> bool {
    !matches!(self, StopReason::Signal | StopReason::FrameLimit)
  }

  /// 供界面判断的原因代码，与日志文字无关
  pub fn code(&self) -> &'static str {
    match self {
      StopReason::Signal => "signal",
      StopReason::FrameLimit => "frame_limit",
      StopReason::Capture(_) => "capture",
      StopReason::Inference(_) => "inference",
      StopReason::Render(_) => "render",
    }
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStatus {
  pub state: StreamState,
  pub frames: u64,
  /// 当前或最近一次打开的输入源
  pub source: Option<InputSourceType>,
  pub resolution: Option<[u32; 2]>,
  /// 结束原因代码，见 [`StopReason::code`]
  pub reason: Option<&'static str>,
  pub failed: bool,
  pub message: Option<String>,
}

/// 摄像头视频流会话: Idle -> Running -> Stopped
///
/// 摄像头在 `run` 内打开，并在 `run` 返回前释放（包括出错和 panic 展开）。
/// 同一时间只允许一个视频流运行。
pub struct StreamingSession {
  status: Mutex<StreamStatus>,
  frame_limit: Option<u64>,
}

impl Default for StreamingSession {
  fn default() -> Self {
    Self {
      status: Mutex::new(StreamStatus::default()),
      frame_limit: None,
    }
  }
}

// panic 展开时把状态置为 Stopped
struct RunningGuard<'a>(&'a StreamingSession);

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    let mut status = self.0.lock_status();
    if status.state == StreamState::Running {
      status.state = StreamState::Stopped;
      status.failed = true;
      status.reason = Some("panic");
      status.message = Some("视频流异常退出".to_string());
    }
  }
}

impl StreamingSession {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_frame_limit(mut self, frame_limit: Option<u64>) -> Self {
    self.frame_limit = frame_limit.filter(|n| *n > 0);
    self
  }

  pub fn status(&self) -> StreamStatus {
    self.lock_status().clone()
  }

  pub fn is_running(&self) -> bool {
    self.lock_status().state == StreamState::Running
  }

  fn lock_status(&self) -> std::sync::MutexGuard<'_, StreamStatus> {
    self.status.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn begin(&self) -> Result<RunningGuard<'_>, SessionError> {
    let mut status = self.lock_status();
    if status.state == StreamState::Running {
      return Err(SessionError::AlreadyRunning);
    }
    *status = StreamStatus {
      state: StreamState::Running,
      ..StreamStatus::default()
    };
    Ok(RunningGuard(self))
  }

  /// 打开摄像头并循环: 取帧 -> 推理 -> 显示 -> 检查停止信号
  ///
  /// 任何一步失败都会结束视频流，不会自动重试。
  pub fn run<S, M, L, O>(
    &self,
    open: impl FnOnce() -> Result<S, CaptureError>,
    ctx: &AppContext<M>,
    output: &O,
    stop: &StopSignal,
  ) -> Result<StopReason, SessionError>
  where
    S: InputSource,
    M: Model<Input = Frame, Output = DetectResult<L>, Error = InferenceError>,
    L: WithLabel,
    O: Render<Frame, Annotated<L>>,
    O::Error: fmt::Display,
  {
    let _guard = self.begin()?;
    info!("开始视频流任务...");

    let reason = match open() {
      Ok(source) => {
        info!(
          "输入源已打开: {} {}x{}",
          source.source_type(),
          source.width(),
          source.height()
        );
        {
          let mut status = self.lock_status();
          status.source = Some(source.source_type());
          status.resolution = Some([source.width(), source.height()]);
        }
        self.pump(source, ctx, output, stop)
      }
      Err(e) => {
        warn!("无法打开摄像头: {}", e);
        StopReason::Capture(e)
      }
    };

    let mut status = self.lock_status();
    status.state = StreamState::Stopped;
    status.reason = Some(reason.code());
    status.failed = reason.is_failure();
    status.message = Some(reason.to_string());
    if reason.is_failure() {
      warn!("视频流结束: {}", reason);
    } else {
      info!("视频流结束: {}，共处理 {} 帧", reason, status.frames);
    }

    Ok(reason)
  }

  // source 在此函数返回时被 drop，摄像头随之释放
  fn pump<S, M, L, O>(&self, mut source: S, ctx: &AppContext<M>, output: &O, stop: &StopSignal) -> StopReason
  where
    S: InputSource,
    M: Model<Input = Frame, Output = DetectResult<L>, Error = InferenceError>,
    L: WithLabel,
    O: Render<Frame, Annotated<L>>,
    O::Error: fmt::Display,
  {
    let mut processed = 0u64;
    loop {
      let now = Instant::now();
      let frame = match source.next() {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => return StopReason::Capture(e),
        None => return StopReason::Capture(CaptureError::NoData),
      };

      let annotated = match ctx.detect(&frame) {
        Ok(annotated) => annotated,
        Err(e) => return StopReason::Inference(e),
      };

      if let Err(e) = output.render_result(&frame, &annotated) {
        return StopReason::Render(e.to_string());
      }

      processed += 1;
      self.lock_status().frames = processed;
      info!("处理第 {} 帧，耗时: {:.2?}", processed, now.elapsed());

      if self.frame_limit.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        return StopReason::FrameLimit;
      }
      if stop.is_triggered() {
        warn!("收到停止信号，退出任务循环");
        return StopReason::Signal;
      }
    }
  }
}
