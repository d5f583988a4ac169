// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/task/single_shot.rs - 单张图像检测会话
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

use serde::Serialize;
use tracing::{info, warn};

use crate::{
  context::AppContext,
  frame::Frame,
  input::{DecodeError, ImageFileInput},
  model::{DetectResult, InferenceError, Model, WithLabel},
  output::Annotated,
  task::SessionError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleShotState {
  Idle,
  ImageLoaded,
  Detecting,
  ResultShown,
}

/// 上传图像 -> 点击检测 -> 显示结果
///
/// 新的上传总会清掉上一次的结果；上传失败回到 Idle，不保留旧图像。
/// 检测失败回到 ImageLoaded，等待用户再次点击。
pub struct SingleShotSession<L> {
  state: SingleShotState,
  image: Option<Frame>,
  result: Option<Annotated<L>>,
  notice: Option<String>,
}

impl<L> Default for SingleShotSession<L> {
  fn default() -> Self {
    Self {
      state: SingleShotState::Idle,
      image: None,
      result: None,
      notice: None,
    }
  }
}

impl<L: WithLabel> SingleShotSession<L> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> SingleShotState {
    self.state
  }

  pub fn image(&self) -> Option<&Frame> {
    self.image.as_ref()
  }

  pub fn result(&self) -> Option<&Annotated<L>> {
    self.result.as_ref()
  }

  /// 最近一次操作留给用户的提示
  pub fn notice(&self) -> Option<&str> {
    self.notice.as_deref()
  }

  pub fn upload(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
    self.accept(ImageFileInput::from_bytes(bytes))
  }

  pub fn accept(&mut self, decoded: Result<ImageFileInput, DecodeError>) -> Result<(), DecodeError> {
    self.result = None;

    let decoded = decoded.and_then(|input| input.into_frame().ok_or(DecodeError::Empty));
    match decoded {
      Ok(frame) => {
        info!("图像已上传: {}x{}", frame.width(), frame.height());
        self.image = Some(frame);
        self.state = SingleShotState::ImageLoaded;
        self.notice = None;
        Ok(())
      }
      Err(e) => {
        warn!("图像上传失败: {}", e);
        self.image = None;
        self.state = SingleShotState::Idle;
        self.notice = Some(format!("无法读取上传的图像: {}", e));
        Err(e)
      }
    }
  }

  pub fn detect<M>(&mut self, ctx: &AppContext<M>) -> Result<&Annotated<L>, SessionError>
  where
    M: Model<Input = Frame, Output = DetectResult<L>, Error = InferenceError>,
  {
    let frame = self.begin_detect()?;
    let outcome = ctx.detect(&frame);
    self.finish_detect(outcome)
  }

  /// 进入 Detecting 并返回图像副本，推理期间不需要持有会话
  pub fn begin_detect(&mut self) -> Result<Frame, SessionError> {
    let Some(frame) = self.image.as_ref() else {
      self.notice = Some("请先上传图像".to_string());
      return Err(SessionError::NoImage);
    };
    let frame = frame.clone();

    self.state = SingleShotState::Detecting;
    self.result = None;
    info!("开始检测...");
    Ok(frame)
  }

  /// 记录推理结果；推理期间图像已被替换时丢弃结果
  pub fn finish_detect(
    &mut self,
    outcome: Result<Annotated<L>, InferenceError>,
  ) -> Result<&Annotated<L>, SessionError> {
    if self.state != SingleShotState::Detecting {
      warn!("检测期间图像已更换，丢弃本次结果");
      return Err(SessionError::Superseded);
    }

    match outcome {
      Ok(annotated) => {
        self.state = SingleShotState::ResultShown;
        self.notice = Some(format!("检测完成！共 {} 个目标", annotated.result.len()));
        Ok(self.result.insert(annotated))
      }
      Err(e) => {
        warn!("检测失败: {}", e);
        self.state = SingleShotState::ImageLoaded;
        self.notice = Some(format!("检测失败: {}", e));
        Err(e.into())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::testing::{FakeModel, context};
  use crate::model::PpeLabel;
  use image::{ImageFormat, Rgb, RgbImage};
  use std::io::Cursor;

  fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(width, height, Rgb([120, 140, 160]))
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
      .unwrap();
    bytes
  }

  #[test]
  fn upload_then_detect_shows_result() {
    let ctx = context(FakeModel::helmet());
    let mut session = SingleShotSession::<PpeLabel>::new();
    assert_eq!(session.state(), SingleShotState::Idle);

    session.upload(&jpeg(640, 640)).unwrap();
    assert_eq!(session.state(), SingleShotState::ImageLoaded);
    assert!(session.result().is_none());

    let annotated = session.detect(&ctx).unwrap();
    assert_eq!(annotated.image.dimensions(), (640, 640));
    assert_eq!(annotated.result.len(), 1);
    assert_eq!(session.state(), SingleShotState::ResultShown);
    assert_ne!(
      session.result().unwrap().image,
      session.image().unwrap().image
    );
  }

  #[test]
  fn corrupt_upload_returns_to_idle_without_stale_result() {
    let ctx = context(FakeModel::helmet());
    let mut session = SingleShotSession::<PpeLabel>::new();
    session.upload(&jpeg(32, 32)).unwrap();
    session.detect(&ctx).unwrap();

    let mut broken = jpeg(32, 32);
    broken.truncate(40);
    assert!(session.upload(&broken).is_err());

    assert_eq!(session.state(), SingleShotState::Idle);
    assert!(session.image().is_none());
    assert!(session.result().is_none());
    assert!(session.notice().is_some());

    // 仍然可以接受新的上传
    session.upload(&jpeg(16, 16)).unwrap();
    assert_eq!(session.state(), SingleShotState::ImageLoaded);
  }

  #[test]
  fn failed_detection_returns_to_image_loaded() {
    let ctx = context(FakeModel::failing_on(1));
    let mut session = SingleShotSession::<PpeLabel>::new();
    session.upload(&jpeg(64, 64)).unwrap();

    assert!(matches!(
      session.detect(&ctx),
      Err(SessionError::Inference(_))
    ));
    assert_eq!(session.state(), SingleShotState::ImageLoaded);
    assert!(session.result().is_none());
    assert!(session.notice().unwrap().contains("检测失败"));

    // 用户再次点击才会重试
    session.detect(&ctx).unwrap();
    assert_eq!(session.state(), SingleShotState::ResultShown);
  }

  #[test]
  fn detect_without_upload_is_rejected() {
    let ctx = context(FakeModel::helmet());
    let mut session = SingleShotSession::<PpeLabel>::new();
    assert!(matches!(session.detect(&ctx), Err(SessionError::NoImage)));
    assert_eq!(session.state(), SingleShotState::Idle);
  }

  #[test]
  fn upload_during_detection_discards_the_stale_result() {
    let ctx = context(FakeModel::helmet());
    let mut session = SingleShotSession::<PpeLabel>::new();
    session.upload(&jpeg(32, 32)).unwrap();

    let frame = session.begin_detect().unwrap();
    assert_eq!(session.state(), SingleShotState::Detecting);
    let outcome = ctx.detect(&frame);

    session.upload(&jpeg(48, 48)).unwrap();
    assert!(matches!(
      session.finish_detect(outcome),
      Err(SessionError::Superseded)
    ));
    assert_eq!(session.state(), SingleShotState::ImageLoaded);
    assert!(session.result().is_none());
    assert_eq!(session.image().unwrap().image.dimensions(), (48, 48));
  }

  #[test]
  fn new_upload_clears_previous_result() {
    let ctx = context(FakeModel::helmet());
    let mut session = SingleShotSession::<PpeLabel>::new();
    session.upload(&jpeg(32, 32)).unwrap();
    session.detect(&ctx).unwrap();

    session.upload(&jpeg(48, 48)).unwrap();
    assert_eq!(session.state(), SingleShotState::ImageLoaded);
    assert!(session.result().is_none());
    assert_eq!(session.image().unwrap().image.dimensions(), (48, 48));
  }
}
