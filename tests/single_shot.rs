// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// tests/single_shot.rs - 单张图像检测流程测试
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

use std::sync::Arc;

use image::{Rgb, RgbImage};

use safegear::{
  FromUrl,
  config::parse_image_location,
  context::AppContext,
  frame::Frame,
  input::{DecodeError, ImageFileInput},
  model::{DetectItem, DetectResult, InferenceError, Model, PpeLabel},
  output::{Render, SaveImageFileOutput, draw::Draw},
  task::{SingleShotSession, SingleShotState},
};

struct VestModel;

impl Model for VestModel {
  type Input = Frame;
  type Output = DetectResult<PpeLabel>;
  type Error = InferenceError;

  fn infer(&self, _input: &Frame) -> Result<Self::Output, Self::Error> {
    Ok(DetectResult {
      items: vec![DetectItem {
        kind: PpeLabel::Vest,
        score: 0.77,
        bbox: [0.25, 0.3, 0.75, 0.9],
      }]
      .into_boxed_slice(),
    })
  }
}

#[test]
fn png_file_is_detected_and_saved() {
  let dir = tempfile::tempdir().unwrap();
  let input_path = dir.path().join("worker site.png");
  let output_path = dir.path().join("out").join("result.png");
  RgbImage::from_pixel(640, 640, Rgb([30, 90, 150]))
    .save(&input_path)
    .unwrap();

  let input_url = parse_image_location(input_path.to_str().unwrap()).unwrap();
  let output_url = parse_image_location(output_path.to_str().unwrap()).unwrap();

  let ctx = AppContext::new(Arc::new(VestModel), Draw::default());
  let output = SaveImageFileOutput::from_url(&output_url).unwrap();
  let mut session = SingleShotSession::<PpeLabel>::new();

  session.accept(ImageFileInput::from_url(&input_url)).unwrap();
  let frame = session.image().cloned().unwrap();
  let annotated = session.detect(&ctx).unwrap();
  output.render_result(&frame, annotated).unwrap();

  assert_eq!(session.state(), SingleShotState::ResultShown);
  let saved = image::open(&output_path).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (640, 640));
  assert_ne!(saved, frame.image);
}

#[test]
fn missing_file_leaves_the_session_idle() {
  let dir = tempfile::tempdir().unwrap();
  let url = parse_image_location(dir.path().join("nope.jpg").to_str().unwrap()).unwrap();

  let mut session = SingleShotSession::<PpeLabel>::new();
  let err = session.accept(ImageFileInput::from_url(&url)).unwrap_err();

  assert!(matches!(err, DecodeError::Io(_) | DecodeError::Corrupt(_)));
  assert_eq!(session.state(), SingleShotState::Idle);
  assert!(session.image().is_none());
}
