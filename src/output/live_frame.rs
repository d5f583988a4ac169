// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/output/live_frame.rs - 实时画面输出
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

use std::sync::{Arc, Mutex};

use image::{RgbImage, codecs::jpeg::JpegEncoder};
use serde::Serialize;
use tracing::debug;

use crate::{
  frame::Frame,
  model::{DetectResult, WithLabel},
  output::{Annotated, Render, RenderError},
};

const DEFAULT_JPEG_QUALITY: u8 = 80;

/// 编码好的最新一帧
#[derive(Debug, Clone)]
pub struct FramePacket {
  pub jpeg: Vec<u8>,
  pub detections: Vec<DetectionSummary>,
  pub frame_number: u64,
  pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetectionSummary {
  pub class: String,
  pub score: f32,
  pub bbox: [f32; 4],
}

impl DetectionSummary {
  pub fn from_result<T: WithLabel>(result: &DetectResult<T>) -> Vec<Self> {
    result
      .items
      .iter()
      .map(|item| Self {
        class: item.kind.to_label_str(),
        score: item.score,
        bbox: item.bbox,
      })
      .collect()
  }
}

pub type SharedFrame = Arc<Mutex<Option<FramePacket>>>;

/// 把检测结果编码为 JPEG 放入共享槽位，供页面实时显示
#[derive(Clone)]
pub struct LiveFrameOutput {
  slot: SharedFrame,
  jpeg_quality: u8,
}

impl LiveFrameOutput {
  pub fn new(slot: SharedFrame) -> Self {
    Self {
      slot,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
    }
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality.clamp(1, 100);
    self
  }

  pub fn slot(&self) -> &SharedFrame {
    &self.slot
  }

  pub fn clear(&self) {
    *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
  }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, RenderError> {
  let mut jpeg = Vec::new();
  JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(image)?;
  Ok(jpeg)
}

impl<T: WithLabel> Render<Frame, Annotated<T>> for LiveFrameOutput {
  type Error = RenderError;

  fn render_result(&self, frame: &Frame, result: &Annotated<T>) -> Result<(), Self::Error> {
    let packet = FramePacket {
      jpeg: encode_jpeg(&result.image, self.jpeg_quality)?,
      detections: DetectionSummary::from_result(&result.result),
      frame_number: frame.index,
      timestamp_ms: frame.timestamp_ms,
    };
    debug!("更新实时画面: 第 {} 帧, {} 字节", packet.frame_number, packet.jpeg.len());

    *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(packet);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, PpeLabel};
  use image::Rgb;

  #[test]
  fn publishes_the_latest_frame() {
    let output = LiveFrameOutput::new(SharedFrame::default()).with_jpeg_quality(90);
    let image = RgbImage::from_pixel(16, 16, Rgb([200, 10, 10]));
    let mut frame = Frame::from(image.clone());
    frame.index = 7;

    let annotated = Annotated {
      image,
      result: DetectResult {
        items: vec![DetectItem {
          kind: PpeLabel::Vest,
          score: 0.5,
          bbox: [0.1, 0.1, 0.9, 0.9],
        }]
        .into_boxed_slice(),
      },
    };
    output.render_result(&frame, &annotated).unwrap();

    let packet = output.slot().lock().unwrap().clone().unwrap();
    assert_eq!(packet.frame_number, 7);
    assert_eq!(packet.detections[0].class, "vest");
    let decoded = image::load_from_memory(&packet.jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 16));

    output.clear();
    assert!(output.slot().lock().unwrap().is_none());
  }
}
