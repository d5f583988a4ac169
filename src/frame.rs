// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/frame.rs - RGB 帧与 NCHW 张量
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

use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;

const RGB_CHANNELS: usize = 3;
// YOLOv5 letterbox 填充灰度
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self {
      image,
      index: 0,
      timestamp_ms: 0,
    }
  }
}

impl Frame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 等比缩放并居中填充到 `width`x`height`，输出归一化的 NCHW 张量
  pub fn to_letterboxed_nchw(&self, width: u32, height: u32) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(self.width(), self.height(), width, height);
    let resized = image::imageops::resize(
      &self.image,
      letterbox.resized_width,
      letterbox.resized_height,
      FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::from_elem(
      (1, RGB_CHANNELS, height as usize, width as usize),
      LETTERBOX_FILL,
    );
    let (offset_x, offset_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
      let (tx, ty) = (offset_x + x as usize, offset_y + y as usize);
      if tx >= width as usize || ty >= height as usize {
        continue;
      }
      for c in 0..RGB_CHANNELS {
        tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
      }
    }

    (tensor, letterbox)
  }
}

/// letterbox 几何信息，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub resized_width: u32,
  pub resized_height: u32,
  pub source_width: u32,
  pub source_height: u32,
}

impl Letterbox {
  pub fn fit(source_width: u32, source_height: u32, width: u32, height: u32) -> Self {
    let scale = (width as f32 / source_width.max(1) as f32)
      .min(height as f32 / source_height.max(1) as f32);
    let resized_width = ((source_width as f32 * scale).round() as u32).clamp(1, width);
    let resized_height = ((source_height as f32 * scale).round() as u32).clamp(1, height);

    Self {
      scale,
      pad_x: ((width - resized_width) / 2) as f32,
      pad_y: ((height - resized_height) / 2) as f32,
      resized_width,
      resized_height,
      source_width,
      source_height,
    }
  }

  /// 模型输入坐标 -> 原图归一化坐标，结果截断到 [0, 1]
  pub fn to_normalized(&self, x: f32, y: f32) -> (f32, f32) {
    let sx = (x - self.pad_x) / self.scale;
    let sy = (y - self.pad_y) / self.scale;
    (
      (sx / self.source_width.max(1) as f32).clamp(0.0, 1.0),
      (sy / self.source_height.max(1) as f32).clamp(0.0, 1.0),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn letterbox_pads_the_short_side() {
    let lb = Letterbox::fit(1280, 720, 640, 640);
    assert_eq!(lb.resized_width, 640);
    assert_eq!(lb.resized_height, 360);
    assert_eq!(lb.pad_x, 0.0);
    assert_eq!(lb.pad_y, 140.0);
  }

  #[test]
  fn letterbox_maps_back_to_source() {
    let lb = Letterbox::fit(1280, 720, 640, 640);
    let (x, y) = lb.to_normalized(320.0, 320.0);
    assert!((x - 0.5).abs() < 1e-4);
    assert!((y - 0.5).abs() < 1e-4);

    // 填充区域被截断
    let (_, top) = lb.to_normalized(0.0, 10.0);
    assert_eq!(top, 0.0);
  }

  #[test]
  fn nchw_tensor_keeps_channel_planes() {
    let image = RgbImage::from_pixel(4, 4, Rgb([255, 0, 51]));
    let frame = Frame::from(image);
    let (tensor, lb) = frame.to_letterboxed_nchw(8, 8);

    assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
    assert_eq!(lb.scale, 2.0);
    assert!((tensor[[0, 0, 4, 4]] - 1.0).abs() < 1e-6);
    assert!(tensor[[0, 1, 4, 4]].abs() < 1e-6);
    assert!((tensor[[0, 2, 4, 4]] - 0.2).abs() < 1e-6);
  }

  #[test]
  fn nchw_tensor_fills_padding() {
    let image = RgbImage::from_pixel(8, 4, Rgb([0, 0, 0]));
    let (tensor, lb) = Frame::from(image).to_letterboxed_nchw(8, 8);
    assert_eq!(lb.pad_y, 2.0);
    assert!((tensor[[0, 0, 0, 0]] - LETTERBOX_FILL).abs() < 1e-6);
    assert!(tensor[[0, 0, 3, 3]].abs() < 1e-6);
  }
}
