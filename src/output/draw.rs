// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::info;

use crate::{
  frame::Frame,
  model::{DetectItem, DetectResult, WithLabel},
  output::{Annotated, RenderError},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 没有字体时按每字符宽度估算标签长度
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: u32 = 12;

/// 检测框绘制器
///
/// 配置字体时在标签底色上写出 "类别 置信度"，否则只画边框和标签底色。
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, RenderError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontArc::try_from_vec(data).map_err(|e| RenderError::Font(e.to_string()))?;
    info!("加载标签字体: {}", path.as_ref().display());

    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  /// 复制输入帧并画上检测结果，输出尺寸与输入一致
  pub fn annotate<T: WithLabel>(&self, frame: &Frame, result: DetectResult<T>) -> Annotated<T> {
    let mut image = frame.image.clone();
    self.draw_detections_on_image(&mut image, &result);
    Annotated { image, result }
  }

  pub fn draw_detections_on_image<T: WithLabel>(&self, image: &mut RgbImage, result: &DetectResult<T>) {
    for DetectItem { kind, score, bbox } in result.items.iter() {
      let color = label_color(kind.to_label_id());
      self.draw_bbox_with_label(image, bbox, kind, *score, color);
    }
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label<T: WithLabel>(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    kind: &T,
    score: f32,
    color: Rgb<u8>,
  ) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗
    for t in 0..BOX_THICKNESS {
      let (width, height) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!("{} {:.2}", kind.to_label_str(), score);
    let scale = PxScale::from(self.font_size);

    let text_width = match &self.font {
      Some(font) => text_size(scale, font, &label).0 as i32 + 4,
      None => (label.len() as f32 * self.label_char_width) as i32,
    };
    let text_height = self.label_text_height;

    // 标签放在边框上方，空间不够时贴着图像顶部
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);
    let label_width = text_width.min(w as i32 - label_x).max(0) as u32;
    let label_height = text_height.min(h as i32 - label_y).max(0) as u32;

    if label_width == 0 || label_height == 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x + 2,
        label_y + self.label_text_vertical_padding,
        scale,
        font,
        &label,
      );
    }
  }
}

/// 每个类别一种颜色
pub fn label_color(label_id: u32) -> Rgb<u8> {
  let hue = (label_id % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32 * 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h as u32 {
    0..60 => (c, x, 0.0),
    60..120 => (x, c, 0.0),
    120..180 => (0.0, c, x),
    180..240 => (0.0, x, c),
    240..300 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
