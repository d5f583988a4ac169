// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbImage;
use thiserror::Error;

use crate::{UrlError, model::DetectResult};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod draw;

mod save_image_file;
pub use self::save_image_file::SaveImageFileOutput;

mod live_frame;
pub use self::live_frame::{DetectionSummary, FramePacket, LiveFrameOutput, SharedFrame, encode_jpeg};

/// 一次检测的结果：框选后的图像和检测项
#[derive(Debug, Clone)]
pub struct Annotated<T> {
  /// 与输入同尺寸、画好检测框的图像
  pub image: RgbImage,
  pub result: DetectResult<T>,
}

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("字体无效: {0}")]
  Font(String),
  #[error(transparent)]
  Url(#[from] UrlError),
}
