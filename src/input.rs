// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/input.rs - 图像/摄像头输入
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

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::{UrlError, frame::Frame};

mod image_file;
pub use self::image_file::ImageFileInput;

#[cfg(feature = "v4l_input")]
mod v4l_camera;
#[cfg(feature = "v4l_input")]
pub use self::v4l_camera::V4lCamera;

/// 约定使用的摄像头编号
pub const DEFAULT_CAMERA_INDEX: usize = 0;

/// 上传图像解码错误，用户重新上传即可
#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("上传内容为空")]
  Empty,
  #[error("不支持的图像格式: {0}（仅支持 JPEG/PNG）")]
  UnsupportedFormat(String),
  #[error("图像解码错误: {0}")]
  Corrupt(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Url(#[from] UrlError),
}

/// 摄像头采集错误，结束当前的视频流会话
#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("无法打开摄像头 {path}: {source}")]
  DeviceUnavailable {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("摄像头格式错误: {0}")]
  Format(String),
  #[error("无法捕获帧: {0}")]
  ReadFailed(#[from] std::io::Error),
  #[error("摄像头没有返回数据")]
  NoData,
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("未启用摄像头输入")]
  Unsupported,
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSourceType {
  /// 图片文件
  Image,
  /// V4L2 摄像头
  Camera,
}

impl fmt::Display for InputSourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InputSourceType::Image => write!(f, "图片"),
      InputSourceType::Camera => write!(f, "摄像头"),
    }
  }
}

/// 输入源，逐帧产生 RGB 图像
pub trait InputSource: Iterator<Item = Result<Frame, CaptureError>> {
  /// 获取输入源类型
  fn source_type(&self) -> InputSourceType;

  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;
}

impl<S: InputSource + ?Sized> InputSource for Box<S> {
  fn source_type(&self) -> InputSourceType {
    (**self).source_type()
  }

  fn width(&self) -> u32 {
    (**self).width()
  }

  fn height(&self) -> u32 {
    (**self).height()
  }
}

/// 打开约定的摄像头
pub fn open_default_camera() -> Result<Box<dyn InputSource + Send>, CaptureError> {
  #[cfg(feature = "v4l_input")]
  {
    let camera = V4lCamera::open(DEFAULT_CAMERA_INDEX)?;
    Ok(Box::new(camera))
  }
  #[cfg(not(feature = "v4l_input"))]
  {
    Err(CaptureError::Unsupported)
  }
}
