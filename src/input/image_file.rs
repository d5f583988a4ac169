// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/input/image_file.rs - 图像文件输入
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

use image::ImageFormat;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{CaptureError, DecodeError, InputSource, InputSourceType},
  path_from_url,
};

/// 单张 JPEG/PNG 图像，迭代一次后耗尽
pub struct ImageFileInput {
  image: Option<Frame>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = DecodeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let path = path_from_url(url, Self::SCHEME)?;
    Self::open(path)
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
    let bytes = std::fs::read(path.as_ref())?;
    debug!("读取图片文件: {}", path.as_ref().display());
    Self::from_bytes(&bytes)
  }

  /// 解码上传的字节，只接受 JPEG 和 PNG
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
    if bytes.is_empty() {
      return Err(DecodeError::Empty);
    }

    let format = match image::guess_format(bytes) {
      Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => format,
      Ok(other) => {
        warn!("拒绝图像格式: {:?}", other);
        return Err(DecodeError::UnsupportedFormat(format!("{:?}", other)));
      }
      Err(_) => return Err(DecodeError::UnsupportedFormat("未知".to_string())),
    };

    let image = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
    let (width, height) = image.dimensions();
    debug!("图片解码完成: {:?} {}x{}", format, width, height);

    Ok(Self {
      image: Some(Frame::from(image)),
      width,
      height,
    })
  }

  pub fn into_frame(mut self) -> Option<Frame> {
    self.image.take()
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(Ok)
  }
}

impl InputSource for ImageFileInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Image
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }
}
