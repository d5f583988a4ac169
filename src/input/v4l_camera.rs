// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/input/v4l_camera.rs - V4L2 摄像头输入
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

use std::pin::Pin;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  frame::Frame,
  input::{CaptureError, InputSource, InputSourceType},
};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Yuyv,
  Mjpeg,
}

/// V4L2 摄像头输入源
///
/// v4l 的 Stream 需要引用 Device，所以 Device 放在 Pin<Box> 中保证地址稳定。
/// 摄像头在本结构体 drop 时释放。
pub struct V4lCamera {
  /// 捕获流（生命周期与 device 关联，先于 device 释放）
  stream: Option<Stream<'static>>,
  /// V4L2 设备
  _device: Pin<Box<Device>>,
  device_path: String,
  pixel_format: PixelFormat,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl V4lCamera {
  /// 按编号打开摄像头，例如 0 对应 /dev/video0
  pub fn open(index: usize) -> Result<Self, CaptureError> {
    let device_path = format!("/dev/video{}", index);
    let device = Box::pin(Device::new(index).map_err(|source| {
      CaptureError::DeviceUnavailable {
        path: device_path.clone(),
        source,
      }
    })?);

    let mut format = device
      .format()
      .map_err(|e| CaptureError::Format(e.to_string()))?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(|e| CaptureError::Format(e.to_string()))?;

    let pixel_format = match &format.fourcc.repr {
      b"YUYV" => PixelFormat::Yuyv,
      b"MJPG" => PixelFormat::Mjpeg,
      other => {
        return Err(CaptureError::UnsupportedPixelFormat(
          String::from_utf8_lossy(other).into_owned(),
        ));
      }
    };

    // SAFETY: device 被 Pin<Box> 固定在堆上不会移动；stream 与 device 存放在
    // 同一个结构体中，Drop 中先释放 stream，再释放 device
    let device_ref: &Device = &device;
    let device_static: &'static Device = unsafe { std::mem::transmute(device_ref) };
    let stream = Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)?;

    info!(
      "摄像头已打开: {} {}x{} {:?}",
      device_path, format.width, format.height, pixel_format
    );

    Ok(Self {
      stream: Some(stream),
      _device: device,
      device_path,
      pixel_format,
      frame_index: 0,
      width: format.width,
      height: format.height,
      start_time: Instant::now(),
    })
  }

  fn decode(&self, buffer: &[u8]) -> Result<RgbImage, CaptureError> {
    match self.pixel_format {
      PixelFormat::Yuyv => {
        let rgb = yuyv_to_rgb(buffer, self.width, self.height);
        RgbImage::from_raw(self.width, self.height, rgb).ok_or(CaptureError::NoData)
      }
      PixelFormat::Mjpeg => image::load_from_memory_with_format(buffer, image::ImageFormat::Jpeg)
        .map(|image| image.to_rgb8())
        .map_err(|e| CaptureError::Format(e.to_string())),
    }
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks_exact(4) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl Drop for V4lCamera {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
    info!("摄像头已释放: {}", self.device_path);
  }
}

impl Iterator for V4lCamera {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    let buffer = match stream.next() {
      Ok((buffer, meta)) if meta.bytesused > 0 => buffer[..meta.bytesused as usize].to_vec(),
      Ok(_) => return Some(Err(CaptureError::NoData)),
      Err(e) => return Some(Err(CaptureError::ReadFailed(e))),
    };

    let image = match self.decode(&buffer) {
      Ok(image) => image,
      Err(e) => return Some(Err(e)),
    };

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
    };
    debug!("捕获第 {} 帧", frame.index);
    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl InputSource for V4lCamera {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Camera
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_grey_maps_to_grey() {
    let rgb = yuyv_to_rgb(&[128, 128, 64, 128], 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }

  #[test]
  fn yuyv_ignores_trailing_bytes() {
    let rgb = yuyv_to_rgb(&[0, 128, 0, 128, 255, 255], 2, 1);
    assert_eq!(rgb.len(), 6);
  }
}
