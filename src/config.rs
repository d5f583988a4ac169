// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/config.rs - 命令行参数配置
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

use std::path::PathBuf;

use clap::Args;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFileInput,
  model::{ExecutionProvider, LoadError, ModelLoader, PpeLabel, Yolov5Builder},
  output::{RenderError, draw::Draw},
};

/// 模型相关参数，各个程序共用
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
  /// YOLOv5 ONNX 模型（yolov5:///path/to/best.onnx 或文件路径）
  #[arg(long, value_name = "MODEL", value_parser = parse_model_location)]
  pub model: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long = "iou", default_value = "0.45", value_name = "THRESHOLD")]
  pub iou_threshold: f32,

  /// 推理设备
  #[arg(long, value_enum, default_value = "cpu")]
  pub provider: ExecutionProvider,

  /// 标签字体文件（TTF），不指定时只画检测框
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

impl ModelArgs {
  pub fn loader(&self) -> Result<ModelLoader<Yolov5Builder<PpeLabel>>, LoadError> {
    let builder = Yolov5Builder::from_url(&self.model)?
      .confidence(self.confidence)
      .iou_threshold(self.iou_threshold)
      .provider(self.provider);
    Ok(ModelLoader::new(builder))
  }

  pub fn draw(&self) -> Result<Draw, RenderError> {
    match &self.font {
      Some(path) => Draw::with_font_file(path),
      None => Ok(Draw::default()),
    }
  }
}

/// 带方案的 URL 原样使用，普通路径转为 `scheme:///绝对路径`
pub fn parse_location(value: &str, scheme: &str) -> Result<Url, String> {
  if let Ok(url) = Url::parse(value)
    && url.scheme().len() > 1
  {
    return Ok(url);
  }

  let path = PathBuf::from(value);
  let path = if path.is_absolute() {
    path
  } else {
    std::env::current_dir()
      .map_err(|e| format!("无法获取当前目录: {}", e))?
      .join(path)
  };

  let mut url = Url::parse(&format!("{}://", scheme)).map_err(|e| e.to_string())?;
  url.set_path(&path.to_string_lossy());
  Ok(url)
}

pub fn parse_model_location(value: &str) -> Result<Url, String> {
  parse_location(value, Yolov5Builder::<PpeLabel>::SCHEME)
}

pub fn parse_image_location(value: &str) -> Result<Url, String> {
  parse_location(value, ImageFileInput::SCHEME)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::path_from_url;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct TestArgs {
    #[command(flatten)]
    model: ModelArgs,
  }

  #[test]
  fn plain_paths_become_scheme_urls() {
    let url = parse_model_location("/opt/models/best model.onnx").unwrap();
    assert_eq!(url.scheme(), "yolov5");
    assert_eq!(
      path_from_url(&url, "yolov5").unwrap(),
      PathBuf::from("/opt/models/best model.onnx")
    );
  }

  #[test]
  fn relative_paths_are_resolved() {
    let url = parse_image_location("sample.jpg").unwrap();
    let path = path_from_url(&url, "image").unwrap();
    assert!(path.is_absolute());
    assert!(path.ends_with("sample.jpg"));
  }

  #[test]
  fn explicit_urls_are_kept() {
    let url = parse_image_location("image:///tmp/a.png").unwrap();
    assert_eq!(url.as_str(), "image:///tmp/a.png");
  }

  #[test]
  fn model_args_have_defaults() {
    let args = TestArgs::parse_from(["test", "--model", "/tmp/best.onnx"]);
    assert_eq!(args.model.confidence, 0.25);
    assert_eq!(args.model.iou_threshold, 0.45);
    assert_eq!(args.model.provider, ExecutionProvider::Cpu);
    assert!(args.model.font.is_none());
    assert!(args.model.loader().is_ok());
    assert!(args.model.draw().is_ok());
  }
}
