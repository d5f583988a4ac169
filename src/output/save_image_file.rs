// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::WithLabel,
  output::{Annotated, Render, RenderError},
  path_from_url,
};

/// 把检测结果图像写入文件，视频流模式下每帧覆盖同一个文件
pub struct SaveImageFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = RenderError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    let path = path_from_url(uri, Self::SCHEME)?;
    Ok(Self::new(path))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &PathBuf {
    &self.path
  }
}

impl<T: WithLabel> Render<Frame, Annotated<T>> for SaveImageFileOutput {
  type Error = RenderError;

  fn render_result(&self, frame: &Frame, result: &Annotated<T>) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    result.image.save(&self.path)?;
    info!(
      "保存第 {} 帧检测结果到文件: {}",
      frame.index,
      self.path.display()
    );

    Ok(())
  }
}
