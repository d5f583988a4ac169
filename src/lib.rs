// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/lib.rs - 库主文件
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

use thiserror::Error;

pub mod config;
pub mod context;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
#[cfg(feature = "web_ui")]
pub mod server;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

#[derive(Error, Debug)]
pub enum UrlError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch {
    expected: &'static str,
    found: String,
  },
  #[error("URI 路径无效: {0}")]
  InvalidPath(String),
}

/// 检查 URL 方案并取出解码后的文件路径
pub fn path_from_url(url: &url::Url, scheme: &'static str) -> Result<PathBuf, UrlError> {
  if url.scheme() != scheme {
    return Err(UrlError::SchemeMismatch {
      expected: scheme,
      found: url.scheme().to_string(),
    });
  }

  let path = urlencoding::decode(url.path())
    .map_err(|e| UrlError::InvalidPath(format!("{}: {}", url.path(), e)))?;
  if path.is_empty() {
    return Err(UrlError::InvalidPath(url.to_string()));
  }
  Ok(PathBuf::from(path.into_owned()))
}
