// 该文件是 Qingdian （清点） 项目的一部分。
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

pub mod aggregate;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod input;
pub mod model;
pub mod output;
pub mod preprocess;
pub mod registry;
pub mod session;
pub mod task;

pub use self::error::AnalysisError;

use std::path::PathBuf;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 将 URL 的路径部分解码为本地文件路径
///
/// `image:///tmp/my%20photo.png` 解码为 `/tmp/my photo.png`。
pub fn url_path(url: &url::Url) -> PathBuf {
  match urlencoding::decode(url.path()) {
    Ok(path) => PathBuf::from(path.into_owned()),
    Err(_) => PathBuf::from(url.path()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_decodes_percent_escapes() {
    let url = url::Url::parse("image:///tmp/my%20photo.png").unwrap();
    assert_eq!(url_path(&url), PathBuf::from("/tmp/my photo.png"));
  }

  #[test]
  fn url_path_keeps_plain_paths() {
    let url = url::Url::parse("raw:///data/out.bin?anchors=8400").unwrap();
    assert_eq!(url_path(&url), PathBuf::from("/data/out.bin"));
  }
}
