// 该文件是 Qingdian （清点） 项目的一部分。
// src/output/directory_record.rs - 按日期归档的目录记录输出
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

use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbaFrame,
  output::{
    Render,
    draw::{Draw, DrawError, Record},
  },
  session::AnalysisResponse,
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
}

/// 保存标注图，或保存原图加一份文本记录
pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    frame: &RgbaFrame,
    result: &AnalysisResponse,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        draw.draw_response(frame, result).save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.to_rgb_image().save(path)?;
        record.record(result, path)?;
      }
    };

    Ok(())
  }
}

/// `folder:///path/to/dir[?record=name|id][&always][&font=...]`
///
/// 文件按 `年/月/日/时-分-秒-序号.png` 存放。未设置 `always` 时，
/// 没有检测到任何对象的帧不会保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| Record {
        label_with_name: v != "id",
      });
    let draw = match record {
      Some(record) => DrawWrapper::Record(record),
      None => DrawWrapper::Draw(Box::new(Draw::from_url_query(uri)?)),
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: url_path(uri),
      draw,
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let mut counter = self.frame_counter.lock();
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbaFrame, AnalysisResponse> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &RgbaFrame,
    result: &AnalysisResponse,
  ) -> Result<(), Self::Error> {
    if !self.always && result.summary.is_empty() {
      debug!("未检测到对象，跳过保存");
      return Ok(());
    }
    let path = self.frame_path()?;
    self.draw.save_result(&path, frame, result)?;
    debug!("记录保存到: {}", path.display());
    Ok(())
  }
}
