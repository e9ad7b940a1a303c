// 该文件是 Qingdian （清点） 项目的一部分。
// src/output/json_report.rs - JSON 计数报告
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::PathBuf,
};

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  aggregate::Summary,
  frame::RgbaFrame,
  geometry::BBox,
  output::Render,
  preprocess::Letterbox,
  session::{AnalysisResponse, Timing},
  url_path,
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerdeError(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct ReportDetection<'a> {
  pub class_id: usize,
  pub class_name: &'a str,
  pub confidence: f32,
  /// 原图像素坐标
  pub bbox: BBox,
}

/// 写入文件的报告内容
#[derive(Debug, Serialize)]
pub struct Report<'a> {
  pub width: u32,
  pub height: u32,
  pub total_count: usize,
  pub summary: &'a Summary,
  pub detections: Vec<ReportDetection<'a>>,
  pub letterbox: Letterbox,
  pub timing: Timing,
}

impl<'a> Report<'a> {
  pub fn new(frame: &RgbaFrame, response: &'a AnalysisResponse) -> Self {
    let detections = response
      .detections
      .iter()
      .map(|det| ReportDetection {
        class_id: det.class_id,
        class_name: &det.class_name,
        confidence: det.confidence,
        bbox: response.letterbox.to_source(&det.bbox()),
      })
      .collect();

    Self {
      width: frame.width(),
      height: frame.height(),
      total_count: response.summary.total_count,
      summary: &response.summary,
      detections,
      letterbox: response.letterbox,
      timing: response.timing,
    }
  }
}

/// `json:///path/to/report.json[?pretty]`
pub struct JsonReportOutput {
  path: PathBuf,
  pretty: bool,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch);
    }

    Ok(Self {
      path: url_path(uri),
      pretty: uri.query_pairs().any(|(k, _)| k == "pretty"),
    })
  }
}

impl Render<RgbaFrame, AnalysisResponse> for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(
    &self,
    frame: &RgbaFrame,
    result: &AnalysisResponse,
  ) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let report = Report::new(frame, result);
    let mut writer = BufWriter::new(File::create(&self.path)?);
    if self.pretty {
      serde_json::to_writer_pretty(&mut writer, &report)?;
    } else {
      serde_json::to_writer(&mut writer, &report)?;
    }
    writeln!(writer)?;
    writer.flush()?;

    info!("保存报告到文件: {}", self.path.display());
    Ok(())
  }
}
