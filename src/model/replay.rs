// 该文件是 Qingdian （清点） 项目的一部分。
// src/model/replay.rs - 回放预先导出的输出张量
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
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::NchwTensor,
  model::{Model, OutputTensor, TensorBinding},
  url_path,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("张量文件长度 {0} 不是 4 字节的整数倍")]
  TruncatedFloat(usize),
  #[error("查询参数无效: {0}")]
  InvalidQuery(String),
  #[error("未指定输出张量形状 (channels, anchors)")]
  MissingDims,
  #[error("输入张量边长不匹配: 期望 {expected}, 实际 {actual}")]
  InputMismatch { expected: u32, actual: u32 },
  #[error("输出张量名不匹配: 回放的是 {recorded}, 请求的是 {requested}")]
  OutputNameMismatch { recorded: String, requested: String },
}

/// 回放模型：从文件读取一份小端 float32 的 `[1, 4 + C, A]` 输出张量，
/// 每次推理都原样返回。用于离线分析与测试，真实推理引擎在本库之外。
///
/// URL 形如 `raw:///path/to/output.bin?channels=9&anchors=8400&side=640&output=output0`，
/// 省略的形状参数可以由 [`ReplayModelBuilder::dims`] 补充。
/// 给出 `output` 时，只回放给请求同名输出的调用；省略则不检查张量名。
/// 回放不需要输入张量名。
pub struct ReplayModel {
  output: OutputTensor,
  input_side: Option<u32>,
  output_name: Option<String>,
}

pub struct ReplayModelBuilder {
  path: PathBuf,
  channels: Option<usize>,
  anchors: Option<usize>,
  input_side: Option<u32>,
  output_name: Option<String>,
}

impl FromUrlWithScheme for ReplayModelBuilder {
  const SCHEME: &'static str = "raw";
}

impl FromUrl for ReplayModelBuilder {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = ReplayModelBuilder::new(url_path(url));

    for (k, v) in url.query_pairs() {
      let invalid = || ReplayModelError::InvalidQuery(format!("{}={}", k, v));
      match k.as_ref() {
        "channels" => builder.channels = Some(v.parse().map_err(|_| invalid())?),
        "anchors" => builder.anchors = Some(v.parse().map_err(|_| invalid())?),
        "side" => builder.input_side = Some(v.parse().map_err(|_| invalid())?),
        "output" => builder.output_name = Some(v.to_string()),
        other => warn!("忽略未知查询参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl ReplayModelBuilder {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      channels: None,
      anchors: None,
      input_side: None,
      output_name: None,
    }
  }

  /// 补充 URL 中未给出的形状参数，URL 中已有的值优先
  pub fn dims(mut self, channels: usize, anchors: usize) -> Self {
    self.channels = self.channels.or(Some(channels));
    self.anchors = self.anchors.or(Some(anchors));
    self
  }

  pub fn input_side(mut self, side: u32) -> Self {
    self.input_side = self.input_side.or(Some(side));
    self
  }

  pub fn build(self) -> Result<ReplayModel, ReplayModelError> {
    let (channels, anchors) = match (self.channels, self.anchors) {
      (Some(c), Some(a)) => (c, a),
      _ => return Err(ReplayModelError::MissingDims),
    };

    info!("加载回放张量: {}", self.path.display());
    let bytes = std::fs::read(&self.path)?;
    if bytes.len() % 4 != 0 {
      return Err(ReplayModelError::TruncatedFloat(bytes.len()));
    }

    let data: Vec<f32> = bytes
      .chunks_exact(4)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect();
    debug!(
      "回放张量: {} 个浮点数, 声明形状 [1, {}, {}]",
      data.len(),
      channels,
      anchors
    );

    let model = ReplayModel::new(
      OutputTensor::new([1, channels, anchors], data),
      self.input_side,
    );
    Ok(match self.output_name {
      Some(name) => model.with_output_name(name),
      None => model,
    })
  }
}

impl ReplayModel {
  pub fn new(output: OutputTensor, input_side: Option<u32>) -> Self {
    Self {
      output,
      input_side,
      output_name: None,
    }
  }

  /// 记录回放张量来自哪个输出
  pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
    self.output_name = Some(name.into());
    self
  }

  pub fn output(&self) -> &OutputTensor {
    &self.output
  }
}

impl Model for ReplayModel {
  type Error = ReplayModelError;

  fn infer(
    &self,
    binding: &TensorBinding,
    input: &NchwTensor,
  ) -> Result<OutputTensor, Self::Error> {
    if let Some(recorded) = &self.output_name
      && *recorded != binding.output
    {
      return Err(ReplayModelError::OutputNameMismatch {
        recorded: recorded.clone(),
        requested: binding.output.clone(),
      });
    }
    if let Some(expected) = self.input_side
      && expected != input.side()
    {
      return Err(ReplayModelError::InputMismatch {
        expected,
        actual: input.side(),
      });
    }
    Ok(self.output.clone())
  }
}

/// 把输出张量按小端 float32 写入文件，与 [`ReplayModel`] 的读取格式对应
pub fn write_raw_tensor(path: &std::path::Path, data: &[f32]) -> std::io::Result<()> {
  let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
  std::fs::write(path, bytes)
}
