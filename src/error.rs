// 该文件是 Qingdian （清点） 项目的一部分。
// src/error.rs - 分析流程错误定义
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

use thiserror::Error;

/// 单次分析过程中可能出现的错误
///
/// 所有错误都会中止整次分析，不会返回部分检测结果，也不会在内部重试。
#[derive(Error, Debug)]
pub enum AnalysisError {
  #[error("图像无效: {0}")]
  InvalidImage(String),
  #[error("输出张量长度错误: 期望 {expected}, 实际 {actual}")]
  MalformedOutput { expected: usize, actual: usize },
  #[error("推理引擎输出形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InferenceContractMismatch {
    expected: [usize; 3],
    actual: [usize; 3],
  },
  #[error("未选择任何类别")]
  EmptySelection,
  #[error("当前会话已有分析正在进行")]
  Busy,
  #[error("推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl AnalysisError {
  pub fn invalid_image(msg: impl Into<String>) -> Self {
    AnalysisError::InvalidImage(msg.into())
  }

  pub fn inference<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    AnalysisError::Inference(Box::new(err))
  }
}
