// 该文件是 Qingdian （清点） 项目的一部分。
// src/session.rs - 分析会话：选择状态、单次在途约束与流水线驱动
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
  collections::BTreeSet,
  time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::{
  aggregate::{Summary, aggregate},
  config::{ConfigError, ModelConfig},
  error::AnalysisError,
  frame::RgbaFrame,
  model::{Detection, Model, TensorBinding, decode, suppress},
  preprocess::{Letterbox, Preprocessor},
  registry::ClassRegistry,
};

/// 一次分析请求
#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
  pub frame: &'a RgbaFrame,
  /// 为空时使用会话当前的选择
  pub selected_classes: Option<BTreeSet<String>>,
  pub confidence_threshold: Option<f32>,
  pub iou_threshold: Option<f32>,
}

impl<'a> AnalysisRequest<'a> {
  pub fn new(frame: &'a RgbaFrame) -> Self {
    Self {
      frame,
      selected_classes: None,
      confidence_threshold: None,
      iou_threshold: None,
    }
  }

  pub fn with_selection<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.selected_classes = Some(names.into_iter().map(Into::into).collect());
    self
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = Some(threshold);
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = Some(threshold);
    self
  }
}

/// 各阶段耗时，仅用于观测
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Timing {
  #[serde(rename = "preprocess_ms", serialize_with = "as_millis")]
  pub preprocess: Duration,
  #[serde(rename = "inference_ms", serialize_with = "as_millis")]
  pub inference: Duration,
  #[serde(rename = "postprocess_ms", serialize_with = "as_millis")]
  pub postprocess: Duration,
  #[serde(rename = "total_ms", serialize_with = "as_millis")]
  pub total: Duration,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
  /// 抑制后的检测集合，置信度降序，坐标位于模型输入空间
  pub detections: Vec<Detection>,
  pub summary: Summary,
  /// 将检测框映射回原图所需的变换
  pub letterbox: Letterbox,
  pub timing: Timing,
}

/// 一个采集会话
///
/// 同一会话同时只允许一次分析；重复请求会立即得到 [`AnalysisError::Busy`]。
/// 不同会话之间互不影响，可以并行。
#[derive(Debug)]
pub struct Session {
  config: ModelConfig,
  registry: ClassRegistry,
  preprocessor: Preprocessor,
  binding: TensorBinding,
  in_flight: Mutex<()>,
}

impl Session {
  pub fn new(config: ModelConfig) -> Result<Self, ConfigError> {
    config.validate()?;

    let registry = ClassRegistry::new(config.classes.clone());
    if let Some(selection) = &config.default_selection {
      registry.set_selection(selection);
    }

    let preprocessor = Preprocessor::new(config.input_side)
      .max_dimension(config.max_dimension)
      .filter(config.resample);
    let binding = config.binding();

    info!(
      "会话已创建: 模型 {}, {} 个类别",
      config.name,
      config.classes.len()
    );

    Ok(Self {
      config,
      registry,
      preprocessor,
      binding,
      in_flight: Mutex::new(()),
    })
  }

  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  pub fn registry(&self) -> &ClassRegistry {
    &self.registry
  }

  pub fn select(&self, name: &str) -> bool {
    self.registry.select(name)
  }

  pub fn deselect(&self, name: &str) -> bool {
    self.registry.deselect(name)
  }

  pub fn set_selection<I, S>(&self, names: I) -> usize
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.registry.set_selection(names)
  }

  pub fn selected_classes(&self) -> BTreeSet<String> {
    self.registry.snapshot()
  }

  /// 是否有分析正在进行
  pub fn is_busy(&self) -> bool {
    self.in_flight.is_locked()
  }

  /// 预处理 → 推理 → 解码 → NMS → 统计
  ///
  /// 任何一步失败都中止整次分析，不返回部分结果。
  pub fn analyze<M>(
    &self,
    model: &M,
    request: AnalysisRequest<'_>,
  ) -> Result<AnalysisResponse, AnalysisError>
  where
    M: Model + ?Sized,
  {
    let _guard = self.in_flight.try_lock().ok_or_else(|| {
      warn!("会话已有分析正在进行，拒绝新的请求");
      AnalysisError::Busy
    })?;
    let started = Instant::now();

    let selected = self.resolve_selection(request.selected_classes);
    if selected.is_empty() {
      return Err(AnalysisError::EmptySelection);
    }
    let confidence_threshold = request
      .confidence_threshold
      .unwrap_or(self.config.confidence_threshold);
    let iou_threshold = request.iou_threshold.unwrap_or(self.config.iou_threshold);

    let now = Instant::now();
    let (tensor, letterbox) = self.preprocessor.run(request.frame)?;
    let preprocess = now.elapsed();
    debug!("预处理完成，耗时: {:.2?}", preprocess);

    let now = Instant::now();
    let output = model
      .infer(&self.binding, &tensor)
      .map_err(AnalysisError::inference)?;
    let inference = now.elapsed();
    debug!("推理完成，耗时: {:.2?}", inference);
    drop(tensor);

    let expected = self.config.output_dims();
    if output.dims() != expected {
      warn!(
        "推理引擎输出形状 {:?} 与配置 {:?} 不符",
        output.dims(),
        expected
      );
      return Err(AnalysisError::InferenceContractMismatch {
        expected,
        actual: output.dims(),
      });
    }

    let now = Instant::now();
    let candidates = decode(
      output.as_slice(),
      self.config.num_anchors,
      self.registry.names(),
      confidence_threshold,
      &selected,
    )?;
    let detections = suppress(candidates, iou_threshold);
    let summary = aggregate(&detections);
    let postprocess = now.elapsed();

    let timing = Timing {
      preprocess,
      inference,
      postprocess,
      total: started.elapsed(),
    };
    info!(
      "分析完成: {} 个对象 ({}), 总耗时 {:.2?}",
      summary.total_count,
      summary.breakdown(),
      timing.total
    );

    Ok(AnalysisResponse {
      detections,
      summary,
      letterbox,
      timing,
    })
  }

  /// 请求中的选择优先；未知类别被丢弃
  fn resolve_selection(&self, requested: Option<BTreeSet<String>>) -> BTreeSet<String> {
    match requested {
      Some(requested) => requested
        .into_iter()
        .filter(|name| {
          let known = self.registry.contains(name);
          if !known {
            warn!("请求包含未知类别: {}", name);
          }
          known
        })
        .collect(),
      None => self.registry.snapshot(),
    }
  }
}
