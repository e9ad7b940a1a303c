// 该文件是 Qingdian （清点） 项目的一部分。
// src/config.rs - 模型描述配置
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

use std::{collections::BTreeSet, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  model::{BOX_ROWS, TensorBinding},
  preprocess::ResampleFilter,
};

pub const DEFAULT_INPUT_SIDE: u32 = 640;
pub const DEFAULT_NUM_ANCHORS: usize = 8400;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 部署时确定的模型描述，启动时加载一次
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
  pub name: String,
  /// 模型位置，由外部推理引擎解释
  #[serde(default)]
  pub model: Option<String>,
  #[serde(default = "default_input_side")]
  pub input_side: u32,
  #[serde(default = "default_num_anchors")]
  pub num_anchors: usize,
  pub classes: Vec<String>,
  #[serde(default = "default_confidence_threshold")]
  pub confidence_threshold: f32,
  #[serde(default = "default_iou_threshold")]
  pub iou_threshold: f32,
  #[serde(default)]
  pub max_dimension: Option<u32>,
  #[serde(default)]
  pub resample: ResampleFilter,
  /// 引擎输入张量名
  #[serde(default = "default_input_name")]
  pub input_name: String,
  /// 引擎输出张量名
  #[serde(default = "default_output_name")]
  pub output_name: String,
  /// 初始选中的类别，缺省为全部类别
  #[serde(default)]
  pub default_selection: Option<Vec<String>>,
}

fn default_input_side() -> u32 {
  DEFAULT_INPUT_SIDE
}

fn default_num_anchors() -> usize {
  DEFAULT_NUM_ANCHORS
}

fn default_confidence_threshold() -> f32 {
  DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_iou_threshold() -> f32 {
  DEFAULT_IOU_THRESHOLD
}

fn default_input_name() -> String {
  "images".to_string()
}

fn default_output_name() -> String {
  "output0".to_string()
}

impl ModelConfig {
  /// 使用默认参数构造，主要用于测试
  pub fn new(name: impl Into<String>, classes: Vec<String>) -> Self {
    Self {
      name: name.into(),
      model: None,
      input_side: DEFAULT_INPUT_SIDE,
      num_anchors: DEFAULT_NUM_ANCHORS,
      classes,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_dimension: None,
      resample: ResampleFilter::default(),
      input_name: default_input_name(),
      output_name: default_output_name(),
      default_selection: None,
    }
  }

  pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
    let config: ModelConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载模型配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config = Self::from_toml_str(&text)?;
    debug!(
      "模型 {}: 输入 {}x{}, {} 锚点, {} 类",
      config.name,
      config.input_side,
      config.input_side,
      config.num_anchors,
      config.classes.len()
    );
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_side == 0 {
      return Err(ConfigError::Invalid("input_side 必须为正".into()));
    }
    if self.num_anchors == 0 {
      return Err(ConfigError::Invalid("num_anchors 必须为正".into()));
    }
    if self.classes.is_empty() {
      return Err(ConfigError::Invalid("classes 不能为空".into()));
    }

    let mut seen = BTreeSet::new();
    for name in &self.classes {
      if !seen.insert(name.as_str()) {
        return Err(ConfigError::Invalid(format!("类别重复: {}", name)));
      }
    }

    check_threshold("confidence_threshold", self.confidence_threshold)?;
    check_threshold("iou_threshold", self.iou_threshold)?;

    if self.input_name.is_empty() || self.output_name.is_empty() {
      return Err(ConfigError::Invalid("张量名称不能为空".into()));
    }

    if self.max_dimension == Some(0) {
      return Err(ConfigError::Invalid("max_dimension 必须为正".into()));
    }

    if let Some(selection) = &self.default_selection {
      for name in selection {
        if !seen.contains(name.as_str()) {
          return Err(ConfigError::Invalid(format!(
            "default_selection 包含未知类别: {}",
            name
          )));
        }
      }
    }

    Ok(())
  }

  pub fn binding(&self) -> TensorBinding {
    TensorBinding::new(&self.input_name, &self.output_name)
  }

  /// 期望的输出张量形状 `[1, 4 + C, A]`
  pub fn output_dims(&self) -> [usize; 3] {
    [1, BOX_ROWS + self.classes.len(), self.num_anchors]
  }
}

fn check_threshold(key: &str, value: f32) -> Result<(), ConfigError> {
  if !(0.0..=1.0).contains(&value) {
    return Err(ConfigError::Invalid(format!(
      "{} 必须在 [0, 1] 内, 实际为 {}",
      key, value
    )));
  }
  Ok(())
}
