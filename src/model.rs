// 该文件是 Qingdian （清点） 项目的一部分。
// src/model.rs - 模型接口与检测结果
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

use serde::Serialize;

use crate::{frame::NchwTensor, geometry::BBox};

/// 推理引擎接口：输入 `[1, 3, S, S]`，输出 `[1, 4 + C, A]`
///
/// 引擎本身（模型加载、执行后端）不属于本库，实现方只需满足这一约定。
/// 输入张量绑定到 `binding.input`，结果从 `binding.output` 读取。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(
    &self,
    binding: &TensorBinding,
    input: &NchwTensor,
  ) -> Result<OutputTensor, Self::Error>;
}

/// 引擎侧的张量名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorBinding {
  pub input: String,
  pub output: String,
}

impl TensorBinding {
  pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
    Self {
      input: input.into(),
      output: output.into(),
    }
  }
}

/// 模型原始输出，通道优先：第 0–3 行为 cx, cy, w, h，其后每行是一个类别的置信度
#[derive(Debug, Clone)]
pub struct OutputTensor {
  dims: [usize; 3],
  data: Box<[f32]>,
}

impl OutputTensor {
  pub fn new(dims: [usize; 3], data: Vec<f32>) -> Self {
    Self {
      dims,
      data: data.into_boxed_slice(),
    }
  }

  pub fn dims(&self) -> [usize; 3] {
    self.dims
  }

  pub fn channels(&self) -> usize {
    self.dims[1]
  }

  pub fn anchors(&self) -> usize {
    self.dims[2]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

/// 候选检测，坐标位于模型输入像素空间，(x, y) 为左上角
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
  pub confidence: f32,
  pub class_id: usize,
  pub class_name: String,
}

impl Detection {
  pub fn bbox(&self) -> BBox {
    BBox::new(self.x, self.y, self.width, self.height)
  }
}

mod decode;
mod nms;
mod replay;

pub use self::decode::{BOX_ROWS, decode};
pub use self::nms::suppress;
pub use self::replay::{ReplayModel, ReplayModelBuilder, ReplayModelError, write_raw_tensor};
