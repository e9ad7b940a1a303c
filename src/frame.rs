// 该文件是 Qingdian （清点） 项目的一部分。
// src/frame.rs - RGBA 帧与 NCHW 张量定义
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

use image::{ImageBuffer, Rgb, RgbImage, RgbaImage};

use crate::error::AnalysisError;

pub const RGBA_CHANNELS: usize = 4;
pub const RGB_CHANNELS: usize = 3;

/// 采集到的一帧图像，行优先的 RGBA（或 RGB + 填充字节）
///
/// 创建后不可变，预处理只读取其内容。
#[derive(Debug, Clone)]
pub struct RgbaFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbaFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, AnalysisError> {
    let expected = RGBA_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(AnalysisError::invalid_image(format!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      )));
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 以单一颜色填充的帧，主要用于测试与基准
  pub fn filled(width: u32, height: u32, pixel: [u8; 4]) -> Self {
    let data = pixel.repeat(width as usize * height as usize);
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGBA_CHANNELS
  }

  pub fn as_rgba(&self) -> &[u8] {
    &self.data
  }

  /// 丢弃 alpha 通道，转换为 RGB 图像
  pub fn to_rgb_image(&self) -> RgbImage {
    ImageBuffer::from_fn(self.width, self.height, |x, y| {
      let idx = (y as usize * self.width as usize + x as usize) * RGBA_CHANNELS;
      Rgb([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    })
  }
}

impl From<RgbaImage> for RgbaFrame {
  fn from(image: RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<RgbImage> for RgbaFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity(width as usize * height as usize * RGBA_CHANNELS);
    for pixel in image.pixels() {
      data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], u8::MAX]);
    }
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }
}

/// 模型输入张量，形状 `[1, 3, S, S]`，平面（通道优先）布局，取值归一化到 [0, 1]
#[derive(Debug, Clone)]
pub struct NchwTensor {
  side: u32,
  data: Box<[f32]>,
}

impl NchwTensor {
  pub(crate) fn from_planar(side: u32, data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), RGB_CHANNELS * side as usize * side as usize);
    Self {
      side,
      data: data.into_boxed_slice(),
    }
  }

  pub fn side(&self) -> u32 {
    self.side
  }

  pub fn shape(&self) -> [usize; 4] {
    let side = self.side as usize;
    [1, RGB_CHANNELS, side, side]
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  /// 读取通道 `c` 在 (x, y) 处的值
  pub fn get(&self, c: usize, y: u32, x: u32) -> Option<f32> {
    let side = self.side as usize;
    if c >= RGB_CHANNELS || x >= self.side || y >= self.side {
      return None;
    }
    self
      .data
      .get(c * side * side + y as usize * side + x as usize)
      .copied()
  }

  pub fn into_vec(self) -> Vec<f32> {
    self.data.into_vec()
  }
}
