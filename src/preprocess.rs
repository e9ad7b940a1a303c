// 该文件是 Qingdian （清点） 项目的一部分。
// src/preprocess.rs - 图像预处理（letterbox 缩放与平面化）
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

use image::{Rgb, RgbImage, imageops};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  error::AnalysisError,
  frame::{NchwTensor, RGB_CHANNELS, RgbaFrame},
  geometry::BBox,
};

/// 画布填充值，与模型训练时的灰色填充一致
pub const PAD_VALUE: u8 = 128;
const PAD_PIXEL: Rgb<u8> = Rgb([PAD_VALUE; 3]);

/// 重采样滤波器
///
/// `Nearest` 速度最快，但与双线性滤波相比会改变张量的数值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleFilter {
  Nearest,
  #[default]
  Triangle,
  CatmullRom,
  Lanczos3,
}

impl From<ResampleFilter> for imageops::FilterType {
  fn from(filter: ResampleFilter) -> Self {
    match filter {
      ResampleFilter::Nearest => imageops::FilterType::Nearest,
      ResampleFilter::Triangle => imageops::FilterType::Triangle,
      ResampleFilter::CatmullRom => imageops::FilterType::CatmullRom,
      ResampleFilter::Lanczos3 => imageops::FilterType::Lanczos3,
    }
  }
}

/// 保持宽高比的缩放变换：缩放后居中放入 S×S 画布
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Letterbox {
  pub source_width: u32,
  pub source_height: u32,
  pub target_side: u32,
  pub scale: f32,
  pub scaled_width: f32,
  pub scaled_height: f32,
  pub offset_x: f32,
  pub offset_y: f32,
}

impl Letterbox {
  pub fn new(width: u32, height: u32, target_side: u32) -> Result<Self, AnalysisError> {
    if width == 0 || height == 0 {
      return Err(AnalysisError::invalid_image(format!(
        "图像尺寸必须为正: {}x{}",
        width, height
      )));
    }
    if target_side == 0 {
      return Err(AnalysisError::invalid_image("模型输入边长为 0"));
    }

    let side = target_side as f32;
    let scale = (side / width as f32).min(side / height as f32);
    let scaled_width = (width as f32 * scale).min(side);
    let scaled_height = (height as f32 * scale).min(side);

    Ok(Self {
      source_width: width,
      source_height: height,
      target_side,
      scale,
      scaled_width,
      scaled_height,
      offset_x: ((side - scaled_width) / 2.0).max(0.0),
      offset_y: ((side - scaled_height) / 2.0).max(0.0),
    })
  }

  /// 缩放图像在画布上的整数像素位置 (x, y, w, h)
  ///
  /// 画布只能按整像素摆放，x, y 是 `offset_x`, `offset_y` 四舍五入的结果，
  /// 与 [`Letterbox::to_source`] 使用的浮点偏移相差不超过半个像素。
  pub fn placement(&self) -> (u32, u32, u32, u32) {
    let side = self.target_side;
    let w = (self.scaled_width.round() as u32).clamp(1, side);
    let h = (self.scaled_height.round() as u32).clamp(1, side);
    let x = (self.offset_x.round() as u32).min(side - w);
    let y = (self.offset_y.round() as u32).min(side - h);
    (x, y, w, h)
  }

  /// 模型输入坐标系中的框映射回原图坐标系
  pub fn to_source(&self, bbox: &BBox) -> BBox {
    BBox::new(
      (bbox.x - self.offset_x) / self.scale,
      (bbox.y - self.offset_y) / self.scale,
      bbox.width / self.scale,
      bbox.height / self.scale,
    )
  }

  /// 原图坐标系中的框映射到模型输入坐标系
  pub fn to_model(&self, bbox: &BBox) -> BBox {
    BBox::new(
      bbox.x * self.scale + self.offset_x,
      bbox.y * self.scale + self.offset_y,
      bbox.width * self.scale,
      bbox.height * self.scale,
    )
  }
}

/// 预处理器：把任意尺寸的帧转换为模型的固定输入张量
#[derive(Debug, Clone)]
pub struct Preprocessor {
  target_side: u32,
  max_dimension: Option<u32>,
  filter: ResampleFilter,
}

impl Preprocessor {
  pub fn new(target_side: u32) -> Self {
    Self {
      target_side,
      max_dimension: None,
      filter: ResampleFilter::default(),
    }
  }

  /// 低内存设备上限制源图最长边，超出时先整体缩小再做 letterbox
  pub fn max_dimension(mut self, max_dimension: Option<u32>) -> Self {
    self.max_dimension = max_dimension.filter(|&d| d > 0);
    self
  }

  pub fn filter(mut self, filter: ResampleFilter) -> Self {
    self.filter = filter;
    self
  }

  pub fn target_side(&self) -> u32 {
    self.target_side
  }

  /// 返回输入张量及其 letterbox 变换（相对于原始尺寸）
  pub fn run(&self, frame: &RgbaFrame) -> Result<(NchwTensor, Letterbox), AnalysisError> {
    let letterbox = Letterbox::new(frame.width(), frame.height(), self.target_side)?;
    // alpha 不参与计算
    let rgb = frame.to_rgb_image();

    let (x, y, w, h) = letterbox.placement();
    let filter = self.filter.into();
    let resized = match self.capped_size(frame.width(), frame.height()) {
      Some((cap_w, cap_h)) => {
        debug!(
          "源图 {}x{} 超过上限，先缩小到 {}x{}",
          frame.width(),
          frame.height(),
          cap_w,
          cap_h
        );
        let capped = imageops::resize(&rgb, cap_w, cap_h, filter);
        imageops::resize(&capped, w, h, filter)
      }
      None => imageops::resize(&rgb, w, h, filter),
    };

    let mut canvas = RgbImage::from_pixel(self.target_side, self.target_side, PAD_PIXEL);
    imageops::replace(&mut canvas, &resized, x as i64, y as i64);

    debug!(
      "letterbox: 缩放 {:.4}, 放置于 ({}, {}) 尺寸 {}x{}",
      letterbox.scale, x, y, w, h
    );

    Ok((planarize(&canvas, self.target_side), letterbox))
  }

  fn capped_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
    let max_dimension = self.max_dimension?;
    let longest = width.max(height);
    if longest <= max_dimension {
      return None;
    }
    let ratio = max_dimension as f32 / longest as f32;
    let w = ((width as f32 * ratio).round() as u32).max(1);
    let h = ((height as f32 * ratio).round() as u32).max(1);
    Some((w, h))
  }
}

/// 按默认滤波器把帧转换为 `[1, 3, S, S]` 张量
pub fn preprocess(frame: &RgbaFrame, target_side: u32) -> Result<NchwTensor, AnalysisError> {
  Preprocessor::new(target_side)
    .run(frame)
    .map(|(tensor, _)| tensor)
}

/// 交错 RGB 转为平面布局，并归一化到 [0, 1]
fn planarize(canvas: &RgbImage, side: u32) -> NchwTensor {
  let plane = side as usize * side as usize;
  let mut data = vec![0f32; RGB_CHANNELS * plane];

  for (i, pixel) in canvas.as_raw().chunks_exact(RGB_CHANNELS).enumerate() {
    data[i] = pixel[0] as f32 / 255.0;
    data[plane + i] = pixel[1] as f32 / 255.0;
    data[2 * plane + i] = pixel[2] as f32 / 255.0;
  }

  NchwTensor::from_planar(side, data)
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAD: f32 = PAD_VALUE as f32 / 255.0;

  #[test]
  fn letterbox_wide_image() {
    let lb = Letterbox::new(1280, 720, 640).unwrap();
    assert_eq!(lb.scale, 0.5);
    assert_eq!(lb.scaled_width, 640.0);
    assert_eq!(lb.scaled_height, 360.0);
    assert_eq!(lb.offset_x, 0.0);
    assert_eq!(lb.offset_y, 140.0);
    assert_eq!(lb.placement(), (0, 140, 640, 360));
  }

  #[test]
  fn letterbox_tall_image() {
    let lb = Letterbox::new(300, 600, 640).unwrap();
    assert!((lb.scale - 640.0 / 600.0).abs() < 1e-6);
    assert!((lb.offset_x * 2.0 + lb.scaled_width - 640.0).abs() < 1e-3);
    assert_eq!(lb.offset_y, 0.0);
  }

  #[test]
  fn placement_stays_within_half_a_pixel() {
    // 636.8 高，浮点偏移 1.6
    let lb = Letterbox::new(1000, 995, 640).unwrap();
    let (x, y, w, h) = lb.placement();
    assert_eq!((x, w), (0, 640));
    assert_eq!((y, h), (2, 637));
    assert!((y as f32 - lb.offset_y).abs() <= 0.5);

    let lb = Letterbox::new(640, 641, 640).unwrap();
    let (x, _, _, _) = lb.placement();
    assert!((x as f32 - lb.offset_x).abs() <= 0.5);
  }

  #[test]
  fn letterbox_round_trips_boxes() {
    let lb = Letterbox::new(1920, 1080, 640).unwrap();
    let source = BBox::new(100.0, 200.0, 300.0, 150.0);
    let back = lb.to_source(&lb.to_model(&source));
    assert!((back.x - source.x).abs() < 1e-2);
    assert!((back.y - source.y).abs() < 1e-2);
    assert!((back.width - source.width).abs() < 1e-2);
    assert!((back.height - source.height).abs() < 1e-2);
  }

  #[test]
  fn zero_dimensions_are_rejected() {
    let frame = RgbaFrame::new(0, 10, vec![]).unwrap();
    let err = preprocess(&frame, 64).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidImage(_)));
  }

  #[test]
  fn tensor_has_fixed_shape_and_range() {
    let frame = RgbaFrame::filled(37, 91, [250, 3, 77, 0]);
    let tensor = preprocess(&frame, 64).unwrap();
    assert_eq!(tensor.shape(), [1, 3, 64, 64]);
    assert_eq!(tensor.as_nchw().len(), 3 * 64 * 64);
    assert!(tensor.as_nchw().iter().all(|v| (0.0..=1.0).contains(v)));
  }

  #[test]
  fn padding_is_mid_gray_and_content_is_centred() {
    // 200x100 缩放到 64x32，上下各留 16 行灰边
    let frame = RgbaFrame::filled(200, 100, [255, 0, 0, 255]);
    let tensor = Preprocessor::new(64)
      .filter(ResampleFilter::Nearest)
      .run(&frame)
      .unwrap()
      .0;

    for c in 0..3 {
      assert_eq!(tensor.get(c, 0, 0), Some(PAD));
      assert_eq!(tensor.get(c, 63, 63), Some(PAD));
    }
    assert_eq!(tensor.get(0, 32, 32), Some(1.0));
    assert_eq!(tensor.get(1, 32, 32), Some(0.0));
    assert_eq!(tensor.get(2, 32, 32), Some(0.0));
    assert_eq!(tensor.get(0, 15, 10), Some(PAD));
    assert_eq!(tensor.get(0, 16, 10), Some(1.0));
    assert_eq!(tensor.get(0, 47, 10), Some(1.0));
    assert_eq!(tensor.get(0, 48, 10), Some(PAD));
  }

  #[test]
  fn alpha_is_discarded() {
    let opaque = preprocess(&RgbaFrame::filled(10, 10, [10, 20, 30, 255]), 16).unwrap();
    let clear = preprocess(&RgbaFrame::filled(10, 10, [10, 20, 30, 0]), 16).unwrap();
    assert_eq!(opaque.as_nchw(), clear.as_nchw());
  }

  #[test]
  fn preprocessing_is_deterministic() {
    let data: Vec<u8> = (0..(23 * 41 * 4)).map(|v| (v * 7 % 256) as u8).collect();
    let frame = RgbaFrame::new(23, 41, data).unwrap();
    let a = preprocess(&frame, 32).unwrap();
    let b = preprocess(&frame, 32).unwrap();
    assert_eq!(a.as_nchw(), b.as_nchw());
  }

  #[test]
  fn max_dimension_keeps_shape_and_original_letterbox() {
    let frame = RgbaFrame::filled(400, 200, [0, 255, 0, 255]);
    let (tensor, letterbox) = Preprocessor::new(64)
      .max_dimension(Some(100))
      .filter(ResampleFilter::Nearest)
      .run(&frame)
      .unwrap();
    assert_eq!(tensor.shape(), [1, 3, 64, 64]);
    assert_eq!(letterbox.source_width, 400);
    assert_eq!(letterbox.source_height, 200);
    assert_eq!(letterbox.placement(), (0, 16, 64, 32));
    assert_eq!(tensor.get(1, 32, 32), Some(1.0));
  }

  #[test]
  fn filter_names_deserialize() {
    #[derive(Deserialize)]
    struct Holder {
      resample: ResampleFilter,
    }
    let holder: Holder = toml::from_str("resample = \"catmull-rom\"").unwrap();
    assert_eq!(holder.resample, ResampleFilter::CatmullRom);
  }
}
