// 该文件是 Qingdian （清点） 项目的一部分。
// src/output/draw.rs - 检测结果可视化与文本记录
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  frame::RgbaFrame, geometry::BBox, model::Detection, preprocess::Letterbox,
  session::AnalysisResponse,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_TEXT_HEIGHT: i32 = 22;
const LABEL_CHAR_WIDTH: f32 = 10.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const PALETTE_SIZE: usize = 20;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在原图上绘制检测框
///
/// 检测框先经 [`Letterbox::to_source`] 映射回原图坐标。
/// 只有提供了字体时才绘制标签与计数摘要。
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(None)
  }
}

impl Draw {
  pub fn new(font: Option<FontArc>) -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }

  pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载字体: {}", path.display());
    Ok(font)
  }

  /// 读取 URL 中的 `font=/path/to/font.ttf` 参数
  pub fn from_url_query(url: &Url) -> Result<Self, DrawError> {
    let font = url
      .query_pairs()
      .find(|(k, _)| k == "font")
      .map(|(_, v)| Self::load_font(v.as_ref()))
      .transpose()?;
    Ok(Self::new(font))
  }

  pub fn color_of(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }

  pub fn draw_response(&self, frame: &RgbaFrame, response: &AnalysisResponse) -> RgbImage {
    let mut image = frame.to_rgb_image();
    for detection in &response.detections {
      self.draw_detection(&mut image, &response.letterbox, detection);
    }
    if let Some(font) = &self.font
      && !response.summary.is_empty()
    {
      let text = format!(
        "{} | {}",
        response.summary.total_count,
        response.summary.breakdown()
      );
      draw_text_mut(
        &mut image,
        Rgb([255, 255, 255]),
        LABEL_TEXT_VERTICAL_PADDING,
        LABEL_TEXT_VERTICAL_PADDING,
        self.font_scale,
        font,
        &text,
      );
    }
    debug!("绘制 {} 个检测框", response.detections.len());
    image
  }

  fn draw_detection(&self, image: &mut RgbImage, letterbox: &Letterbox, detection: &Detection) {
    let Some((x, y, width, height)) = pixel_rect(image, &letterbox.to_source(&detection.bbox()))
    else {
      return;
    };
    let color = self.color_of(detection.class_id);

    draw_hollow_rect_mut(image, Rect::at(x, y).of_size(width, height), color);
    // 第二道边框增加可见度
    if width > 2 && height > 2 {
      let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
      draw_hollow_rect_mut(image, inner, color);
    }

    let Some(font) = &self.font else {
      return;
    };
    let label = format!("{} {:.2}", detection.class_name, detection.confidence);
    let text_width = (label.chars().count() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_y = (y - LABEL_TEXT_HEIGHT).max(0);
    let label_width = text_width.min(image.width() as i32 - x).max(0) as u32;
    if label_width == 0 {
      return;
    }

    let background = Rect::at(x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(image, background, color);
    draw_text_mut(
      image,
      Rgb([255, 255, 255]),
      x,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      self.font_scale,
      font,
      &label,
    );
  }
}

/// 框在图像内的整数像素矩形 (x, y, w, h)，完全落在图外时为 None
fn pixel_rect(image: &RgbImage, bbox: &BBox) -> Option<(i32, i32, u32, u32)> {
  let (w, h) = (image.width() as i32, image.height() as i32);
  if w == 0 || h == 0 {
    return None;
  }

  let x_min = (bbox.x.floor() as i32).clamp(0, w - 1);
  let y_min = (bbox.y.floor() as i32).clamp(0, h - 1);
  let x_max = (bbox.right().ceil() as i32).clamp(0, w - 1);
  let y_max = (bbox.bottom().ceil() as i32).clamp(0, h - 1);

  if x_min >= x_max || y_min >= y_max {
    return None;
  }
  Some((
    x_min,
    y_min,
    (x_max - x_min + 1) as u32,
    (y_max - y_min + 1) as u32,
  ))
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// 以文本形式记录检测结果，每行一个对象：`名称或编号, 置信度, x, y, w, h`
///
/// 坐标为原图像素坐标。
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn lines(&self, response: &AnalysisResponse) -> Vec<String> {
    response
      .detections
      .iter()
      .map(|det| {
        let name = if self.label_with_name {
          det.class_name.clone()
        } else {
          det.class_id.to_string()
        };
        let bbox = response.letterbox.to_source(&det.bbox());
        format!(
          "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
          name, det.confidence, bbox.x, bbox.y, bbox.width, bbox.height
        )
      })
      .collect()
  }

  pub fn record(&self, response: &AnalysisResponse, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.lines(response).join("\n"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{aggregate::aggregate, session::Timing};

  fn response(detections: Vec<Detection>, letterbox: Letterbox) -> AnalysisResponse {
    AnalysisResponse {
      summary: aggregate(&detections),
      detections,
      letterbox,
      timing: Timing::default(),
    }
  }

  fn det(x: f32, y: f32, w: f32, h: f32, class_id: usize, name: &str) -> Detection {
    Detection {
      x,
      y,
      width: w,
      height: h,
      confidence: 0.8,
      class_id,
      class_name: name.to_string(),
    }
  }

  #[test]
  fn palette_wraps_around() {
    let draw = Draw::default();
    assert_eq!(draw.color_of(0), draw.color_of(PALETTE_SIZE));
    assert_ne!(draw.color_of(0), draw.color_of(1));
  }

  #[test]
  fn boxes_are_drawn_in_source_coordinates() {
    // 200x100 的图放进 100x100 画布：缩放 0.5，纵向偏移 25
    let frame = RgbaFrame::filled(200, 100, [0, 0, 0, 255]);
    let letterbox = Letterbox::new(200, 100, 100).unwrap();
    let resp = response(vec![det(10.0, 35.0, 20.0, 10.0, 0, "pen")], letterbox);

    let draw = Draw::default();
    let image = draw.draw_response(&frame, &resp);
    let color = draw.color_of(0);
    // 原图中的框: x=20, y=20, w=40, h=20
    assert_eq!(*image.get_pixel(20, 20), color);
    assert_eq!(*image.get_pixel(40, 20), color);
    assert_eq!(*image.get_pixel(30, 30), Rgb([0, 0, 0]));
  }

  #[test]
  fn boxes_outside_the_image_are_skipped() {
    let frame = RgbaFrame::filled(10, 10, [0, 0, 0, 255]);
    let letterbox = Letterbox::new(10, 10, 10).unwrap();
    let resp = response(vec![det(50.0, 50.0, 5.0, 5.0, 1, "pen")], letterbox);
    let image = Draw::default().draw_response(&frame, &resp);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn record_lines_use_names_or_ids() {
    let letterbox = Letterbox::new(100, 100, 100).unwrap();
    let resp = response(vec![det(1.0, 2.0, 3.0, 4.0, 2, "ruler")], letterbox);
    let by_name = Record {
      label_with_name: true,
    };
    let by_id = Record {
      label_with_name: false,
    };
    assert_eq!(
      by_name.lines(&resp),
      vec!["ruler, 0.8000, 1.00, 2.00, 3.00, 4.00"]
    );
    assert!(by_id.lines(&resp)[0].starts_with("2, "));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let url = Url::parse("image:///tmp/out.png?font=/no/such/font.ttf").unwrap();
    assert!(matches!(
      Draw::from_url_query(&url),
      Err(DrawError::IoError(_))
    ));
    let url = Url::parse("image:///tmp/out.png").unwrap();
    assert!(Draw::from_url_query(&url).is_ok());
  }
}
