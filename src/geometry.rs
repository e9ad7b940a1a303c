// 该文件是 Qingdian （清点） 项目的一部分。
// src/geometry.rs - 边界框几何运算
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

/// 轴对齐边界框，(x, y) 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由中心点和宽高构造
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  /// 面积；宽或高为负时按零面积处理
  pub fn area(&self) -> f32 {
    // 与求交使用同样的边界运算，保证 iou(a, a) 恰好为 1
    let w = (self.right() - self.x).max(0.0);
    let h = (self.bottom() - self.y).max(0.0);
    w * h
  }
}

/// 计算两个框的交并比，结果在 [0, 1] 内
pub fn intersection_over_union(a: &BBox, b: &BBox) -> f32 {
  let x1 = a.x.max(b.x);
  let y1 = a.y.max(b.y);
  let x2 = a.right().min(b.right());
  let y2 = a.bottom().min(b.bottom());

  // 不相交或仅接触；NaN 坐标同样落入此分支
  if !(x2 > x1 && y2 > y1) {
    return 0.0;
  }

  let intersection = (x2 - x1) * (y2 - y1);
  let union = a.area() + b.area() - intersection;
  if union <= 0.0 {
    return 0.0;
  }

  (intersection / union).clamp(0.0, 1.0)
}
