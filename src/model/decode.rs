// 该文件是 Qingdian （清点） 项目的一部分。
// src/model/decode.rs - 输出张量解码
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

use std::collections::BTreeSet;

use tracing::{debug, error};

use crate::{error::AnalysisError, geometry::BBox, model::Detection};

/// 框回归占用的行数：cx, cy, w, h
pub const BOX_ROWS: usize = 4;

/// 把 `[4 + C, A]` 的通道优先输出解码为候选检测
///
/// 按锚点优先、类别其次的顺序输出；只保留置信度严格大于阈值且类别被选中的 (锚点, 类别) 对。
pub fn decode(
  output: &[f32],
  num_anchors: usize,
  class_names: &[String],
  confidence_threshold: f32,
  selected_classes: &BTreeSet<String>,
) -> Result<Vec<Detection>, AnalysisError> {
  let expected = num_anchors * (BOX_ROWS + class_names.len());
  if output.len() != expected {
    error!(
      "输出张量长度不匹配: 期望 {} ({} 锚点 x {} 通道), 实际 {}",
      expected,
      num_anchors,
      BOX_ROWS + class_names.len(),
      output.len()
    );
    return Err(AnalysisError::MalformedOutput {
      expected,
      actual: output.len(),
    });
  }

  // 先解析出被选中的类别行，避免在锚点循环中反复查集合
  let active: Vec<(usize, &String)> = class_names
    .iter()
    .enumerate()
    .filter(|(_, name)| selected_classes.contains(*name))
    .collect();

  let mut detections = Vec::new();
  for i in 0..num_anchors {
    let cx = output[i];
    let cy = output[num_anchors + i];
    let w = output[2 * num_anchors + i];
    let h = output[3 * num_anchors + i];

    for &(class_id, class_name) in &active {
      let confidence = output[(BOX_ROWS + class_id) * num_anchors + i];
      if confidence > confidence_threshold {
        let bbox = BBox::from_center(cx, cy, w, h);
        detections.push(Detection {
          x: bbox.x,
          y: bbox.y,
          width: w,
          height: h,
          confidence,
          class_id,
          class_name: class_name.clone(),
        });
      }
    }
  }

  debug!(
    "解码得到 {} 个候选 (阈值 {}, 选中 {} 类)",
    detections.len(),
    confidence_threshold,
    active.len()
  );

  Ok(detections)
}
