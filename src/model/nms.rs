// 该文件是 Qingdian （清点） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::{geometry::intersection_over_union, model::Detection};

/// 按类别进行贪心 NMS
///
/// 先按置信度降序稳定排序（同分保持原顺序），依次保留未被抑制的检测，
/// 并抑制其后同类别且 IoU 大于阈值的检测。不同类别之间互不抑制。
/// 输出保持置信度降序。
pub fn suppress(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  if detections.is_empty() {
    return detections;
  }

  let candidates = detections.len();
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let boxes: Vec<_> = detections.iter().map(Detection::bbox).collect();
  let mut suppressed = vec![false; detections.len()];

  for i in 0..detections.len() {
    if suppressed[i] {
      continue;
    }
    for j in (i + 1)..detections.len() {
      if suppressed[j] || detections[j].class_id != detections[i].class_id {
        continue;
      }
      if intersection_over_union(&boxes[i], &boxes[j]) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  let kept: Vec<Detection> = detections
    .into_iter()
    .zip(suppressed)
    .filter_map(|(det, gone)| (!gone).then_some(det))
    .collect();

  debug!("NMS: {} 个候选保留 {} 个", candidates, kept.len());
  kept
}
