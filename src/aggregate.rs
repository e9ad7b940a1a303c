// 该文件是 Qingdian （清点） 项目的一部分。
// src/aggregate.rs - 按类别统计检测结果
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

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Detection;

/// 单个类别的数量与置信度统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStats {
  pub count: usize,
  pub min_confidence: f32,
  pub max_confidence: f32,
  pub mean_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Summary {
  pub total_count: usize,
  pub per_class: BTreeMap<String, ClassStats>,
}

/// 对最终检测集合做纯归约，不再做任何过滤
pub fn aggregate(detections: &[Detection]) -> Summary {
  // (count, min, max, sum)
  let mut acc: BTreeMap<&str, (usize, f32, f32, f64)> = BTreeMap::new();

  for det in detections {
    let entry = acc
      .entry(det.class_name.as_str())
      .or_insert((0, f32::INFINITY, f32::NEG_INFINITY, 0.0));
    entry.0 += 1;
    entry.1 = entry.1.min(det.confidence);
    entry.2 = entry.2.max(det.confidence);
    entry.3 += det.confidence as f64;
  }

  let per_class = acc
    .into_iter()
    .map(|(name, (count, min, max, sum))| {
      let stats = ClassStats {
        count,
        min_confidence: min,
        max_confidence: max,
        mean_confidence: (sum / count as f64) as f32,
      };
      (name.to_string(), stats)
    })
    .collect();

  Summary {
    total_count: detections.len(),
    per_class,
  }
}

impl Summary {
  pub fn is_empty(&self) -> bool {
    self.total_count == 0
  }

  pub fn count_of(&self, class_name: &str) -> usize {
    self.per_class.get(class_name).map_or(0, |s| s.count)
  }

  /// `eraser: 2 | pen: 1` 形式的简短描述
  pub fn breakdown(&self) -> String {
    self
      .per_class
      .iter()
      .map(|(name, stats)| format!("{}: {}", name, stats.count))
      .collect::<Vec<_>>()
      .join(" | ")
  }
}
