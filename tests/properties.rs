// 该文件是 Qingdian （清点） 项目的一部分。
// tests/properties.rs - 几何、预处理、解码与 NMS 的性质测试
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

use proptest::prelude::*;
use qingdian::{
  frame::RgbaFrame,
  geometry::{BBox, intersection_over_union},
  model::{Detection, decode, suppress},
  preprocess::{Letterbox, preprocess},
};

fn bbox() -> impl Strategy<Value = BBox> {
  (0.0f32..600.0, 0.0f32..600.0, 0.0f32..200.0, 0.0f32..200.0)
    .prop_map(|(x, y, w, h)| BBox::new(x, y, w, h))
}

fn detection() -> impl Strategy<Value = Detection> {
  (bbox(), 0.0f32..=1.0, 0usize..3).prop_map(|(b, confidence, class_id)| Detection {
    x: b.x,
    y: b.y,
    width: b.width,
    height: b.height,
    confidence,
    class_id,
    class_name: format!("class{class_id}"),
  })
}

fn class_names(n: usize) -> Vec<String> {
  (0..n).map(|i| format!("class{i}")).collect()
}

proptest! {
  #[test]
  fn iou_is_symmetric_and_bounded(a in bbox(), b in bbox()) {
    let ab = intersection_over_union(&a, &b);
    let ba = intersection_over_union(&b, &a);
    prop_assert_eq!(ab, ba);
    prop_assert!((0.0..=1.0).contains(&ab));
  }

  #[test]
  fn iou_with_itself_is_one(x in 0.0f32..600.0, y in 0.0f32..600.0, w in 1.0f32..200.0, h in 1.0f32..200.0) {
    let a = BBox::new(x, y, w, h);
    prop_assert!((intersection_over_union(&a, &a) - 1.0).abs() < 1e-5);
  }

  #[test]
  fn letterbox_fits_inside_the_canvas(w in 1u32..4000, h in 1u32..4000, side in 1u32..1024) {
    let lb = Letterbox::new(w, h, side).unwrap();
    prop_assert!(lb.offset_x >= 0.0 && lb.offset_y >= 0.0);
    prop_assert!(lb.scaled_width <= side as f32 && lb.scaled_height <= side as f32);
    prop_assert!((lb.offset_x * 2.0 + lb.scaled_width - side as f32).abs() < 1e-2);
    prop_assert!((lb.offset_y * 2.0 + lb.scaled_height - side as f32).abs() < 1e-2);
    let (px, py, pw, ph) = lb.placement();
    prop_assert!(px + pw <= side && py + ph <= side);
    prop_assert!((px as f32 - lb.offset_x).abs() <= 0.5 + 1e-3);
    prop_assert!((py as f32 - lb.offset_y).abs() <= 0.5 + 1e-3);
  }

  #[test]
  fn preprocess_output_has_fixed_length_and_range(
    w in 1u32..48,
    h in 1u32..48,
    pixel in any::<[u8; 4]>(),
  ) {
    let side = 16;
    let frame = RgbaFrame::filled(w, h, pixel);
    let tensor = preprocess(&frame, side).unwrap();
    let data = tensor.as_nchw();
    prop_assert_eq!(data.len(), 3 * side as usize * side as usize);
    prop_assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
  }

  #[test]
  fn threshold_at_one_emits_nothing(
    scores in prop::collection::vec(0.0f32..=1.0, 2 * 16),
    threshold in 1.0f32..2.0,
  ) {
    let anchors = 16;
    let mut output = vec![10.0f32; 4 * anchors];
    output.extend(scores);
    let names = class_names(2);
    let selected: BTreeSet<String> = names.iter().cloned().collect();
    let detections = decode(&output, anchors, &names, threshold, &selected).unwrap();
    prop_assert!(detections.is_empty());
  }

  #[test]
  fn decoded_candidates_respect_threshold_and_selection(
    scores in prop::collection::vec(0.0f32..=1.0, 3 * 8),
    threshold in 0.0f32..1.0,
  ) {
    let anchors = 8;
    // cx 行记录锚点编号
    let mut output: Vec<f32> = (0..anchors).map(|i| i as f32 * 10.0).collect();
    output.extend(vec![5.0f32; 3 * anchors]);
    output.extend(scores);
    let names = class_names(3);
    let selected = BTreeSet::from(["class1".to_string()]);
    let expected: Vec<(usize, f32)> = output[(4 + 1) * anchors..(4 + 2) * anchors]
      .iter()
      .copied()
      .enumerate()
      .filter(|&(_, s)| s > threshold)
      .collect();
    let detections = decode(&output, anchors, &names, threshold, &selected).unwrap();
    prop_assert!(detections.iter().all(|d| d.confidence > threshold && d.class_id == 1));
    prop_assert_eq!(detections.len(), expected.len());
    for (d, &(anchor, score)) in detections.iter().zip(&expected) {
      prop_assert_eq!(d.confidence, score);
      prop_assert!((d.x + d.width / 2.0 - anchor as f32 * 10.0).abs() < 1e-3);
    }
  }

  #[test]
  fn suppression_is_idempotent(dets in prop::collection::vec(detection(), 0..24), iou in 0.0f32..=1.0) {
    let once = suppress(dets.clone(), iou);
    let twice = suppress(once.clone(), iou);
    prop_assert_eq!(&once, &twice);
    prop_assert!(once.len() <= dets.len());
    prop_assert!(once.windows(2).all(|w| w[0].confidence >= w[1].confidence));
  }

  #[test]
  fn survivors_of_the_same_class_do_not_overlap(dets in prop::collection::vec(detection(), 0..24), iou in 0.0f32..=1.0) {
    let kept = suppress(dets, iou);
    for (i, a) in kept.iter().enumerate() {
      for b in &kept[i + 1..] {
        if a.class_id == b.class_id {
          prop_assert!(intersection_over_union(&a.bbox(), &b.bbox()) <= iou);
        }
      }
    }
  }
}
