// 该文件是 Qingdian （清点） 项目的一部分。
// tests/session.rs - 会话并发与选择快照测试
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

use std::sync::mpsc;

use qingdian::{
  AnalysisError,
  config::ModelConfig,
  frame::{NchwTensor, RgbaFrame},
  model::{Model, OutputTensor, ReplayModel, ReplayModelError, TensorBinding},
  session::{AnalysisRequest, Session},
};

const SIDE: u32 = 32;
const ANCHORS: usize = 4;

fn config() -> ModelConfig {
  let mut config = ModelConfig::new("pair", vec!["pen".to_string(), "ruler".to_string()]);
  config.input_side = SIDE;
  config.num_anchors = ANCHORS;
  config
}

/// 锚点 0 为 pen (0.9)，锚点 1 为 ruler (0.8)，互不重叠
fn replay() -> ReplayModel {
  let mut data = vec![0.0f32; (4 + 2) * ANCHORS];
  let rows = |row: usize, anchor: usize| row * ANCHORS + anchor;
  for (anchor, cx) in [(0usize, 8.0f32), (1, 24.0)] {
    data[rows(0, anchor)] = cx;
    data[rows(1, anchor)] = 16.0;
    data[rows(2, anchor)] = 6.0;
    data[rows(3, anchor)] = 6.0;
  }
  data[rows(4, 0)] = 0.9;
  data[rows(5, 1)] = 0.8;
  ReplayModel::new(OutputTensor::new([1, 6, ANCHORS], data), Some(SIDE))
}

/// 推理开始时通知测试，并阻塞到测试放行
struct BlockingModel {
  inner: ReplayModel,
  entered: mpsc::Sender<()>,
  release: mpsc::Receiver<()>,
}

impl Model for BlockingModel {
  type Error = ReplayModelError;

  fn infer(
    &self,
    binding: &TensorBinding,
    input: &NchwTensor,
  ) -> Result<OutputTensor, Self::Error> {
    let _ = self.entered.send(());
    let _ = self.release.recv();
    self.inner.infer(binding, input)
  }
}

/// 推理过程中修改会话的选择
struct MeddlingModel<'a> {
  inner: ReplayModel,
  session: &'a Session,
}

impl Model for MeddlingModel<'_> {
  type Error = ReplayModelError;

  fn infer(
    &self,
    binding: &TensorBinding,
    input: &NchwTensor,
  ) -> Result<OutputTensor, Self::Error> {
    self.session.deselect("ruler");
    self.inner.infer(binding, input)
  }
}

#[test]
fn second_request_is_rejected_while_one_is_in_flight() {
  let session = Session::new(config()).unwrap();
  let frame = RgbaFrame::filled(40, 20, [0, 0, 0, 255]);
  let (entered_tx, entered_rx) = mpsc::channel();
  let (release_tx, release_rx) = mpsc::channel();
  let blocking = BlockingModel {
    inner: replay(),
    entered: entered_tx,
    release: release_rx,
  };

  std::thread::scope(|s| {
    let (session_ref, frame_ref) = (&session, &frame);
    let first = s.spawn(move || session_ref.analyze(&blocking, AnalysisRequest::new(frame_ref)));

    entered_rx.recv().unwrap();
    assert!(session.is_busy());
    let second = session.analyze(&replay(), AnalysisRequest::new(&frame));
    assert!(matches!(second, Err(AnalysisError::Busy)));

    release_tx.send(()).unwrap();
    let first = first.join().unwrap().unwrap();
    assert_eq!(first.summary.total_count, 2);
  });

  assert!(!session.is_busy());
  let again = session
    .analyze(&replay(), AnalysisRequest::new(&frame))
    .unwrap();
  assert_eq!(again.summary.total_count, 2);
}

#[test]
fn independent_sessions_run_in_parallel() {
  let a = Session::new(config()).unwrap();
  let b = Session::new(config()).unwrap();
  let frame = RgbaFrame::filled(32, 32, [0, 0, 0, 255]);
  let (entered_tx, entered_rx) = mpsc::channel();
  let (release_tx, release_rx) = mpsc::channel();
  let blocking = BlockingModel {
    inner: replay(),
    entered: entered_tx,
    release: release_rx,
  };

  std::thread::scope(|s| {
    let (a_ref, frame_ref) = (&a, &frame);
    let first = s.spawn(move || a_ref.analyze(&blocking, AnalysisRequest::new(frame_ref)));
    entered_rx.recv().unwrap();

    let other = b.analyze(&replay(), AnalysisRequest::new(&frame)).unwrap();
    assert_eq!(other.summary.total_count, 2);

    release_tx.send(()).unwrap();
    assert!(first.join().unwrap().is_ok());
  });
}

#[test]
fn selection_change_during_analysis_applies_to_the_next_one() {
  let session = Session::new(config()).unwrap();
  let frame = RgbaFrame::filled(32, 32, [0, 0, 0, 255]);
  let meddling = MeddlingModel {
    inner: replay(),
    session: &session,
  };

  let during = session
    .analyze(&meddling, AnalysisRequest::new(&frame))
    .unwrap();
  assert_eq!(during.summary.count_of("ruler"), 1);
  assert_eq!(during.summary.count_of("pen"), 1);

  let after = session
    .analyze(&replay(), AnalysisRequest::new(&frame))
    .unwrap();
  assert_eq!(after.summary.count_of("ruler"), 0);
  assert_eq!(after.summary.breakdown(), "pen: 1");
}
