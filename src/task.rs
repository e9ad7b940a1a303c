// 该文件是 Qingdian （清点） 项目的一部分。
// src/task.rs - 单次与重复分析任务
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

use std::time::Duration;

use tracing::{info, warn};

use crate::{
  frame::RgbaFrame,
  model::Model,
  output::Render,
  session::{AnalysisRequest, AnalysisResponse, Session, Timing},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 命令行给出的阈值，作为每次请求的覆盖值，不改动会话配置
#[derive(Debug, Clone, Copy, Default)]
pub struct Thresholds {
  pub confidence: Option<f32>,
  pub iou: Option<f32>,
}

impl Thresholds {
  fn request<'a>(&self, frame: &'a RgbaFrame) -> AnalysisRequest<'a> {
    let mut request = AnalysisRequest::new(frame);
    request.confidence_threshold = self.confidence;
    request.iou_threshold = self.iou;
    request
  }
}

/// 取一帧，分析一次，输出一次
pub struct OneShotTask<'s> {
  session: &'s Session,
  thresholds: Thresholds,
}

impl<'s> OneShotTask<'s> {
  pub fn new(session: &'s Session) -> Self {
    Self {
      session,
      thresholds: Thresholds::default(),
    }
  }

  pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
    self.thresholds = thresholds;
    self
  }
}

impl<'s, RE, I, M, O> Task<I, M, O> for OneShotTask<'s>
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbaFrame>,
  M: Model,
  O: Render<RgbaFrame, AnalysisResponse, Error = RE>,
{
  type Output = AnalysisResponse;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功 ({}x{})，开始分析...", frame.width(), frame.height());
    let response = self
      .session
      .analyze(&model, self.thresholds.request(&frame))?;
    info!("分析完成，耗时: {:.2?}", response.timing.total);

    let now = std::time::Instant::now();
    output.render_result(&frame, &response)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(response)
  }
}

/// 对同一帧重复分析，统计平均耗时；只输出最后一次的结果
pub struct RepeatShotTask<'s> {
  session: &'s Session,
  repeat: usize,
  thresholds: Thresholds,
}

impl<'s> RepeatShotTask<'s> {
  pub const DEFAULT_REPEAT: usize = 100;

  pub fn new(session: &'s Session) -> Self {
    Self {
      session,
      repeat: Self::DEFAULT_REPEAT,
      thresholds: Thresholds::default(),
    }
  }

  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }

  pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
    self.thresholds = thresholds;
    self
  }
}

impl<'s, RE, I, M, O> Task<I, M, O> for RepeatShotTask<'s>
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbaFrame>,
  M: Model,
  O: Render<RgbaFrame, AnalysisResponse, Error = RE>,
{
  type Output = AnalysisResponse;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始 {} 次分析...", self.repeat);

    let mut timings = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let response = self
        .session
        .analyze(&model, self.thresholds.request(&frame))?;
      info!(
        "({})分析完成，耗时: {:.2?}，共 {} 个对象",
        i, response.timing.total, response.summary.total_count
      );
      timings.push(response.timing);
      last = Some(response);
    }

    let response = last.ok_or_else(|| anyhow::anyhow!("没有执行任何分析"))?;
    output.render_result(&frame, &response)?;

    // 前两次视为预热
    let warmup = 2.min(timings.len() - 1);
    let measured = &timings[warmup..];
    let average = |stage: fn(&Timing) -> Duration| {
      measured.iter().map(stage).sum::<Duration>() / measured.len() as u32
    };
    warn!(
      "平均耗时: 预处理 {:.2?}, 推理 {:.2?}, 后处理 {:.2?}, 总计 {:.2?}",
      average(|t| t.preprocess),
      average(|t| t.inference),
      average(|t| t.postprocess),
      average(|t| t.total)
    );

    Ok(response)
  }
}
