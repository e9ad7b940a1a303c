// 该文件是 Qingdian （清点） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复分析基准
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use qingdian::{
  FromUrl,
  config::ModelConfig,
  input::ImageFileInput,
  model::ReplayModelBuilder,
  output::OutputWrapper,
  session::Session,
  task::{RepeatShotTask, Task, Thresholds},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型描述配置文件 (TOML)
  #[arg(long, value_name = "CONFIG")]
  pub config: PathBuf,
  /// 推理引擎输出
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，只写入最后一次的结果
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,
  /// 重复次数
  #[arg(long, default_value_t = RepeatShotTask::DEFAULT_REPEAT, value_name = "COUNT")]
  pub repeat: usize,
  /// 置信度阈值，按请求覆盖配置
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值，按请求覆盖配置
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("配置文件: {}", args.config.display());
  info!("模型输出: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let config = ModelConfig::load(&args.config)
    .with_context(|| format!("无法加载模型配置: {}", args.config.display()))?;
  let [_, channels, anchors] = config.output_dims();
  let input_side = config.input_side;
  let session = Session::new(config)?;

  let input = ImageFileInput::from_url(&args.input)
    .with_context(|| format!("无法读取输入: {}", args.input))?;
  let model = ReplayModelBuilder::from_url(&args.model)?
    .dims(channels, anchors)
    .input_side(input_side)
    .build()
    .with_context(|| format!("无法加载推理输出: {}", args.model))?;
  let output = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  RepeatShotTask::new(&session)
    .with_repeat(args.repeat)
    .with_thresholds(Thresholds {
      confidence: args.confidence,
      iou: args.iou,
    })
    .run_task(input, model, output)?;

  Ok(())
}
