// 该文件是 Qingdian （清点） 项目的一部分。
// src/main.rs - 单次计数命令行
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
use tracing_subscriber::EnvFilter;
use url::Url;

use qingdian::{
  FromUrl,
  config::ModelConfig,
  input::ImageFileInput,
  model::ReplayModelBuilder,
  output::OutputWrapper,
  session::Session,
  task::{OneShotTask, Task, Thresholds},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型描述配置文件 (TOML)
  #[arg(long, value_name = "CONFIG")]
  pub config: PathBuf,
  /// 推理引擎输出，例如 raw:///path/to/output0.bin
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，可重复指定
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,
  /// 只统计这些类别（逗号分隔），缺省使用配置中的选择
  #[arg(long, value_name = "CLASSES", value_delimiter = ',')]
  pub classes: Option<Vec<String>>,
  /// 置信度阈值，按请求覆盖配置
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值，按请求覆盖配置
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
  /// 标注字体 (TTF)，用于 image:// 与 folder:// 输出
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

/// 为图像类输出补上 `font` 参数，URL 中已指定的优先
fn with_font(mut url: Url, font: Option<&PathBuf>) -> Url {
  let Some(font) = font else {
    return url;
  };
  let wants_font = matches!(url.scheme(), "image" | "folder")
    && !url.query_pairs().any(|(k, _)| k == "font" || k == "record");
  if wants_font {
    url
      .query_pairs_mut()
      .append_pair("font", &font.to_string_lossy());
  }
  url
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("配置文件: {}", args.config.display());
  info!("模型输出: {}", args.model);
  info!("输入来源: {}", args.input);

  let config = ModelConfig::load(&args.config)
    .with_context(|| format!("无法加载模型配置: {}", args.config.display()))?;
  let [_, channels, anchors] = config.output_dims();
  let input_side = config.input_side;

  let session = Session::new(config)?;
  if let Some(classes) = &args.classes {
    session.set_selection(classes);
  }

  let input = ImageFileInput::from_url(&args.input)
    .with_context(|| format!("无法读取输入: {}", args.input))?;
  let model = ReplayModelBuilder::from_url(&args.model)?
    .dims(channels, anchors)
    .input_side(input_side)
    .build()
    .with_context(|| format!("无法加载推理输出: {}", args.model))?;
  let output = args
    .output
    .into_iter()
    .map(|url| {
      info!("输出路径: {}", url);
      OutputWrapper::from_url(&with_font(url, args.font.as_ref()))
    })
    .collect::<Result<Vec<_>, _>>()?;

  let thresholds = Thresholds {
    confidence: args.confidence,
    iou: args.iou,
  };
  let response = OneShotTask::new(&session)
    .with_thresholds(thresholds)
    .run_task(input, model, output)?;

  println!("{}", response.summary.total_count);
  for (name, stats) in &response.summary.per_class {
    println!(
      "  - {}: {} (置信度 {:.2} ~ {:.2}, 平均 {:.2})",
      name, stats.count, stats.min_confidence, stats.max_confidence, stats.mean_confidence
    );
  }

  Ok(())
}
