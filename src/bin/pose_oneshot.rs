// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/pose_oneshot.rs - 单张图片姿态推理
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_pose::{
  FromUrl,
  config::PipelineConfig,
  input::ImageFileInput,
  model::EngineWrapper,
  output::OutputWrapper,
  task::{OneShotTask, Pipeline, Task},
};
use tracing::info;

/// 对一张图片做一次姿态推理并保存叠加结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 rknn:///path/to/movenet.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图片，image:///path/to/in.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，image:///path/to/out.png 或 folder:///path
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.3, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 送入模型前垂直翻转
  #[arg(long)]
  pub flip: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let source = ImageFileInput::from_url(&args.input)?.into_source();
  let output = OutputWrapper::from_url(&args.output)?;
  let pipeline = Pipeline::start(EngineWrapper::from_url(&args.model));

  let config = PipelineConfig::default()
    .with_confidence(args.confidence)
    .with_flip_vertical(args.flip);
  let summary = OneShotTask::new(config).run_task(source, pipeline, output)?;
  if summary.failed_jobs > 0 {
    anyhow::bail!("推理失败");
  }

  Ok(())
}
