// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/pose_overlay.rs - 实时姿态叠加
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

use std::{io::BufRead, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::Sender;
use tracing::{info, warn};
use url::Url;

use shanan_pose::{
  FromUrl,
  config::PipelineConfig,
  control::ControlCommand,
  input::{FrameSource, ImageFileInput},
  model::EngineWrapper,
  output::OutputWrapper,
  task::{OverlayTask, Pipeline, Task, install_interrupt_handler},
};

/// 实时多人姿态叠加
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 rknn:///path/to/movenet.rknn?size=256&max=6
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，image:///path 或 v4l:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 摄像头不可用时使用的静态图片
  #[arg(long, value_name = "IMAGE")]
  pub fallback: Option<Url>,
  /// 输出，image:///path/out.png、folder:///path 或 null:
  #[arg(long, value_name = "OUTPUT", default_value = "null:")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.3, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 每次按键调整阈值的步长
  #[arg(long, default_value_t = 0.05, value_name = "STEP")]
  pub threshold_step: f32,
  /// 送入模型前垂直翻转
  #[arg(long)]
  pub flip: bool,
  /// 渲染节拍（毫秒）
  #[arg(long, default_value_t = 33, value_name = "MILLIS")]
  pub tick_ms: u64,
  /// 最大节拍数，0 表示不限制
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_ticks: usize,
  /// 从标准输入读取按键：+ - f q
  #[arg(long)]
  pub keyboard: bool,
}

fn open_fallback(args: &Args) -> Result<FrameSource> {
  let url = args
    .fallback
    .as_ref()
    .ok_or_else(|| anyhow::anyhow!("输入不可用且没有指定兜底图片"))?;
  Ok(ImageFileInput::from_url(url)?.into_source())
}

#[cfg(feature = "v4l_input")]
fn open_input(args: &Args) -> Result<(Option<shanan_pose::input::V4lCapture>, FrameSource)> {
  use shanan_pose::{FromUrlWithScheme, input::V4lInput};

  if args.input.scheme() != V4lInput::SCHEME {
    return Ok((None, ImageFileInput::from_url(&args.input)?.into_source()));
  }

  match V4lInput::from_url(&args.input).and_then(V4lInput::start) {
    Ok((capture, source)) => Ok((Some(capture), source)),
    Err(e) => {
      warn!("摄像头不可用，改用静态图片: {}", e);
      Ok((None, open_fallback(args)?))
    }
  }
}

#[cfg(not(feature = "v4l_input"))]
fn open_input(args: &Args) -> Result<((), FrameSource)> {
  match ImageFileInput::from_url(&args.input) {
    Ok(input) => Ok(((), input.into_source())),
    Err(e) => {
      warn!("输入不可用，改用静态图片: {}", e);
      Ok(((), open_fallback(args)?))
    }
  }
}

fn spawn_keyboard(commands: Sender<ControlCommand>) -> Result<()> {
  thread::Builder::new()
    .name("keyboard".to_string())
    .spawn(move || {
      for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        for command in line.chars().filter_map(ControlCommand::from_key) {
          if commands.send(command).is_err() {
            return;
          }
        }
      }
    })?;
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = PipelineConfig::default()
    .with_confidence(args.confidence)
    .with_threshold_step(args.threshold_step)
    .with_flip_vertical(args.flip)
    .with_tick_interval(Duration::from_millis(args.tick_ms))
    .with_max_ticks(args.max_ticks);

  let (commands, command_rx) = crossbeam_channel::unbounded();
  install_interrupt_handler(commands.clone())?;
  if args.keyboard {
    spawn_keyboard(commands)?;
  }

  // 采集句柄需要活到任务结束
  let (_capture, source) = open_input(&args)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let pipeline = Pipeline::start(EngineWrapper::from_url(&args.model));

  let summary = OverlayTask::new(config)
    .with_commands(command_rx)
    .run_task(source, pipeline, output)?;

  info!(
    "完成: 推理 {} 次 (失败 {} 次), 渲染 {} 次",
    summary.completed_jobs, summary.failed_jobs, summary.renders
  );
  if summary.shutdown.is_some_and(|report| !report.engine_released) {
    warn!("推理引擎未能在关闭时释放");
  }

  Ok(())
}
