// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务循环
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

use std::{
  fmt::Display,
  thread,
  time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};

use crate::{
  config::PipelineConfig,
  control::{ControlCommand, Controls},
  input::FrameSource,
  model::{DetectionSet, InferenceEngine},
  output::Render,
  worker::{InferenceWorker, JobParams, ResultReceiver, ShutdownReport, result_channel},
};

const FORCE_EXIT_DELAY: Duration = Duration::from_secs(30);

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 推理线程与结果读取端；模型加载失败时只剩读取端，渲染照常进行
pub struct Pipeline<E: InferenceEngine> {
  worker: Option<InferenceWorker<E>>,
  results: ResultReceiver,
}

impl<E: InferenceEngine> Pipeline<E> {
  pub fn start<L: Display>(engine: Result<E, L>) -> Self {
    let engine = match engine {
      Ok(engine) => engine,
      Err(e) => {
        error!("模型加载失败，将在无推理状态下运行: {}", e);
        return Self::degraded();
      }
    };

    let (publisher, results) = result_channel();
    match InferenceWorker::spawn(engine, publisher) {
      Ok(worker) => Self {
        worker: Some(worker),
        results,
      },
      Err(e) => {
        error!("推理线程启动失败，将在无推理状态下运行: {}", e);
        Self::degraded()
      }
    }
  }

  pub fn degraded() -> Self {
    let (_publisher, results) = result_channel();
    Self {
      worker: None,
      results,
    }
  }

  pub fn is_degraded(&self) -> bool {
    self.worker.is_none()
  }

  pub fn worker(&self) -> Option<&InferenceWorker<E>> {
    self.worker.as_ref()
  }

  pub fn shutdown(&mut self, graceful: Duration, forced: Duration) -> Option<ShutdownReport> {
    let report = self.worker.as_mut()?.shutdown(graceful, forced);
    info!(
      "推理线程关闭: 强制 {}, 已退出 {}, 引擎已释放 {}",
      report.forced, report.stopped, report.engine_released
    );
    Some(report)
  }
}

/// 任务结束时的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskSummary {
  pub ticks: usize,
  pub submitted: u64,
  /// 推理线程忙而放弃提交的次数
  pub busy: u64,
  pub renders: u64,
  pub completed_jobs: u64,
  pub failed_jobs: u64,
  pub shutdown: Option<ShutdownReport>,
}

/// 把 Ctrl-C 转成退出指令；30 秒后仍未退出则强制结束进程
pub fn install_interrupt_handler(commands: Sender<ControlCommand>) -> Result<(), ctrlc::Error> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = commands.send(ControlCommand::Quit);
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_DELAY);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
}

/// 固定节拍的渲染循环
///
/// 每个节拍：读取最新帧，推理线程空闲时提交（忙则跳过），
/// 取最新结果连同当前帧交给渲染端。渲染从不等待推理。
#[derive(Default)]
pub struct OverlayTask {
  config: PipelineConfig,
  commands: Option<Receiver<ControlCommand>>,
}

impl OverlayTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      config,
      commands: None,
    }
  }

  pub fn with_commands(mut self, commands: Receiver<ControlCommand>) -> Self {
    self.commands = Some(commands);
    self
  }

  /// 处理积压的指令，返回是否要求退出
  fn drain_commands(&self, controls: &mut Controls) -> bool {
    let Some(commands) = self.commands.as_ref() else {
      return false;
    };
    commands.try_iter().any(|command| controls.apply(command))
  }

  fn tick_loop<E, O>(
    &self,
    input: &mut FrameSource,
    model: &mut Pipeline<E>,
    output: &O,
    summary: &mut TaskSummary,
  ) -> anyhow::Result<()>
  where
    E: InferenceEngine,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut controls = self.config.controls();
    let empty = DetectionSet::default();
    let mut pending_frame = false;
    let mut last_params: Option<JobParams> = None;

    loop {
      let tick_start = Instant::now();
      if self.config.max_ticks > 0 && summary.ticks >= self.config.max_ticks {
        info!("达到指定节拍数 {}, 退出任务循环", summary.ticks);
        break;
      }
      if self.drain_commands(&mut controls) {
        warn!("收到退出指令，退出任务循环");
        break;
      }
      summary.ticks += 1;

      if let Some((frame, is_new)) = input.latest() {
        pending_frame |= is_new;

        // 同一帧在参数变化后重新推理，静态图片也能看到阈值调整的效果
        let params = controls.job_params();
        let wants_job = pending_frame || last_params != Some(params);
        let worker = model.worker.as_ref().filter(|w| wants_job && w.is_accepting());
        if let Some(worker) = worker {
          if worker.try_submit(frame.clone(), params) {
            pending_frame = false;
            last_params = Some(params);
            summary.submitted += 1;
          } else {
            summary.busy += 1;
          }
        }

        let result = model.results.consume_latest();
        output.render_result(&frame, result.as_deref().unwrap_or(&empty))?;
        summary.renders += 1;
      }

      if let Some(rest) = self.config.tick_interval.checked_sub(tick_start.elapsed()) {
        thread::sleep(rest);
      }
    }

    Ok(())
  }
}

impl<E, O> Task<FrameSource, Pipeline<E>, O> for OverlayTask
where
  E: InferenceEngine,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: FrameSource,
    mut model: Pipeline<E>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    if model.is_degraded() {
      warn!("没有可用的推理引擎，只显示画面");
    }

    let mut summary = TaskSummary::default();
    let outcome = self.tick_loop(&mut input, &mut model, &output, &mut summary);
    if let Err(e) = &outcome {
      error!("任务循环异常结束: {}", e);
    }

    if let Some(worker) = model.worker() {
      summary.completed_jobs = worker.completed_jobs();
      summary.failed_jobs = worker.failed_jobs();
      if let Some(latency) = worker.last_latency() {
        info!("最近一次推理耗时: {:.2?}", latency);
      }
    }
    summary.shutdown = model.shutdown(self.config.graceful_timeout, self.config.forced_timeout);
    info!(
      "任务结束: {} 个节拍, 提交 {} 次, 忙碌跳过 {} 次, 渲染 {} 次",
      summary.ticks, summary.submitted, summary.busy, summary.renders
    );

    outcome.map(|()| summary)
  }
}

/// 单帧任务：提交一次，等待结果，渲染一次
#[derive(Default)]
pub struct OneShotTask {
  config: PipelineConfig,
}

impl OneShotTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }
}

impl<E, O> Task<FrameSource, Pipeline<E>, O> for OneShotTask
where
  E: InferenceEngine,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: FrameSource,
    mut model: Pipeline<E>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let (frame, _) = input
      .latest()
      .ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    let mut summary = TaskSummary {
      ticks: 1,
      ..TaskSummary::default()
    };

    if let Some(worker) = model.worker() {
      info!("输入帧获取成功，开始推理...");
      let now = Instant::now();
      if worker.try_submit(frame.clone(), self.config.controls().job_params()) {
        summary.submitted = 1;
        if !worker.wait_idle(self.config.graceful_timeout) {
          warn!("推理未在 {:?} 内完成", self.config.graceful_timeout);
        }
      }
      info!("推理完成，耗时: {:.2?}", now.elapsed());
      summary.completed_jobs = worker.completed_jobs();
      summary.failed_jobs = worker.failed_jobs();
    }

    let result = model.results.consume_latest().unwrap_or_default();
    info!("检测到 {} 人", result.len());
    output.render_result(&frame, &result)?;
    summary.renders = 1;

    summary.shutdown = model.shutdown(self.config.graceful_timeout, self.config.forced_timeout);
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, convert::Infallible};

  use super::*;
  use crate::{
    frame::Frame,
    model::{ModelSignature, POSE_ROW_STRIDE, ReplayEngine},
  };

  #[derive(Default)]
  struct Recorder {
    renders: RefCell<Vec<(usize, u64)>>,
  }

  impl Render for &Recorder {
    type Error = Infallible;

    fn render_result(&self, _frame: &Frame, result: &DetectionSet) -> Result<(), Self::Error> {
      self
        .renders
        .borrow_mut()
        .push((result.len(), result.sequence()));
      Ok(())
    }
  }

  fn still() -> FrameSource {
    FrameSource::still(Frame::from_packed(4, 4, vec![0xFF80_8080; 16]).unwrap())
  }

  fn engine() -> Result<ReplayEngine, crate::model::EngineError> {
    let mut row = vec![0.5; POSE_ROW_STRIDE];
    row[POSE_ROW_STRIDE - 1] = 0.9;
    ReplayEngine::new(ModelSignature::movenet(8, 1), row, Duration::ZERO)
  }

  fn config(max_ticks: usize) -> PipelineConfig {
    PipelineConfig::default()
      .with_tick_interval(Duration::from_millis(1))
      .with_max_ticks(max_ticks)
  }

  #[test]
  fn overlay_renders_published_result() {
    let recorder = Recorder::default();
    let summary = OverlayTask::new(config(200))
      .run_task(still(), Pipeline::start(engine()), &recorder)
      .unwrap();

    let renders = recorder.renders.borrow();
    assert_eq!(renders.len(), 200);
    assert_eq!(renders.last(), Some(&(1, 1)));
    assert_eq!(summary.ticks, 200);
    assert_eq!(summary.completed_jobs, 1);
    let report = summary.shutdown.unwrap();
    assert!(report.stopped && report.engine_released && !report.forced);
  }

  #[test]
  fn still_frame_is_submitted_once_without_parameter_changes() {
    let recorder = Recorder::default();
    let summary = OverlayTask::new(config(30))
      .run_task(still(), Pipeline::start(engine()), &recorder)
      .unwrap();
    assert_eq!(summary.submitted, 1);
  }

  #[test]
  fn commands_apply_before_submission() {
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(ControlCommand::SetThreshold(0.95)).unwrap();
    let recorder = Recorder::default();

    let summary = OverlayTask::new(config(200))
      .with_commands(rx)
      .run_task(still(), Pipeline::start(engine()), &recorder)
      .unwrap();
    assert_eq!(summary.submitted, 1);
    assert_eq!(recorder.renders.borrow().last(), Some(&(0, 1)));
  }

  #[test]
  fn degraded_pipeline_still_renders_frames() {
    let recorder = Recorder::default();
    let model = Pipeline::<ReplayEngine>::start(Err("找不到模型"));
    assert!(model.is_degraded());

    let summary = OverlayTask::new(config(10))
      .run_task(still(), model, &recorder)
      .unwrap();
    assert_eq!(*recorder.renders.borrow(), vec![(0, 0); 10]);
    assert_eq!(summary.submitted, 0);
    assert!(summary.shutdown.is_none());
  }

  #[test]
  fn quit_command_stops_before_first_tick() {
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(ControlCommand::Quit).unwrap();
    let recorder = Recorder::default();

    let summary = OverlayTask::new(config(0))
      .with_commands(rx)
      .run_task(still(), Pipeline::start(engine()), &recorder)
      .unwrap();
    assert_eq!(summary.ticks, 0);
    assert!(recorder.renders.borrow().is_empty());
  }

  #[test]
  fn one_shot_waits_for_result() {
    let recorder = Recorder::default();
    let summary = OneShotTask::default()
      .run_task(still(), Pipeline::start(engine()), &recorder)
      .unwrap();
    assert_eq!(*recorder.renders.borrow(), vec![(1, 1)]);
    assert_eq!(summary.submitted, 1);
  }

  #[test]
  fn one_shot_without_frames_is_an_error() {
    let (_feeder, source) = FrameSource::live();
    let recorder = Recorder::default();
    assert!(
      OneShotTask::default()
        .run_task(source, Pipeline::start(engine()), &recorder)
        .is_err()
    );
  }
}
