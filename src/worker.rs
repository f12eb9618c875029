// 该文件是 Shanan （山南西风） 项目的一部分。
// src/worker.rs - 推理工作线程
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

//! # 推理工作线程
//!
//! 单个后台线程，状态只有 `Idle` 与 `Running` 两种。渲染循环通过
//! [`InferenceWorker::try_submit`] 提交任务：线程忙时立即返回 `false`，不排队。
//! 每个任务在工作线程上依次执行 编码 → 推理 → 解码 → 发布，
//! 失败只在任务边界记录日志，不会传到渲染循环。
//!
//! 关闭分两阶段：停止接收任务后限时等待，超时则置位中止标志再短暂等待，
//! 确认线程退出后才释放引擎。

use std::{
  panic::{AssertUnwindSafe, catch_unwind},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  encoder::{EncodeError, InputEncoder},
  frame::Frame,
  model::{DecodeError, DetectionSet, EngineError, InferenceEngine, ModelSignature, decode},
};

mod result;
pub use self::result::{ResultPublisher, ResultReceiver, result_channel};

const WORKER_THREAD_NAME: &str = "pose-inference";
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FORCED_TIMEOUT: Duration = Duration::from_secs(1);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("无法创建推理线程: {0}")]
  Spawn(#[from] std::io::Error),
  #[error("模型不可用: {0}")]
  Engine(#[from] EngineError),
}

#[derive(Error, Debug)]
pub enum JobError {
  #[error("编码失败: {0}")]
  Encode(#[from] EncodeError),
  #[error("推理失败: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("推理任务崩溃")]
  Panicked,
}

/// 提交时冻结的参数，之后界面上的修改不影响该任务
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobParams {
  pub threshold: f32,
  pub flip_vertical: bool,
}

struct Job {
  frame: Arc<Frame>,
  params: JobParams,
  sequence: u64,
}

#[derive(Default)]
struct WorkerState {
  running: AtomicBool,
  accepting: AtomicBool,
  abort: AtomicBool,
  completed: AtomicU64,
  failed: AtomicU64,
  last_latency_us: AtomicU64,
}

/// 关闭结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
  /// 是否进入了强制停止阶段
  pub forced: bool,
  /// 线程是否确认已退出
  pub stopped: bool,
  /// 引擎是否已在此处释放；为假时由仍在运行的线程在调用返回后释放
  pub engine_released: bool,
}

pub struct InferenceWorker<E: InferenceEngine> {
  state: Arc<WorkerState>,
  signature: ModelSignature,
  jobs: Option<Sender<Job>>,
  exited: Option<Receiver<E>>,
  handle: Option<thread::JoinHandle<()>>,
  next_sequence: AtomicU64,
}

impl<E: InferenceEngine> InferenceWorker<E> {
  /// 启动推理线程，引擎的所有权移交给该线程
  pub fn spawn(engine: E, publisher: ResultPublisher) -> Result<Self, WorkerError> {
    let signature = engine.signature().clone();
    signature.validate()?;

    let (job_tx, job_rx) = bounded::<Job>(1);
    let (exit_tx, exit_rx) = bounded::<E>(1);
    let state = Arc::new(WorkerState::default());
    state.accepting.store(true, Ordering::Release);

    let thread_state = state.clone();
    let (width, height) = (signature.input_width(), signature.input_height());
    let handle = thread::Builder::new()
      .name(WORKER_THREAD_NAME.to_string())
      .spawn(move || {
        let mut engine = engine;
        let mut encoder = InputEncoder::with_target(width, height);

        for job in job_rx.iter() {
          thread_state.process(&mut engine, &mut encoder, &publisher, job);
          thread_state.running.store(false, Ordering::Release);
          if thread_state.abort.load(Ordering::Acquire) {
            break;
          }
        }

        info!("推理线程退出");
        // 接收端已不存在时引擎在这里随返回值一起释放
        let _ = exit_tx.send(engine);
      })?;

    info!(
      "推理线程已启动: 输入 {:?}, 最多 {} 人",
      signature.input_shape,
      signature.max_detections()
    );

    Ok(Self {
      state,
      signature,
      jobs: Some(job_tx),
      exited: Some(exit_rx),
      handle: Some(handle),
      next_sequence: AtomicU64::new(0),
    })
  }

  /// 线程空闲时接受任务，否则立即返回 `false` 且不改变任何状态
  pub fn try_submit(&self, frame: Arc<Frame>, params: JobParams) -> bool {
    if !self.state.accepting.load(Ordering::Acquire) {
      return false;
    }
    let Some(jobs) = self.jobs.as_ref() else {
      return false;
    };
    if self
      .state
      .running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return false;
    }

    let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
    match jobs.try_send(Job {
      frame,
      params,
      sequence,
    }) {
      Ok(()) => {
        debug!("提交推理任务 {} (阈值 {:.2})", sequence, params.threshold);
        true
      }
      Err(TrySendError::Disconnected(_)) => {
        // 线程已在任务边界之外退出，之后的提交直接拒绝
        self.state.accepting.store(false, Ordering::Release);
        self.state.running.store(false, Ordering::Release);
        error!("推理线程已退出，不再接收任务");
        false
      }
      Err(TrySendError::Full(_)) => {
        self.state.running.store(false, Ordering::Release);
        warn!("推理任务 {} 提交失败: 队列已满", sequence);
        false
      }
    }
  }

  /// 是否仍在接收任务；关闭开始或线程意外退出后为 `false`
  pub fn is_accepting(&self) -> bool {
    self.state.accepting.load(Ordering::Acquire)
  }

  pub fn signature(&self) -> &ModelSignature {
    &self.signature
  }

  pub fn is_running(&self) -> bool {
    self.state.running.load(Ordering::Acquire)
  }

  /// 已结束的任务数（包括失败的），单调递增
  pub fn completed_jobs(&self) -> u64 {
    self.state.completed.load(Ordering::Acquire)
  }

  pub fn failed_jobs(&self) -> u64 {
    self.state.failed.load(Ordering::Acquire)
  }

  /// 最近一个任务从编码到发布的耗时
  pub fn last_latency(&self) -> Option<Duration> {
    if self.completed_jobs() == 0 {
      return None;
    }
    Some(Duration::from_micros(
      self.state.last_latency_us.load(Ordering::Acquire),
    ))
  }

  /// 轮询等待当前任务结束，超时返回 `false`
  pub fn wait_idle(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while self.is_running() {
      if Instant::now() >= deadline {
        return false;
      }
      thread::sleep(IDLE_POLL_INTERVAL);
    }
    true
  }

  /// 两阶段关闭，重复调用无副作用
  pub fn shutdown(&mut self, graceful: Duration, forced: Duration) -> ShutdownReport {
    self.state.accepting.store(false, Ordering::Release);
    drop(self.jobs.take());

    let (Some(handle), Some(exited)) = (self.handle.take(), self.exited.take()) else {
      return ShutdownReport {
        forced: false,
        stopped: true,
        engine_released: true,
      };
    };

    info!("停止接收推理任务，等待推理线程退出 (最长 {:?})", graceful);
    let mut report = ShutdownReport::default();
    let engine = match exited.recv_timeout(graceful) {
      Ok(engine) => Some(engine),
      Err(RecvTimeoutError::Timeout) => {
        warn!("推理任务未在 {:?} 内结束，强制停止", graceful);
        report.forced = true;
        self.state.abort.store(true, Ordering::Release);
        exited.recv_timeout(forced).ok()
      }
      Err(RecvTimeoutError::Disconnected) => None,
    };

    match engine {
      Some(engine) => {
        if handle.join().is_err() {
          warn!("推理线程异常退出");
        }
        report.stopped = true;
        drop(engine);
        report.engine_released = true;
        info!("推理引擎资源已释放");
      }
      None if handle.is_finished() => {
        // 线程已经退出，引擎随线程一起释放
        let _ = handle.join();
        report.stopped = true;
        report.engine_released = true;
        warn!("推理线程已退出但未交还引擎");
      }
      None => {
        // 交还通道随 `exited` 关闭，线程发送失败时自行释放引擎
        error!("推理线程在强制停止后仍未退出，引擎将在当前调用返回后释放");
      }
    }

    report
  }
}

impl<E: InferenceEngine> Drop for InferenceWorker<E> {
  fn drop(&mut self) {
    if self.handle.is_some() {
      self.shutdown(DEFAULT_GRACEFUL_TIMEOUT, DEFAULT_FORCED_TIMEOUT);
    }
  }
}

impl WorkerState {
  fn process<E: InferenceEngine>(
    &self,
    engine: &mut E,
    encoder: &mut InputEncoder,
    publisher: &ResultPublisher,
    job: Job,
  ) {
    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| run_job(engine, encoder, &job)))
      .unwrap_or(Err(JobError::Panicked));
    let elapsed = started.elapsed();
    self
      .last_latency_us
      .store(elapsed.as_micros() as u64, Ordering::Release);

    match result {
      Ok(_) if self.abort.load(Ordering::Acquire) => {
        warn!("强制停止中，丢弃任务 {} 的结果", job.sequence);
      }
      Ok(set) => {
        debug!(
          "任务 {} 完成，耗时: {:.2?}，检测到 {} 人",
          job.sequence,
          elapsed,
          set.len()
        );
        publisher.publish(set);
      }
      Err(e) => {
        self.failed.fetch_add(1, Ordering::AcqRel);
        error!("推理任务 {} 失败: {}", job.sequence, e);
      }
    }

    self.completed.fetch_add(1, Ordering::AcqRel);
  }
}

fn run_job<E: InferenceEngine>(
  engine: &mut E,
  encoder: &mut InputEncoder,
  job: &Job,
) -> Result<DetectionSet, JobError> {
  let signature = engine.signature();
  let (width, height) = (signature.input_width(), signature.input_height());

  let tensor = encoder.encode(&job.frame, width, height, job.params.flip_vertical)?;
  let output = engine
    .invoke(&tensor)
    .map_err(|e| JobError::Engine(Box::new(e)))?;
  let set = decode(output.as_ref(), job.params.threshold, job.sequence)?;
  Ok(set)
}
