// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 流水线配置
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

use crate::{
  control::Controls,
  worker::{DEFAULT_FORCED_TIMEOUT, DEFAULT_GRACEFUL_TIMEOUT},
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_THRESHOLD_STEP: f32 = 0.05;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub confidence: f32,
  pub threshold_step: f32,
  pub flip_vertical: bool,
  /// 渲染循环的节拍
  pub tick_interval: Duration,
  pub graceful_timeout: Duration,
  pub forced_timeout: Duration,
  /// 0 表示不限制
  pub max_ticks: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE_THRESHOLD,
      threshold_step: DEFAULT_THRESHOLD_STEP,
      flip_vertical: false,
      tick_interval: DEFAULT_TICK_INTERVAL,
      graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
      forced_timeout: DEFAULT_FORCED_TIMEOUT,
      max_ticks: 0,
    }
  }
}

impl PipelineConfig {
  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn with_threshold_step(mut self, threshold_step: f32) -> Self {
    self.threshold_step = threshold_step;
    self
  }

  pub fn with_flip_vertical(mut self, flip_vertical: bool) -> Self {
    self.flip_vertical = flip_vertical;
    self
  }

  pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
    self.tick_interval = tick_interval;
    self
  }

  pub fn with_max_ticks(mut self, max_ticks: usize) -> Self {
    self.max_ticks = max_ticks;
    self
  }

  pub fn with_shutdown_timeouts(mut self, graceful: Duration, forced: Duration) -> Self {
    self.graceful_timeout = graceful;
    self.forced_timeout = forced;
    self
  }

  pub fn controls(&self) -> Controls {
    Controls::new(self.confidence, self.threshold_step, self.flip_vertical)
  }
}
