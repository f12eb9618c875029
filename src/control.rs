// 该文件是 Shanan （山南西风） 项目的一部分。
// src/control.rs - 运行时可调参数
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

use tracing::info;

use crate::worker::JobParams;

/// 置信度阈值与垂直翻转开关，只在提交任务时被读取
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
  threshold: f32,
  step: f32,
  flip_vertical: bool,
}

impl Controls {
  pub fn new(threshold: f32, step: f32, flip_vertical: bool) -> Self {
    Self {
      threshold: threshold.clamp(0.0, 1.0),
      step: step.abs(),
      flip_vertical,
    }
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn flip_vertical(&self) -> bool {
    self.flip_vertical
  }

  pub fn set_threshold(&mut self, threshold: f32) {
    self.threshold = threshold.clamp(0.0, 1.0);
    info!("置信度阈值: {:.2}", self.threshold);
  }

  pub fn raise_threshold(&mut self) {
    self.set_threshold(self.threshold + self.step);
  }

  pub fn lower_threshold(&mut self) {
    self.set_threshold(self.threshold - self.step);
  }

  pub fn toggle_flip(&mut self) {
    self.flip_vertical = !self.flip_vertical;
    info!("垂直翻转: {}", self.flip_vertical);
  }

  /// 提交任务时的参数快照
  pub fn job_params(&self) -> JobParams {
    JobParams {
      threshold: self.threshold,
      flip_vertical: self.flip_vertical,
    }
  }

  /// 应用一条外部指令，返回是否要求退出
  pub fn apply(&mut self, command: ControlCommand) -> bool {
    match command {
      ControlCommand::RaiseThreshold => self.raise_threshold(),
      ControlCommand::LowerThreshold => self.lower_threshold(),
      ControlCommand::SetThreshold(threshold) => self.set_threshold(threshold),
      ControlCommand::ToggleFlip => self.toggle_flip(),
      ControlCommand::Quit => return true,
    }
    false
  }
}

/// 来自键盘、信号等外部控制面的指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
  RaiseThreshold,
  LowerThreshold,
  SetThreshold(f32),
  ToggleFlip,
  Quit,
}

impl ControlCommand {
  /// 终端单键映射：`+`/`=` 提高阈值，`-` 降低，`f` 翻转，`q` 退出
  pub fn from_key(key: char) -> Option<Self> {
    match key {
      '+' | '=' => Some(ControlCommand::RaiseThreshold),
      '-' | '_' => Some(ControlCommand::LowerThreshold),
      'f' | 'F' => Some(ControlCommand::ToggleFlip),
      'q' | 'Q' => Some(ControlCommand::Quit),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn threshold_stays_within_unit_range() {
    let mut controls = Controls::new(0.95, 0.05, false);
    controls.raise_threshold();
    controls.raise_threshold();
    assert_eq!(controls.threshold(), 1.0);

    controls.set_threshold(0.02);
    controls.lower_threshold();
    assert_eq!(controls.threshold(), 0.0);
  }

  #[test]
  fn snapshot_is_unaffected_by_later_changes() {
    let mut controls = Controls::new(0.3, 0.1, false);
    let frozen = controls.job_params();
    controls.raise_threshold();
    controls.toggle_flip();

    assert_eq!(frozen.threshold, 0.3);
    assert!(!frozen.flip_vertical);
    assert!(controls.job_params().flip_vertical);
  }

  #[test]
  fn commands_map_keys_and_signal_quit() {
    let mut controls = Controls::new(0.3, 0.1, false);
    for key in "+f".chars() {
      let command = ControlCommand::from_key(key).unwrap();
      assert!(!controls.apply(command));
    }
    assert!((controls.threshold() - 0.4).abs() < 1e-6);
    assert!(controls.flip_vertical());

    assert_eq!(ControlCommand::from_key('x'), None);
    assert!(controls.apply(ControlCommand::from_key('q').unwrap()));
  }
}
