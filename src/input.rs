// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::sync::Arc;

use thiserror::Error;

use crate::{
  frame::Frame,
  slot::{SlotReader, SlotWriter, latest_slot},
};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lCapture, V4lInput, V4lInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

/// 采集端写入口，由采集线程或回调持有
pub struct FrameFeeder {
  writer: SlotWriter<Frame>,
}

impl FrameFeeder {
  /// 发布新帧。帧的所有权转移到交接槽，之后不会再被修改
  pub fn push(&self, frame: Frame) {
    self.writer.store(Arc::new(frame));
  }
}

/// 渲染循环侧的“最新帧”读取口
///
/// 隐藏帧来自推送式采集还是静态兜底图片。
pub struct FrameSource {
  slot: Option<SlotReader<Frame>>,
  current: Option<Arc<Frame>>,
  unseen: bool,
}

impl FrameSource {
  /// 推送式采集：返回写端与读端
  pub fn live() -> (FrameFeeder, FrameSource) {
    let (writer, reader) = latest_slot();
    let source = FrameSource {
      slot: Some(reader),
      current: None,
      unseen: false,
    };
    (FrameFeeder { writer }, source)
  }

  /// 静态兜底图片，第一次读取时报告为新帧
  pub fn still(frame: Frame) -> FrameSource {
    FrameSource {
      slot: None,
      current: Some(Arc::new(frame)),
      unseen: true,
    }
  }

  /// 返回最新一帧以及它是否是调用者尚未见过的帧；从不阻塞
  ///
  /// 没有新帧时返回上一帧并标记为 `false`；从未采集到任何帧时返回 `None`。
  pub fn latest(&mut self) -> Option<(Arc<Frame>, bool)> {
    if let Some(frame) = self.slot.as_ref().and_then(SlotReader::take) {
      self.current = Some(frame);
      self.unseen = true;
    }

    let frame = self.current.clone()?;
    let is_new = std::mem::take(&mut self.unseen);
    Some((frame, is_new))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn solid(value: u32) -> Frame {
    Frame::from_packed(2, 2, vec![value; 4]).unwrap()
  }

  #[test]
  fn live_source_is_empty_until_first_push() {
    let (_feeder, mut source) = FrameSource::live();
    assert!(source.latest().is_none());
  }

  #[test]
  fn repeated_reads_return_same_frame_as_not_new() {
    let (feeder, mut source) = FrameSource::live();
    feeder.push(solid(1));

    let (first, is_new) = source.latest().unwrap();
    assert!(is_new);
    let (again, is_new) = source.latest().unwrap();
    assert!(!is_new);
    assert!(Arc::ptr_eq(&first, &again));

    feeder.push(solid(2));
    let (next, is_new) = source.latest().unwrap();
    assert!(is_new);
    assert_eq!(next.pixel(0, 0), 2);
  }

  #[test]
  fn still_source_reports_new_once() {
    let mut source = FrameSource::still(solid(7));
    assert!(source.latest().unwrap().1);
    assert!(!source.latest().unwrap().1);
  }

  #[test]
  fn only_latest_of_burst_is_observed() {
    let (feeder, mut source) = FrameSource::live();
    for v in 0..5 {
      feeder.push(solid(v));
    }
    let (frame, _) = source.latest().unwrap();
    assert_eq!(frame.pixel(1, 1), 4);
  }
}
