// 该文件是 Shanan （山南西风） 项目的一部分。
// src/encoder.rs - 输入张量编码
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

use thiserror::Error;
use tracing::debug;

use crate::frame::{Frame, InputTensor, RGB_CHANNELS, unpack_rgb};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
  #[error("目标尺寸无效: {width}x{height}")]
  EmptyTarget { width: u32, height: u32 },
}

/// 将帧缩放并打包为 NHWC i32 张量
///
/// 内部缓冲区跨调用复用，只有所需容量增大时才重新分配。
#[derive(Debug, Default)]
pub struct InputEncoder {
  buffer: Vec<i32>,
}

impl InputEncoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// 预分配 `width * height * 3` 个分量
  pub fn with_target(width: u32, height: u32) -> Self {
    Self {
      buffer: Vec::with_capacity(width as usize * height as usize * RGB_CHANNELS),
    }
  }

  pub fn capacity(&self) -> usize {
    self.buffer.capacity()
  }

  /// 最近邻缩放到 `target_w x target_h`，按行写入 R, G, B
  ///
  /// `flip_vertical` 为真时行序颠倒，列序不变。
  pub fn encode(
    &mut self,
    frame: &Frame,
    target_w: u32,
    target_h: u32,
    flip_vertical: bool,
  ) -> Result<InputTensor<'_>, EncodeError> {
    if target_w == 0 || target_h == 0 {
      return Err(EncodeError::EmptyTarget {
        width: target_w,
        height: target_h,
      });
    }

    let needed = target_w as usize * target_h as usize * RGB_CHANNELS;
    if needed > self.buffer.capacity() {
      debug!(
        "扩容输入缓冲区: {} -> {} 个分量",
        self.buffer.capacity(),
        needed
      );
    }
    self.buffer.resize(needed, 0);

    let (src_w, src_h) = (frame.width() as u64, frame.height() as u64);
    let stride = target_w as usize * RGB_CHANNELS;

    for y in 0..target_h {
      let sy = (y as u64 * src_h / target_h as u64) as u32;
      let out_y = if flip_vertical { target_h - 1 - y } else { y };
      let row = &mut self.buffer[out_y as usize * stride..(out_y as usize + 1) * stride];

      for (x, out) in row.chunks_exact_mut(RGB_CHANNELS).enumerate() {
        let sx = (x as u64 * src_w / target_w as u64) as u32;
        let [r, g, b] = unpack_rgb(frame.pixel(sx, sy));
        out[0] = r as i32;
        out[1] = g as i32;
        out[2] = b as i32;
      }
    }

    Ok(InputTensor::new(target_w, target_h, &self.buffer))
  }
}
