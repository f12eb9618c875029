// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 帧与输入张量定义
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

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("帧尺寸无效: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 一帧采集图像
///
/// 像素按行优先存储，每个像素是一个打包的 `0xAARRGGBB`。
/// 交给 [`crate::input::FrameFeeder`] 之后帧不再可变，推理线程读取的总是独立快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  width: u32,
  height: u32,
  pixels: Box<[u32]>,
}

impl Frame {
  pub fn from_packed(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyFrame { width, height });
    }
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: pixels.len(),
      });
    }

    Ok(Self {
      width,
      height,
      pixels: pixels.into_boxed_slice(),
    })
  }

  /// 从 RGB24 字节流构建，例如摄像头驱动缓冲区
  pub fn from_rgb_bytes(width: u32, height: u32, data: &[u8]) -> Result<Self, FrameError> {
    let expected = width as usize * height as usize * RGB_CHANNELS;
    if data.len() < expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    let pixels = data[..expected]
      .chunks_exact(RGB_CHANNELS)
      .map(|rgb| pack_rgb(rgb[0], rgb[1], rgb[2]))
      .collect();
    Self::from_packed(width, height, pixels)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn pixels(&self) -> &[u32] {
    &self.pixels
  }

  pub fn pixel(&self, x: u32, y: u32) -> u32 {
    self.pixels[y as usize * self.width as usize + x as usize]
  }
}

pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
  0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// 提取 R, G, B 分量，忽略 alpha
pub fn unpack_rgb(pixel: u32) -> [u8; 3] {
  [
    ((pixel >> 16) & 0xFF) as u8,
    ((pixel >> 8) & 0xFF) as u8,
    (pixel & 0xFF) as u8,
  ]
}

#[cfg(feature = "image")]
impl TryFrom<&image::RgbImage> for Frame {
  type Error = FrameError;

  fn try_from(image: &image::RgbImage) -> Result<Self, Self::Error> {
    let pixels = image
      .pixels()
      .map(|p| pack_rgb(p[0], p[1], p[2]))
      .collect();
    Self::from_packed(image.width(), image.height(), pixels)
  }
}

#[cfg(feature = "image")]
impl Frame {
  pub fn to_rgb_image(&self) -> image::RgbImage {
    image::ImageBuffer::from_fn(self.width, self.height, |x, y| {
      image::Rgb(unpack_rgb(self.pixel(x, y)))
    })
  }
}

/// NHWC 输入张量视图，形状 `[1, H, W, 3]`，每个分量为 0..=255 的 i32
#[derive(Debug, Clone, Copy)]
pub struct InputTensor<'a> {
  width: u32,
  height: u32,
  data: &'a [i32],
}

impl<'a> InputTensor<'a> {
  pub(crate) fn new(width: u32, height: u32, data: &'a [i32]) -> Self {
    debug_assert_eq!(data.len(), width as usize * height as usize * RGB_CHANNELS);
    Self {
      width,
      height,
      data,
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, self.height as usize, self.width as usize, RGB_CHANNELS]
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn as_slice(&self) -> &'a [i32] {
    self.data
  }

  /// 第 `y` 行的全部分量
  pub fn row(&self, y: u32) -> &'a [i32] {
    let stride = self.width as usize * RGB_CHANNELS;
    let start = y as usize * stride;
    &self.data[start..start + stride]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn packed_channels_round_trip_through_shifts() {
    let px = pack_rgb(12, 34, 56);
    assert_eq!(unpack_rgb(px), [12, 34, 56]);
    assert_eq!(unpack_rgb(0x7F01_0203), [1, 2, 3]);
  }

  #[test]
  fn rejects_mismatched_pixel_count() {
    let err = Frame::from_packed(2, 2, vec![0; 3]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        expected: 4,
        actual: 3
      }
    );
    assert!(matches!(
      Frame::from_packed(0, 2, vec![]),
      Err(FrameError::EmptyFrame { .. })
    ));
  }

  #[cfg(feature = "image")]
  #[test]
  fn image_conversion_checks_dimensions() {
    let empty = image::RgbImage::new(0, 0);
    assert_eq!(
      Frame::try_from(&empty),
      Err(FrameError::EmptyFrame {
        width: 0,
        height: 0
      })
    );

    let image = image::RgbImage::from_pixel(3, 2, image::Rgb([9, 8, 7]));
    let frame = Frame::try_from(&image).unwrap();
    assert_eq!((frame.width(), frame.height()), (3, 2));
    assert_eq!(unpack_rgb(frame.pixel(2, 1)), [9, 8, 7]);
  }

  #[test]
  fn builds_from_rgb24_buffer() {
    let frame = Frame::from_rgb_bytes(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
    assert_eq!(unpack_rgb(frame.pixel(1, 0)), [4, 5, 6]);
  }
}
