// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头推送式输入
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{FrameFeeder, FrameSource},
};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use v4l::{FourCC, io::traits::CaptureStream, video::Capture};

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
}

const V4L_BUFFER_COUNT: u32 = 4;
const V4L_PIXEL_FORMAT: &[u8; 4] = b"RGB3";

/// V4L2 摄像头，`v4l:///dev/video0`
///
/// 打开设备并协商 RGB24 格式；调用 [`V4lInput::start`] 后由后台线程持续推送帧。
pub struct V4lInput {
  device_path: String,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    // v4l:///dev/video0
    let device_path = if url.path().is_empty() || url.path() == "/" {
      "/dev/video0".to_string()
    } else {
      url.path().to_string()
    };

    let device = v4l::Device::with_path(&device_path)?;
    let mut format = device.format()?;
    format.fourcc = FourCC::new(V4L_PIXEL_FORMAT);
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(V4L_PIXEL_FORMAT) {
      return Err(V4lInputError::UnsupportedPixelFormat(format.fourcc.to_string()));
    }
    info!(
      "打开摄像头 {}: {}x{} {}",
      device_path, format.width, format.height, format.fourcc
    );

    Ok(V4lInput {
      device_path,
      width: format.width,
      height: format.height,
    })
  }
}

impl V4lInput {
  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// 启动采集线程，返回采集句柄与渲染侧的帧源
  pub fn start(self) -> Result<(V4lCapture, FrameSource), V4lInputError> {
    let (feeder, source) = FrameSource::live();
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();

    let handle = thread::Builder::new()
      .name("v4l-capture".to_string())
      .spawn(move || {
        if let Err(e) = self.capture_loop(&feeder, &thread_stop) {
          error!("摄像头采集中断: {}", e);
        }
      })?;

    Ok((
      V4lCapture {
        stop,
        handle: Some(handle),
      },
      source,
    ))
  }

  fn capture_loop(&self, feeder: &FrameFeeder, stop: &AtomicBool) -> Result<(), V4lInputError> {
    let mut device = v4l::Device::with_path(&self.device_path)?;
    let mut stream = v4l::io::mmap::Stream::with_buffers(
      &mut device,
      v4l::buffer::Type::VideoCapture,
      V4L_BUFFER_COUNT,
    )?;

    while !stop.load(Ordering::Acquire) {
      let (buf, _meta) = stream.next()?;
      // 驱动缓冲区会被复用，这里复制成独立的帧
      match Frame::from_rgb_bytes(self.width, self.height, buf) {
        Ok(frame) => feeder.push(frame),
        Err(e) => warn!("丢弃异常帧: {}", e),
      }
    }

    info!("摄像头采集线程退出");
    Ok(())
  }
}

/// 采集线程句柄，释放时停止采集
pub struct V4lCapture {
  stop: Arc<AtomicBool>,
  handle: Option<thread::JoinHandle<()>>,
}

impl V4lCapture {
  pub fn stop(&mut self) {
    self.stop.store(true, Ordering::Release);
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("摄像头采集线程异常退出");
    }
  }
}

impl Drop for V4lCapture {
  fn drop(&mut self) {
    self.stop();
  }
}
