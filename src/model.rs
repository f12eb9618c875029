// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use crate::frame::{InputTensor, RGB_CHANNELS};

/// 推理引擎：固定形状输入张量 → 固定形状输出张量
///
/// `invoke` 内部获取并释放输入句柄；返回的 `Output` 是结果句柄，
/// 在每个任务结束时（无论成功失败）被释放。
pub trait InferenceEngine: Send + 'static {
  type Error: std::error::Error + Send + Sync + 'static;
  type Output<'a>: AsRef<[f32]>
  where
    Self: 'a;

  fn signature(&self) -> &ModelSignature;
  fn invoke(&mut self, input: &InputTensor<'_>) -> Result<Self::Output<'_>, Self::Error>;
}

/// 模型声明的输入输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSignature {
  pub input_name: String,
  /// `[1, H, W, 3]`
  pub input_shape: [usize; 4],
  pub output_name: String,
  /// `[1, N, 56]`
  pub output_shape: [usize; 3],
}

impl ModelSignature {
  pub fn movenet(input_size: u32, max_detections: usize) -> Self {
    Self {
      input_name: "input".to_string(),
      input_shape: [1, input_size as usize, input_size as usize, RGB_CHANNELS],
      output_name: "output_0".to_string(),
      output_shape: [1, max_detections, POSE_ROW_STRIDE],
    }
  }

  pub fn input_width(&self) -> u32 {
    self.input_shape[2] as u32
  }

  pub fn input_height(&self) -> u32 {
    self.input_shape[1] as u32
  }

  pub fn max_detections(&self) -> usize {
    self.output_shape[1]
  }

  /// 检查是否符合多人姿态模型的固定布局
  pub fn validate(&self) -> Result<(), EngineError> {
    let [batch, h, w, c] = self.input_shape;
    if batch != 1 || h == 0 || w == 0 || c != RGB_CHANNELS {
      return Err(EngineError::ShapeMismatch(format!(
        "输入 {} 形状应为 [1, H, W, 3], 实际为 {:?}",
        self.input_name, self.input_shape
      )));
    }
    let [batch, _, stride] = self.output_shape;
    if batch != 1 || stride != POSE_ROW_STRIDE {
      return Err(EngineError::ShapeMismatch(format!(
        "输出 {} 形状应为 [1, N, {}], 实际为 {:?}",
        self.output_name, POSE_ROW_STRIDE, self.output_shape
      )));
    }
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error("输入张量形状 {actual:?} 与模型声明 {expected:?} 不一致")]
  InputShape {
    expected: [usize; 4],
    actual: [usize; 4],
  },
  #[error("回放数据错误: {0}")]
  ReplayData(#[from] serde_json::Error),
  #[cfg(feature = "rknpu")]
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
}

/// 调用前检查输入张量形状
pub fn check_input(signature: &ModelSignature, input: &InputTensor<'_>) -> Result<(), EngineError> {
  if input.shape() != signature.input_shape {
    return Err(EngineError::InputShape {
      expected: signature.input_shape,
      actual: input.shape(),
    });
  }
  Ok(())
}

mod decode;
mod pose;
mod replay;
#[cfg(feature = "rknpu")]
mod rknn;

pub use self::decode::{DecodeError, decode};
pub use self::pose::{
  BoundingBox, Detection, DetectionSet, KEYPOINT_COUNT, Keypoint, KeypointKind, POSE_ROW_STRIDE,
};
pub use self::replay::{ReplayEngine, ReplayEngineBuilder};
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnEngine, RknnEngineBuilder};

/// 按 URL 方案选择的推理引擎
pub enum EngineWrapper {
  Replay(ReplayEngine),
  #[cfg(feature = "rknpu")]
  Rknn(RknnEngine),
}

pub enum EngineOutput<'a> {
  Replay(&'a [f32]),
  #[cfg(feature = "rknpu")]
  Rknn(self::rknn::RknnOutput),
}

impl AsRef<[f32]> for EngineOutput<'_> {
  fn as_ref(&self) -> &[f32] {
    match self {
      EngineOutput::Replay(data) => data,
      #[cfg(feature = "rknpu")]
      EngineOutput::Rknn(output) => output.as_ref(),
    }
  }
}

impl crate::FromUrl for EngineWrapper {
  type Error = EngineError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    match url.scheme() {
      ReplayEngineBuilder::SCHEME => Ok(EngineWrapper::Replay(
        ReplayEngineBuilder::from_url(url)?.build()?,
      )),
      #[cfg(feature = "rknpu")]
      RknnEngineBuilder::SCHEME => Ok(EngineWrapper::Rknn(
        RknnEngineBuilder::from_url(url)?.build()?,
      )),
      scheme => Err(EngineError::ModelPathError(format!(
        "不支持的模型方案: {}",
        scheme
      ))),
    }
  }
}

impl InferenceEngine for EngineWrapper {
  type Error = EngineError;
  type Output<'a> = EngineOutput<'a>;

  fn signature(&self) -> &ModelSignature {
    match self {
      EngineWrapper::Replay(engine) => engine.signature(),
      #[cfg(feature = "rknpu")]
      EngineWrapper::Rknn(engine) => engine.signature(),
    }
  }

  fn invoke(&mut self, input: &InputTensor<'_>) -> Result<Self::Output<'_>, Self::Error> {
    match self {
      EngineWrapper::Replay(engine) => engine.invoke(input).map(EngineOutput::Replay),
      #[cfg(feature = "rknpu")]
      EngineWrapper::Rknn(engine) => engine.invoke(input).map(EngineOutput::Rknn),
    }
  }
}
