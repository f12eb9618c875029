// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rknn.rs - RKNN 推理引擎
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::InputTensor,
  model::{EngineError, InferenceEngine, ModelSignature, check_input},
};

const POSE_NUM_INPUTS: u32 = 1;
const POSE_DEFAULT_SIZE: u32 = 256;
const POSE_DEFAULT_MAX_DETECTIONS: usize = 6;

pub struct RknnEngine {
  context: Context,
  signature: ModelSignature,
  input_bytes: Vec<u8>,
}

/// 单次推理的结果句柄，离开作用域即释放
pub struct RknnOutput {
  data: Vec<f32>,
}

impl AsRef<[f32]> for RknnOutput {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl InferenceEngine for RknnEngine {
  type Error = EngineError;
  type Output<'a> = RknnOutput;

  fn signature(&self) -> &ModelSignature {
    &self.signature
  }

  fn invoke(&mut self, input: &InputTensor<'_>) -> Result<Self::Output<'_>, Self::Error> {
    check_input(&self.signature, input)?;

    self.input_bytes.clear();
    self
      .input_bytes
      .extend(input.as_slice().iter().flat_map(|v| v.to_ne_bytes()));

    debug!("设置模型输入");
    self
      .context
      .set_input(0, &self.input_bytes, TensorFormat::NHWC, TensorType::Int32)?;

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let outputs = self.context.get_outputs()?;
    let data = outputs.get_f32(0)?.to_vec();
    Ok(RknnOutput { data })
  }
}

pub struct RknnEngineBuilder {
  model_path: String,
  size: u32,
  max_detections: usize,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnEngineBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnEngineBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = RknnEngineBuilder {
      model_path: url.path().to_string(),
      size: POSE_DEFAULT_SIZE,
      max_detections: POSE_DEFAULT_MAX_DETECTIONS,
      flags: InitFlags::default(),
    };
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "size" => {
          builder.size = v
            .parse()
            .map_err(|_| EngineError::ModelPathError(format!("无效参数 size={}", v)))?
        }
        "max" => {
          builder.max_detections = v
            .parse()
            .map_err(|_| EngineError::ModelPathError(format!("无效参数 max={}", v)))?
        }
        _ => {}
      }
    }

    Ok(builder)
  }
}

impl RknnEngineBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnEngine, EngineError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context.num_inputs()?;
    let num_outputs = context.num_outputs()?;
    debug!("模型输入数量: {}, 输出数量: {}", num_inputs, num_outputs);

    if num_inputs != POSE_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        POSE_NUM_INPUTS, num_inputs
      );
      return Err(EngineError::ShapeMismatch(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        POSE_NUM_INPUTS, num_inputs
      )));
    }
    if num_outputs < 1 {
      return Err(EngineError::ShapeMismatch("模型没有输出".to_string()));
    }

    let signature = ModelSignature::movenet(self.size, self.max_detections);
    signature.validate()?;
    info!("模型加载完成");

    Ok(RknnEngine {
      context,
      signature,
      input_bytes: Vec::new(),
    })
  }
}
