// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/replay.rs - 回放推理引擎
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

//! 不依赖 NPU 的引擎：每次调用都返回预先录制好的输出行。
//!
//! `replay:///path/to/rows.json?size=256&max=6&delay_ms=80`，
//! JSON 文件内容为若干长度为 56 的浮点数组。

use std::{thread, time::Duration};

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::InputTensor,
  model::{EngineError, InferenceEngine, ModelSignature, POSE_ROW_STRIDE, check_input},
};

const REPLAY_DEFAULT_SIZE: u32 = 256;
const REPLAY_DEFAULT_MAX_DETECTIONS: usize = 6;

pub struct ReplayEngine {
  signature: ModelSignature,
  output: Vec<f32>,
  delay: Duration,
}

impl ReplayEngine {
  /// `rows` 按行展开，不足 `max_detections` 行时补零
  pub fn new(
    signature: ModelSignature,
    rows: Vec<f32>,
    delay: Duration,
  ) -> Result<Self, EngineError> {
    signature.validate()?;

    let capacity = signature.max_detections() * POSE_ROW_STRIDE;
    if rows.len() % POSE_ROW_STRIDE != 0 || rows.len() > capacity {
      return Err(EngineError::ShapeMismatch(format!(
        "回放数据长度 {} 不符合 [1, {}, {}]",
        rows.len(),
        signature.max_detections(),
        POSE_ROW_STRIDE
      )));
    }

    let mut output = rows;
    output.resize(capacity, 0.0);

    Ok(Self {
      signature,
      output,
      delay,
    })
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = EngineError;
  type Output<'a> = &'a [f32];

  fn signature(&self) -> &ModelSignature {
    &self.signature
  }

  fn invoke(&mut self, input: &InputTensor<'_>) -> Result<Self::Output<'_>, Self::Error> {
    check_input(&self.signature, input)?;
    if !self.delay.is_zero() {
      thread::sleep(self.delay);
    }
    debug!("回放输出 {} 个分量", self.output.len());
    Ok(&self.output)
  }
}

pub struct ReplayEngineBuilder {
  path: String,
  size: u32,
  max_detections: usize,
  delay: Duration,
}

impl FromUrlWithScheme for ReplayEngineBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngineBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = ReplayEngineBuilder {
      path: url.path().to_string(),
      size: REPLAY_DEFAULT_SIZE,
      max_detections: REPLAY_DEFAULT_MAX_DETECTIONS,
      delay: Duration::ZERO,
    };

    for (k, v) in url.query_pairs() {
      let parsed = match k.as_ref() {
        "size" => v.parse().map(|size| builder.size = size).is_ok(),
        "max" => v.parse().map(|max| builder.max_detections = max).is_ok(),
        "delay_ms" => v
          .parse()
          .map(|ms| builder.delay = Duration::from_millis(ms))
          .is_ok(),
        _ => true,
      };
      if !parsed {
        return Err(EngineError::ModelPathError(format!("无效参数 {}={}", k, v)));
      }
    }

    Ok(builder)
  }
}

impl ReplayEngineBuilder {
  pub fn build(self) -> Result<ReplayEngine, EngineError> {
    info!("加载回放数据: {}", self.path);
    let data = std::fs::read(&self.path)?;
    let rows: Vec<Vec<f32>> = serde_json::from_slice(&data)?;
    debug!("回放数据共 {} 行", rows.len());

    if let Some(bad) = rows.iter().find(|row| row.len() != POSE_ROW_STRIDE) {
      return Err(EngineError::ShapeMismatch(format!(
        "回放行长度应为 {}, 实际为 {}",
        POSE_ROW_STRIDE,
        bad.len()
      )));
    }

    let signature = ModelSignature::movenet(self.size, self.max_detections);
    ReplayEngine::new(signature, rows.concat(), self.delay)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{encoder::InputEncoder, frame::Frame};

  #[test]
  fn pads_missing_rows_with_zeros() {
    let mut engine = ReplayEngine::new(
      ModelSignature::movenet(4, 3),
      vec![0.5; POSE_ROW_STRIDE],
      Duration::ZERO,
    )
    .unwrap();

    let frame = Frame::from_packed(2, 2, vec![0; 4]).unwrap();
    let mut encoder = InputEncoder::new();
    let tensor = encoder.encode(&frame, 4, 4, false).unwrap();
    let output = engine.invoke(&tensor).unwrap();
    assert_eq!(output.len(), 3 * POSE_ROW_STRIDE);
    assert_eq!(output[POSE_ROW_STRIDE - 1], 0.5);
    assert_eq!(output[2 * POSE_ROW_STRIDE - 1], 0.0);
  }

  #[test]
  fn rejects_input_of_wrong_shape() {
    let mut engine =
      ReplayEngine::new(ModelSignature::movenet(4, 1), vec![], Duration::ZERO).unwrap();
    let frame = Frame::from_packed(2, 2, vec![0; 4]).unwrap();
    let mut encoder = InputEncoder::new();
    let tensor = encoder.encode(&frame, 8, 8, false).unwrap();
    assert!(matches!(
      engine.invoke(&tensor),
      Err(EngineError::InputShape { .. })
    ));
  }

  #[test]
  fn builds_from_url_and_json_file() {
    let path = std::env::temp_dir().join(format!("shanan-pose-replay-{}.json", std::process::id()));
    let row: Vec<f32> = (0..POSE_ROW_STRIDE).map(|i| i as f32 / 100.0).collect();
    std::fs::write(&path, serde_json::to_vec(&vec![row]).unwrap()).unwrap();

    let url = Url::parse(&format!(
      "replay://{}?size=128&max=2&delay_ms=5",
      path.display()
    ))
    .unwrap();
    let engine = ReplayEngineBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(engine.signature().input_shape, [1, 128, 128, 3]);
    assert_eq!(engine.signature().max_detections(), 2);
    assert_eq!(engine.delay, Duration::from_millis(5));

    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn rejects_bad_query() {
    let url = Url::parse("replay:///tmp/rows.json?size=big").unwrap();
    assert!(ReplayEngineBuilder::from_url(&url).is_err());
  }
}
