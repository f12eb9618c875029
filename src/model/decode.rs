// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - 模型输出解码
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

use super::pose::{
  BBOX_OFFSET, BoundingBox, Detection, DetectionSet, KEYPOINT_COUNT, Keypoint, POSE_ROW_STRIDE,
  SCORE_OFFSET,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出长度 {0} 不是 56 的整数倍")]
  Misaligned(usize),
}

/// 按固定偏移解析 `[1, N, 56]` 输出
///
/// 置信度 `>= threshold` 的行保留（包含边界），其余整行丢弃；结果保持引擎的行序。
/// 数值全部复制出来，不持有引擎缓冲区的引用。
pub fn decode(output: &[f32], threshold: f32, sequence: u64) -> Result<DetectionSet, DecodeError> {
  if output.len() % POSE_ROW_STRIDE != 0 {
    return Err(DecodeError::Misaligned(output.len()));
  }

  let items: Vec<Detection> = output
    .chunks_exact(POSE_ROW_STRIDE)
    .filter(|row| row[SCORE_OFFSET] >= threshold)
    .map(decode_row)
    .collect();

  debug!(
    "解码 {} 行，保留 {} 个人 (阈值 {:.2})",
    output.len() / POSE_ROW_STRIDE,
    items.len(),
    threshold
  );

  Ok(DetectionSet::new(items, threshold, sequence))
}

fn decode_row(row: &[f32]) -> Detection {
  let mut keypoints = [Keypoint::default(); KEYPOINT_COUNT];
  for (keypoint, yxs) in keypoints.iter_mut().zip(row[..BBOX_OFFSET].chunks_exact(3)) {
    *keypoint = Keypoint {
      x: yxs[1],
      y: yxs[0],
      score: yxs[2],
    };
  }

  Detection {
    confidence: row[SCORE_OFFSET],
    bbox: BoundingBox {
      ymin: row[BBOX_OFFSET],
      xmin: row[BBOX_OFFSET + 1],
      ymax: row[BBOX_OFFSET + 2],
      xmax: row[BBOX_OFFSET + 3],
    },
    keypoints,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::KeypointKind;

  fn row(confidence: f32, bbox: [f32; 4], keypoint_score: f32) -> Vec<f32> {
    let mut row = Vec::with_capacity(POSE_ROW_STRIDE);
    for i in 0..KEYPOINT_COUNT {
      let v = i as f32 / 100.0;
      row.extend_from_slice(&[v, v + 0.5, keypoint_score]);
    }
    row.extend_from_slice(&bbox);
    row.push(confidence);
    row
  }

  #[test]
  fn single_row_round_trips_exact_values() {
    let output = row(0.5, [0.1, 0.2, 0.8, 0.9], 0.9);
    let set = decode(&output, 0.3, 7).unwrap();

    assert_eq!(set.len(), 1);
    assert_eq!(set.sequence(), 7);
    let det = &set.items()[0];
    assert_eq!(det.confidence, 0.5);
    assert_eq!(
      det.bbox,
      BoundingBox {
        ymin: 0.1,
        xmin: 0.2,
        ymax: 0.8,
        xmax: 0.9
      }
    );
    assert!(det.keypoints.iter().all(|k| k.score == 0.9));
    let elbow = det.keypoint(KeypointKind::LeftElbow);
    assert_eq!(elbow.y, 7.0 / 100.0);
    assert_eq!(elbow.x, 7.0 / 100.0 + 0.5);
  }

  #[test]
  fn threshold_is_inclusive_and_drops_rows_below() {
    let mut output = row(0.3, [0.0; 4], 0.5);
    output.extend(row(0.29, [0.0; 4], 0.5));
    output.extend(row(f32::NAN, [0.0; 4], 0.5));
    output.extend(row(0.95, [0.0; 4], 0.5));

    let set = decode(&output, 0.3, 0).unwrap();
    let confidences: Vec<f32> = set.items().iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.3, 0.95]);
    assert!(set.items().iter().all(|d| d.confidence >= 0.3));
  }

  #[test]
  fn keeps_engine_row_order() {
    let mut output = row(0.4, [0.0; 4], 0.5);
    output.extend(row(0.9, [0.0; 4], 0.5));
    output.extend(row(0.6, [0.0; 4], 0.5));

    let set = decode(&output, 0.0, 0).unwrap();
    let confidences: Vec<f32> = set.items().iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.4, 0.9, 0.6]);
  }

  #[test]
  fn empty_output_gives_empty_set() {
    let set = decode(&[], 0.3, 1).unwrap();
    assert!(set.is_empty());
    assert_eq!(set.threshold(), 0.3);
  }

  #[test]
  fn rejects_partial_rows() {
    let output = vec![0.0; POSE_ROW_STRIDE + 3];
    assert_eq!(
      decode(&output, 0.3, 0).unwrap_err(),
      DecodeError::Misaligned(POSE_ROW_STRIDE + 3)
    );
  }
}
