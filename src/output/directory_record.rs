// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

//! 每帧一张叠加图 + 一份 JSON 记录，按日期分目录保存。
//!
//! 每个发布的结果（按任务序号）只记录一次。
//! `folder:///path/to/dir`，加 `?always` 时没有检测结果的帧也保存，
//! 加 `?record` 时保存原图而不绘制骨架。

use std::{
  cell::Cell,
  path::{Path, PathBuf},
};

use chrono::{Datelike, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{Detection, DetectionSet, KeypointKind},
  output::{Render, draw::SkeletonDraw},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Option<SkeletonDraw>,
  frame_counter: Cell<u16>,
  last_sequence: Cell<Option<u64>>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record_only = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: (!record_only).then(SkeletonDraw::default),
      frame_counter: Cell::new(0),
      last_sequence: Cell::new(None),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let id = self.frame_counter.get().wrapping_add(1);
    self.frame_counter.set(id);
    id
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn save_record(&self, path: &Path, result: &DetectionSet) -> Result<(), DirectoryRecordOutputError> {
    let record = json!({
      "sequence": result.sequence(),
      "threshold": result.threshold(),
      "people": result.items().iter().map(detection_json).collect::<Vec<_>>(),
    });
    std::fs::write(path.with_extension("json"), serde_json::to_vec_pretty(&record)?)?;
    Ok(())
  }
}

fn detection_json(detection: &Detection) -> Value {
  let keypoints: serde_json::Map<String, Value> = KeypointKind::ALL
    .iter()
    .map(|&kind| {
      let k = detection.keypoint(kind);
      (
        kind.to_label_str().to_string(),
        json!({ "x": k.x, "y": k.y, "score": k.score }),
      )
    })
    .collect();

  json!({
    "confidence": detection.confidence,
    "bbox": [
      detection.bbox.ymin,
      detection.bbox.xmin,
      detection.bbox.ymax,
      detection.bbox.xmax
    ],
    "keypoints": keypoints,
  })
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectionSet) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    if self.last_sequence.get() == Some(result.sequence()) {
      return Ok(());
    }

    let path = self.frame_path()?;
    let image = match &self.draw {
      Some(draw) => draw.draw_on_frame(frame, result),
      None => frame.to_rgb_image(),
    };
    image.save(&path)?;
    self.save_record(&path, result)?;
    self.last_sequence.set(Some(result.sequence()));
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_image_and_json_record() {
    let root = std::env::temp_dir().join(format!("shanan-pose-record-{}", std::process::id()));
    let url = url::Url::parse(&format!("folder://{}?always", root.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = Frame::from_packed(4, 4, vec![0xFF00_0000; 16]).unwrap();
    output
      .render_result(&frame, &DetectionSet::new(vec![], 0.4, 9))
      .unwrap();

    let mut found = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          found.push(path);
        }
      }
    }
    let json_path = found
      .iter()
      .find(|p| p.extension().is_some_and(|e| e == "json"))
      .unwrap();
    let record: Value = serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
    assert_eq!(record["sequence"], 9);
    assert_eq!(found.len(), 2);

    let _ = std::fs::remove_dir_all(root);
  }

  #[test]
  fn records_each_sequence_once() {
    let root = std::env::temp_dir().join(format!("shanan-pose-once-{}", std::process::id()));
    let url = url::Url::parse(&format!("folder://{}?always&record", root.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let frame = Frame::from_packed(2, 2, vec![0; 4]).unwrap();

    for sequence in [1, 1, 1, 2] {
      output
        .render_result(&frame, &DetectionSet::new(vec![], 0.3, sequence))
        .unwrap();
    }
    assert_eq!(output.frame_counter.get(), 2);
    let _ = std::fs::remove_dir_all(root);
  }

  #[test]
  fn failed_write_is_retried_for_same_sequence() {
    let root = std::env::temp_dir().join(format!("shanan-pose-retry-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    // 目标目录被同名文件占用，第一次写入必然失败
    std::fs::write(&root, b"").unwrap();
    let url = url::Url::parse(&format!("folder://{}?always&record", root.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let frame = Frame::from_packed(2, 2, vec![0; 4]).unwrap();
    let set = DetectionSet::new(vec![], 0.3, 5);

    assert!(output.render_result(&frame, &set).is_err());
    assert_eq!(output.last_sequence.get(), None);

    std::fs::remove_file(&root).unwrap();
    output.render_result(&frame, &set).unwrap();
    assert_eq!(output.last_sequence.get(), Some(5));
    let _ = std::fs::remove_dir_all(root);
  }

  #[test]
  fn skips_empty_results_by_default() {
    let root = std::env::temp_dir().join(format!("shanan-pose-skip-{}", std::process::id()));
    let url = url::Url::parse(&format!("folder://{}", root.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let frame = Frame::from_packed(1, 1, vec![0]).unwrap();
    output.render_result(&frame, &DetectionSet::default()).unwrap();
    assert!(!root.exists());
  }
}
