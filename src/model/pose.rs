// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/pose.rs - 姿态检测结果定义
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

pub const KEYPOINT_COUNT: usize = 17;
/// 每行: 17 x (y, x, score) + bbox(4) + score(1)
pub const POSE_ROW_STRIDE: usize = 56;
pub(crate) const BBOX_OFFSET: usize = KEYPOINT_COUNT * 3;
pub(crate) const SCORE_OFFSET: usize = BBOX_OFFSET + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypointKind {
  Nose,
  LeftEye,
  RightEye,
  LeftEar,
  RightEar,
  LeftShoulder,
  RightShoulder,
  LeftElbow,
  RightElbow,
  LeftWrist,
  RightWrist,
  LeftHip,
  RightHip,
  LeftKnee,
  RightKnee,
  LeftAnkle,
  RightAnkle,
}

impl KeypointKind {
  pub const ALL: [KeypointKind; KEYPOINT_COUNT] = [
    KeypointKind::Nose,
    KeypointKind::LeftEye,
    KeypointKind::RightEye,
    KeypointKind::LeftEar,
    KeypointKind::RightEar,
    KeypointKind::LeftShoulder,
    KeypointKind::RightShoulder,
    KeypointKind::LeftElbow,
    KeypointKind::RightElbow,
    KeypointKind::LeftWrist,
    KeypointKind::RightWrist,
    KeypointKind::LeftHip,
    KeypointKind::RightHip,
    KeypointKind::LeftKnee,
    KeypointKind::RightKnee,
    KeypointKind::LeftAnkle,
    KeypointKind::RightAnkle,
  ];

  pub fn index(self) -> usize {
    self as usize
  }

  pub fn to_label_str(self) -> &'static str {
    match self {
      KeypointKind::Nose => "nose",
      KeypointKind::LeftEye => "left_eye",
      KeypointKind::RightEye => "right_eye",
      KeypointKind::LeftEar => "left_ear",
      KeypointKind::RightEar => "right_ear",
      KeypointKind::LeftShoulder => "left_shoulder",
      KeypointKind::RightShoulder => "right_shoulder",
      KeypointKind::LeftElbow => "left_elbow",
      KeypointKind::RightElbow => "right_elbow",
      KeypointKind::LeftWrist => "left_wrist",
      KeypointKind::RightWrist => "right_wrist",
      KeypointKind::LeftHip => "left_hip",
      KeypointKind::RightHip => "right_hip",
      KeypointKind::LeftKnee => "left_knee",
      KeypointKind::RightKnee => "right_knee",
      KeypointKind::LeftAnkle => "left_ankle",
      KeypointKind::RightAnkle => "right_ankle",
    }
  }
}

/// 归一化坐标的关键点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
  pub x: f32,
  pub y: f32,
  pub score: f32,
}

/// 归一化边框，顺序与模型输出一致
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
  pub ymin: f32,
  pub xmin: f32,
  pub ymax: f32,
  pub xmax: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub confidence: f32,
  pub bbox: BoundingBox,
  pub keypoints: [Keypoint; KEYPOINT_COUNT],
}

impl Detection {
  pub fn keypoint(&self, kind: KeypointKind) -> &Keypoint {
    &self.keypoints[kind.index()]
  }
}

/// 一次推理产生的检测集合，发布后不可变
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionSet {
  items: Box<[Detection]>,
  threshold: f32,
  sequence: u64,
}

impl DetectionSet {
  pub fn new(items: Vec<Detection>, threshold: f32, sequence: u64) -> Self {
    Self {
      items: items.into_boxed_slice(),
      threshold,
      sequence,
    }
  }

  pub fn items(&self) -> &[Detection] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 提交任务时冻结的置信度阈值，可能与当前界面上的阈值不同
  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 产生该结果的任务序号，单调递增
  pub fn sequence(&self) -> u64 {
    self.sequence
  }
}
