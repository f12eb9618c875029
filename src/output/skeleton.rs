// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/skeleton.rs - 骨架绘制规划
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

use crate::model::{Detection, DetectionSet, KeypointKind};

/// 关键点分数必须严格大于该值才绘制
pub const VISIBILITY_THRESHOLD: f32 = 0.2;

/// 人体骨架的 16 条无向边
pub const SKELETON_EDGES: [(KeypointKind, KeypointKind); 16] = {
  use KeypointKind::*;
  [
    (Nose, LeftEye),
    (Nose, RightEye),
    (LeftEye, LeftEar),
    (RightEye, RightEar),
    (Nose, LeftShoulder),
    (Nose, RightShoulder),
    (LeftShoulder, LeftElbow),
    (LeftElbow, LeftWrist),
    (RightShoulder, RightElbow),
    (RightElbow, RightWrist),
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftHip, LeftKnee),
    (LeftKnee, LeftAnkle),
    (RightHip, RightKnee),
    (RightKnee, RightAnkle),
  ]
};

/// 像素坐标下的绘制指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
  Rect {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
  },
  Marker {
    x: f32,
    y: f32,
  },
  Line {
    from: (f32, f32),
    to: (f32, f32),
  },
}

pub fn is_visible(score: f32) -> bool {
  score > VISIBILITY_THRESHOLD
}

/// 把一组检测结果换算成 `width x height` 画布上的绘制指令
pub fn plan_overlay(set: &DetectionSet, width: u32, height: u32) -> Vec<DrawOp> {
  let mut ops = Vec::new();
  for detection in set.items() {
    plan_detection(detection, width as f32, height as f32, &mut ops);
  }
  ops
}

fn plan_detection(detection: &Detection, w: f32, h: f32, ops: &mut Vec<DrawOp>) {
  let bbox = &detection.bbox;
  ops.push(DrawOp::Rect {
    x_min: bbox.xmin * w,
    y_min: bbox.ymin * h,
    x_max: bbox.xmax * w,
    y_max: bbox.ymax * h,
  });

  let point = |kind: KeypointKind| {
    let k = detection.keypoint(kind);
    (k.x * w, k.y * h)
  };

  for keypoint in detection.keypoints.iter().filter(|k| is_visible(k.score)) {
    ops.push(DrawOp::Marker {
      x: keypoint.x * w,
      y: keypoint.y * h,
    });
  }

  for (a, b) in SKELETON_EDGES {
    if is_visible(detection.keypoint(a).score) && is_visible(detection.keypoint(b).score) {
      ops.push(DrawOp::Line {
        from: point(a),
        to: point(b),
      });
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, KEYPOINT_COUNT, Keypoint};

  fn person(score: f32) -> Detection {
    Detection {
      confidence: 0.8,
      bbox: BoundingBox {
        ymin: 0.1,
        xmin: 0.2,
        ymax: 0.8,
        xmax: 0.9,
      },
      keypoints: [Keypoint {
        x: 0.5,
        y: 0.25,
        score,
      }; KEYPOINT_COUNT],
    }
  }

  fn count(ops: &[DrawOp]) -> (usize, usize, usize) {
    ops.iter().fold((0, 0, 0), |(r, m, l), op| match op {
      DrawOp::Rect { .. } => (r + 1, m, l),
      DrawOp::Marker { .. } => (r, m + 1, l),
      DrawOp::Line { .. } => (r, m, l + 1),
    })
  }

  #[test]
  fn edge_table_is_sixteen_distinct_undirected_edges() {
    let mut seen = std::collections::HashSet::new();
    for (a, b) in SKELETON_EDGES {
      assert_ne!(a, b);
      let key = (a.index().min(b.index()), a.index().max(b.index()));
      assert!(seen.insert(key));
    }
    assert_eq!(seen.len(), 16);
  }

  #[test]
  fn scales_bbox_by_width_and_height() {
    let set = DetectionSet::new(vec![person(0.9)], 0.3, 1);
    let ops = plan_overlay(&set, 200, 100);
    assert_eq!(
      ops[0],
      DrawOp::Rect {
        x_min: 0.2 * 200.0,
        y_min: 0.1 * 100.0,
        x_max: 0.9 * 200.0,
        y_max: 0.8 * 100.0,
      }
    );
    assert!(ops.contains(&DrawOp::Marker {
      x: 0.5 * 200.0,
      y: 0.25 * 100.0
    }));
    assert_eq!(count(&ops), (1, 17, 16));
  }

  #[test]
  fn edge_needs_both_endpoints_visible() {
    let mut detection = person(0.9);
    detection.keypoints[KeypointKind::LeftKnee.index()].score = 0.3;
    detection.keypoints[KeypointKind::LeftAnkle.index()].score = 0.1;
    let set = DetectionSet::new(vec![detection], 0.3, 1);

    let ops = plan_overlay(&set, 100, 100);
    // 膝-踝这条边不画，其余 15 条都画
    assert_eq!(count(&ops), (1, 16, 15));
  }

  #[test]
  fn visibility_threshold_is_strict() {
    let set = DetectionSet::new(vec![person(VISIBILITY_THRESHOLD)], 0.3, 1);
    assert_eq!(count(&plan_overlay(&set, 10, 10)), (1, 0, 0));
  }
}
