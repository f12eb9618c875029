// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 姿态检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut},
  rect::Rect,
};

use crate::{
  frame::Frame,
  model::DetectionSet,
  output::skeleton::{DrawOp, plan_overlay},
};

const BBOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const MARKER_COLOR: [u8; 3] = [255, 0, 0];
const LINE_COLOR: [u8; 3] = [0, 255, 0];
const MARKER_RADIUS: i32 = 4;

pub struct SkeletonDraw {
  bbox_color: Rgb<u8>,
  marker_color: Rgb<u8>,
  line_color: Rgb<u8>,
  marker_radius: i32,
}

impl Default for SkeletonDraw {
  fn default() -> Self {
    Self {
      bbox_color: Rgb(BBOX_COLOR),
      marker_color: Rgb(MARKER_COLOR),
      line_color: Rgb(LINE_COLOR),
      marker_radius: MARKER_RADIUS,
    }
  }
}

impl SkeletonDraw {
  pub fn draw_on_image(&self, image: &mut RgbImage, result: &DetectionSet) {
    let (width, height) = image.dimensions();
    for op in plan_overlay(result, width, height) {
      self.apply(image, op);
    }
  }

  /// 复制帧并在副本上绘制
  pub fn draw_on_frame(&self, frame: &Frame, result: &DetectionSet) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_on_image(&mut image, result);
    image
  }

  fn apply(&self, image: &mut RgbImage, op: DrawOp) {
    match op {
      DrawOp::Rect {
        x_min,
        y_min,
        x_max,
        y_max,
      } => {
        let (x, y) = (x_min.floor() as i32, y_min.floor() as i32);
        let w = (x_max.ceil() as i32 - x).max(0) as u32;
        let h = (y_max.ceil() as i32 - y).max(0) as u32;
        if w == 0 || h == 0 {
          return;
        }
        // 加粗为 2 像素
        draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), self.bbox_color);
        if w > 2 && h > 2 {
          draw_hollow_rect_mut(
            image,
            Rect::at(x + 1, y + 1).of_size(w - 2, h - 2),
            self.bbox_color,
          );
        }
      }
      DrawOp::Marker { x, y } => {
        draw_filled_circle_mut(
          image,
          (x.round() as i32, y.round() as i32),
          self.marker_radius,
          self.marker_color,
        );
      }
      DrawOp::Line { from, to } => {
        draw_line_segment_mut(image, from, to, self.line_color);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, Detection, KEYPOINT_COUNT, Keypoint};

  #[test]
  fn draws_box_and_markers_inside_image() {
    let detection = Detection {
      confidence: 0.9,
      bbox: BoundingBox {
        ymin: 0.25,
        xmin: 0.25,
        ymax: 0.75,
        xmax: 0.75,
      },
      keypoints: [Keypoint {
        x: 0.5,
        y: 0.5,
        score: 0.9,
      }; KEYPOINT_COUNT],
    };
    let set = DetectionSet::new(vec![detection], 0.3, 1);
    let mut image = RgbImage::new(40, 40);

    SkeletonDraw::default().draw_on_image(&mut image, &set);
    assert_eq!(*image.get_pixel(10, 20), Rgb(BBOX_COLOR));
    assert_ne!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
  }

  #[test]
  fn empty_set_leaves_frame_untouched() {
    let frame = Frame::from_packed(3, 3, vec![0xFF11_2233; 9]).unwrap();
    let image = SkeletonDraw::default().draw_on_frame(&frame, &DetectionSet::default());
    assert!(image.pixels().all(|p| *p == Rgb([0x11, 0x22, 0x33])));
  }
}
