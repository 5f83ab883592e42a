// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};

use crate::service::{Detection, Location};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

/// 标签文本：类别名 + 整数百分比置信度，百分比向下取整
pub fn label_text(label: &str, confidence: f32) -> String {
  format!("{} {}%", label, (confidence * 100.0) as u32)
}

pub struct Draw<'a> {
  font_size: f32,
  label_text_height: i32,
  thickness: i32,
  font: FontRef<'a>,
  box_color: [u8; 3],
  label_color: [u8; 3],
}

impl<'a> Default for Draw<'a> {
  fn default() -> Self {
    let font_data = include_bytes!("../../assets/font.ttf"); // default font
    let font = FontRef::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      thickness: BOX_THICKNESS,
      box_color: BOX_COLOR,
      label_color: LABEL_COLOR,
      font,
    }
  }
}

impl<'a> Draw<'a> {
  /// 在图像上绘制矩形边框及其上方的标签，坐标为像素坐标，超出图像的部分被裁剪
  fn draw_bbox_with_label(&self, image: &mut RgbImage, location: &Location, label: &str) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = location.x.clamp(0, w - 1);
    let y_min = location.y.clamp(0, h - 1);
    let x_max = location.x.saturating_add(location.width).clamp(0, w - 1);
    let y_max = location.y.saturating_add(location.height).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框向内加粗
    for t in 0..self.thickness {
      let rect_w = x_max - x_min - 2 * t + 1;
      let rect_h = y_max - y_min - 2 * t + 1;
      if rect_w <= 0 || rect_h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(rect_w as u32, rect_h as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }

    // 标签位于边框上方，空间不足时贴住图像上沿
    let label_y = (y_min - self.label_text_height).max(0);
    draw_text_mut(
      image,
      Rgb(self.label_color),
      x_min,
      label_y,
      PxScale::from(self.font_size),
      &self.font,
      label,
    );
  }
}

pub trait DrawDetectionOnImage {
  fn draw_detections_on_image(&self, image: &mut RgbImage, detections: &[Detection]);
}

impl DrawDetectionOnImage for Draw<'_> {
  fn draw_detections_on_image(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      let label = label_text(&detection.kind, detection.confidence);
      self.draw_bbox_with_label(image, &detection.location, &label);
    }
  }
}
