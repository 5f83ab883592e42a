// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/service.rs - 检测服务：过滤、标注与结果汇总
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

use std::time::{Duration, Instant};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  model::{DetectItem, DetectResult, Model, WithLabel},
  output::{DEFAULT_JPEG_QUALITY, Draw, DrawDetectionOnImage, EncodeError, encode_jpeg_base64},
};

/// 上报检测结果的最低置信度，低于该值的候选框被丢弃
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// 原点 + 宽高形式的边界框，像素单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  #[serde(rename = "type")]
  pub kind: String,
  pub confidence: f32,
  pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
  /// base64 编码的标注后 JPEG 图像
  pub image: String,
  pub detections: Vec<Detection>,
  pub detection_count: usize,
  /// 所有保留结果置信度的算术平均，没有结果时为 0
  pub confidence: f32,
  /// 实测耗时，例如 "118ms"
  pub processing_time: String,
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("无法解码图像: {0}")]
  InvalidImage(#[source] image::ImageError),
  #[error("检测模型调用失败: {0}")]
  Model(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("标注图像编码失败: {0}")]
  Encode(#[from] EncodeError),
}

/// 角点形式 `(x1, y1, x2, y2)` 转换为原点 + 宽高形式，坐标按整数截断
pub fn to_detection(item: &DetectItem, label: String) -> Detection {
  let [x1, y1, x2, y2] = item.bbox.map(|v| v as i32);
  Detection {
    kind: label,
    confidence: item.score,
    location: Location {
      x: x1,
      y: y1,
      width: x2.saturating_sub(x1),
      height: y2.saturating_sub(y1),
    },
  }
}

/// 丢弃置信度低于 [`CONFIDENCE_THRESHOLD`] 的候选框，其余解析类别名并转换坐标
pub fn filter_candidates<L: WithLabel + ?Sized>(items: &[DetectItem], labels: &L) -> Vec<Detection> {
  items
    .iter()
    .filter(|item| item.score >= CONFIDENCE_THRESHOLD)
    .map(|item| to_detection(item, labels.label_for(item.class_id)))
    .collect()
}

pub fn mean_confidence(detections: &[Detection]) -> f32 {
  if detections.is_empty() {
    return 0.0;
  }
  let sum: f64 = detections.iter().map(|d| d.confidence as f64).sum();
  (sum / detections.len() as f64) as f32
}

fn format_processing_time(elapsed: Duration) -> String {
  format!("{}ms", elapsed.as_millis())
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
  pub jpeg_quality: u8,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      jpeg_quality: DEFAULT_JPEG_QUALITY,
    }
  }
}

/// 检测服务。模型在构造时注入，此后只读。
pub struct DetectService<M> {
  model: M,
  draw: Draw<'static>,
  config: ServiceConfig,
}

impl<M> DetectService<M>
where
  M: Model<Input = RgbImage, Output = DetectResult> + WithLabel,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(model: M, config: ServiceConfig) -> Self {
    Self {
      model,
      draw: Draw::default(),
      config,
    }
  }

  /// 对已解码的图像执行检测，并把保留的结果绘制到图像上
  pub fn annotate(&self, image: &mut RgbImage) -> Result<Vec<Detection>, DetectError> {
    let result = self
      .model
      .infer(image)
      .map_err(|e| DetectError::Model(Box::new(e)))?;
    let detections = filter_candidates(&result.items, &self.model);
    debug!(
      "候选框 {} 个, 置信度过滤后 {} 个",
      result.len(),
      detections.len()
    );

    self.draw.draw_detections_on_image(image, &detections);
    Ok(detections)
  }

  pub fn detect(&self, bytes: &[u8]) -> Result<DetectResponse, DetectError> {
    let started = Instant::now();

    let mut image = image::load_from_memory(bytes)
      .map_err(DetectError::InvalidImage)?
      .to_rgb8();
    debug!("图像解码完成: {}x{}", image.width(), image.height());

    let detections = self.annotate(&mut image)?;
    let encoded = encode_jpeg_base64(&image, self.config.jpeg_quality)?;

    let confidence = mean_confidence(&detections);
    let processing_time = format_processing_time(started.elapsed());
    info!(
      "检测完成: {} 个对象, 平均置信度 {:.2}, 耗时 {}",
      detections.len(),
      confidence,
      processing_time
    );

    Ok(DetectResponse {
      image: encoded,
      detection_count: detections.len(),
      detections,
      confidence,
      processing_time,
    })
  }
}
