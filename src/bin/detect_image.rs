// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/bin/detect_image.rs - 单张图像检测并保存标注结果
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use xunzheng::{
  FromUrl,
  model::OnnxYoloBuilder,
  output::{DEFAULT_JPEG_QUALITY, encode_jpeg},
  service::{DetectService, ServiceConfig, mean_confidence},
};

/// 单张图像检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URL，格式同 detect-server
  #[arg(
    long,
    value_name = "MODEL",
    default_value = "onnx:runs/detect/train4/weights/best.onnx?names=labels/evidence.txt"
  )]
  pub model: Url,

  /// 输入图像路径
  #[arg(long, default_value = "images.jpg", value_name = "IMAGE")]
  pub input: PathBuf,

  /// 标注结果 JPEG 输出路径
  #[arg(long, default_value = "annotated.jpg", value_name = "OUTPUT")]
  pub output: PathBuf,

  /// JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
  pub jpeg_quality: u8,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入图像: {}", args.input.display());
  info!("输出路径: {}", args.output.display());

  let model = OnnxYoloBuilder::from_url(&args.model)?.build()?;
  let service = DetectService::new(
    model,
    ServiceConfig {
      jpeg_quality: args.jpeg_quality,
    },
  );

  let mut image = image::open(&args.input)
    .with_context(|| format!("无法读取输入图像 {}", args.input.display()))?
    .to_rgb8();

  info!("开始推理...");
  let now = std::time::Instant::now();
  let detections = service.annotate(&mut image)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  for detection in &detections {
    let loc = &detection.location;
    info!(
      "{} {:.2} @ ({}, {}, {}x{})",
      detection.kind, detection.confidence, loc.x, loc.y, loc.width, loc.height
    );
  }
  info!(
    "共 {} 个对象, 平均置信度 {:.2}",
    detections.len(),
    mean_confidence(&detections)
  );

  let jpeg = encode_jpeg(&image, args.jpeg_quality)?;
  std::fs::write(&args.output, jpeg)
    .with_context(|| format!("无法写入输出文件 {}", args.output.display()))?;
  info!("标注结果已保存: {}", args.output.display());

  Ok(())
}
