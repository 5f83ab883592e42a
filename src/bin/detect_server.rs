// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/bin/detect_server.rs - 检测服务入口
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

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use xunzheng::{
  FromUrl,
  model::OnnxYoloBuilder,
  output::DEFAULT_JPEG_QUALITY,
  server::{DEFAULT_BODY_LIMIT, router},
  service::{DetectService, ServiceConfig},
};

/// 检测服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URL，例如 onnx:runs/best.onnx?imgsz=640&names=labels/evidence.txt&conf=0.25&iou=0.45
  #[arg(
    long,
    value_name = "MODEL",
    default_value = "onnx:runs/detect/train4/weights/best.onnx?names=labels/evidence.txt"
  )]
  pub model: Url,

  /// 监听地址
  #[arg(long, default_value = "127.0.0.1:5000", value_name = "ADDR")]
  pub bind: SocketAddr,

  /// 标注图像的 JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
  pub jpeg_quality: u8,

  /// 请求体大小上限（字节）
  #[arg(long, default_value_t = DEFAULT_BODY_LIMIT, value_name = "BYTES")]
  pub body_limit: usize,
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!("无法监听中断信号: {}", e);
    return;
  }
  info!("收到中断信号，准备退出...");
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("监听地址: {}", args.bind);
  info!("JPEG 质量: {}", args.jpeg_quality);

  // 模型只在启动时加载一次，之后只读
  info!("正在加载模型...");
  let model = OnnxYoloBuilder::from_url(&args.model)?.build()?;
  let service = Arc::new(DetectService::new(
    model,
    ServiceConfig {
      jpeg_quality: args.jpeg_quality,
    },
  ));

  let app = router(service, args.body_limit);

  let listener = tokio::net::TcpListener::bind(args.bind).await?;
  info!("检测服务已启动: http://{}/detect", listener.local_addr()?);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已停止");
  Ok(())
}
