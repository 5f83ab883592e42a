// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/server.rs - 检测服务 HTTP 接口
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

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, multipart::MultipartError},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::post,
};
use image::RgbImage;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::{
  model::{DetectResult, Model, WithLabel},
  service::{DetectError, DetectService},
};

pub mod routes;

/// 默认请求体上限，16 MiB
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// 上传图像所在的表单字段名
pub const UPLOAD_FIELD: &str = "file";

/// HTTP 处理函数共享的状态，服务启动前构造，之后只读
pub struct HttpState<M> {
  pub service: Arc<DetectService<M>>,
}

impl<M> Clone for HttpState<M> {
  fn clone(&self) -> Self {
    Self {
      service: self.service.clone(),
    }
  }
}

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("No file provided")]
  MissingFile,
  #[error("Invalid multipart body: {}", .0.body_text())]
  Multipart(#[from] MultipartError),
  #[error(transparent)]
  Detect(#[from] DetectError),
  #[error("Detection task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Multipart(e) => e.status(),
      ApiError::MissingFile | ApiError::Detect(DetectError::InvalidImage(_)) => {
        StatusCode::BAD_REQUEST
      }
      ApiError::Detect(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("请求处理失败: {}", self);
    } else {
      warn!("请求无效: {}", self);
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

pub fn router<M>(service: Arc<DetectService<M>>, body_limit: usize) -> Router
where
  M: Model<Input = RgbImage, Output = DetectResult> + WithLabel + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    .route("/detect", post(routes::detect::<M>))
    .layer(DefaultBodyLimit::max(body_limit))
    .layer(CorsLayer::permissive())
    .with_state(HttpState { service })
}
