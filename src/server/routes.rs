// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/server/routes.rs - HTTP 路由处理
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

use axum::{
  Json,
  extract::{Multipart, State, multipart::MultipartRejection},
};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  model::{DetectResult, Model, WithLabel},
  server::{ApiError, HttpState, UPLOAD_FIELD},
  service::DetectResponse,
};

/// `POST /detect`：读取 `file` 字段的图像并执行检测。
///
/// 请求不是 multipart 表单或缺少 `file` 字段时直接返回 400，不调用模型。推理在阻塞线程池中执行。
pub async fn detect<M>(
  State(st): State<HttpState<M>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError>
where
  M: Model<Input = RgbImage, Output = DetectResult> + WithLabel + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let mut multipart = multipart.map_err(|rejection| {
    warn!("请求不是 multipart 表单: {}", rejection.body_text());
    ApiError::MissingFile
  })?;

  let mut upload = None;
  while let Some(field) = multipart.next_field().await? {
    if field.name() == Some(UPLOAD_FIELD) {
      let file_name = field.file_name().unwrap_or("<unnamed>").to_string();
      let bytes = field.bytes().await?;
      info!("收到上传文件: {} ({} 字节)", file_name, bytes.len());
      upload = Some(bytes);
      break;
    }
    debug!("忽略表单字段: {:?}", field.name());
  }

  let bytes = upload.ok_or(ApiError::MissingFile)?;
  let service = st.service.clone();
  let response = tokio::task::spawn_blocking(move || service.detect(&bytes)).await??;

  Ok(Json(response))
}
