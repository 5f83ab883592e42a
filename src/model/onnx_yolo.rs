// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/model/onnx_yolo.rs - ONNX YOLO 检测模型
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

use std::{path::PathBuf, sync::Mutex};

use image::{RgbImage, imageops::FilterType};
use ndarray::{ArrayViewD, Axis, IxDyn};
use ort::{session::Session, value::Tensor};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassNames, DetectItem, DetectResult, Model, WithLabel, nms},
};

const ONNX_YOLO_INPUT_SIZE: u32 = 640;
const ONNX_YOLO_CONF_THRESH: f32 = 0.25;
const ONNX_YOLO_IOU_THRESH: f32 = 0.45;
const ONNX_YOLO_BOX_FIELDS: usize = 4;

#[derive(Error, Debug)]
pub enum OnnxYoloError {
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
  #[error("类别文件读取错误 {path}: {source}")]
  NamesLoadError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("输出张量形状错误: {0}")]
  Shape(#[from] ndarray::ShapeError),
  #[error("模型输出维度不符合 [1, 4+nc, N]: {0:?}")]
  UnexpectedOutput(Vec<usize>),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型参数无效: {0}")]
  InvalidParam(String),
  #[error("推理会话锁已失效")]
  Poisoned,
}

/// 由 `onnx:` URL 描述的 YOLO 模型配置，例如
/// `onnx:runs/detect/train4/weights/best.onnx?imgsz=640&names=labels/evidence.txt`
#[derive(Debug, Clone)]
pub struct OnnxYoloBuilder {
  model_path: PathBuf,
  names_path: Option<PathBuf>,
  input_size: u32,
  conf_threshold: f32,
  iou_threshold: f32,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxYoloBuilder {
  const SCHEME: &'static str = "onnx";
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, OnnxYoloError> {
  value
    .parse()
    .map_err(|_| OnnxYoloError::InvalidParam(format!("{}={}", key, value)))
}

impl FromUrl for OnnxYoloBuilder {
  type Error = OnnxYoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxYoloError::SchemeMismatch(format!(
        "期望模型方案 '{}', 实际方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| OnnxYoloError::InvalidParam(format!("模型路径编码错误: {}", e)))?;
    if path.is_empty() {
      return Err(OnnxYoloError::InvalidParam("模型路径为空".to_string()));
    }

    let mut builder = OnnxYoloBuilder {
      model_path: PathBuf::from(path.as_ref()),
      names_path: None,
      input_size: ONNX_YOLO_INPUT_SIZE,
      conf_threshold: ONNX_YOLO_CONF_THRESH,
      iou_threshold: ONNX_YOLO_IOU_THRESH,
      intra_threads: None,
    };

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "imgsz" => builder.input_size = parse_param(&key, &value)?,
        "names" => builder.names_path = Some(PathBuf::from(value.as_ref())),
        "conf" => builder.conf_threshold = parse_param(&key, &value)?,
        "iou" => builder.iou_threshold = parse_param(&key, &value)?,
        "threads" => builder.intra_threads = Some(parse_param(&key, &value)?),
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    if builder.input_size == 0 {
      return Err(OnnxYoloError::InvalidParam("imgsz 必须大于 0".to_string()));
    }
    for (name, value) in [
      ("conf", builder.conf_threshold),
      ("iou", builder.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(OnnxYoloError::InvalidParam(format!(
          "{} 必须在 0.0 - 1.0 之间, 实际为 {}",
          name, value
        )));
      }
    }

    Ok(builder)
  }
}

impl OnnxYoloBuilder {
  pub fn names(mut self, path: impl Into<PathBuf>) -> Self {
    self.names_path = Some(path.into());
    self
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn conf_threshold(mut self, threshold: f32) -> Self {
    self.conf_threshold = threshold;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn build(self) -> Result<OnnxYolo, OnnxYoloError> {
    info!("加载模型文件: {}", self.model_path.display());
    let mut session_builder = Session::builder()?;
    if let Some(threads) = self.intra_threads {
      session_builder = session_builder.with_intra_threads(threads)?;
    }
    let session = session_builder.commit_from_file(&self.model_path)?;
    info!("模型加载完成");

    let names = match &self.names_path {
      Some(path) => {
        ClassNames::from_file(path).map_err(|source| OnnxYoloError::NamesLoadError {
          path: path.clone(),
          source,
        })?
      }
      None => {
        warn!("未指定类别文件，类别名称将显示为 class<N>");
        ClassNames::default()
      }
    };
    debug!("类别数量: {}", names.len());

    Ok(OnnxYolo {
      session: Mutex::new(session),
      names,
      input_size: self.input_size,
      conf_threshold: self.conf_threshold,
      iou_threshold: self.iou_threshold,
    })
  }
}

/// 加载后只读的 YOLO 模型。ONNX 会话运行需要独占访问，因此由互斥锁保护。
pub struct OnnxYolo {
  session: Mutex<Session>,
  names: ClassNames,
  input_size: u32,
  conf_threshold: f32,
  iou_threshold: f32,
}

impl OnnxYolo {
  /// 缩放到 `input_size`，归一化为 `[0, 1]` 的 NCHW 张量
  fn preprocess(&self, image: &RgbImage) -> Result<Tensor<f32>, OnnxYoloError> {
    let size = self.input_size;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

    let plane = (size as usize) * (size as usize);
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y as usize) * (size as usize) + (x as usize);
      for c in 0..3 {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    let shape = vec![1i64, 3, size as i64, size as i64];
    Ok(Tensor::from_array((shape, data))?)
  }
}

/// 解码 `[1, 4+nc, N]` 输出（中心点 + 宽高），坐标映射回原图像素
fn decode_output(
  output: ArrayViewD<'_, f32>,
  scale: (f32, f32),
  bounds: (f32, f32),
  conf_threshold: f32,
) -> Result<Vec<DetectItem>, OnnxYoloError> {
  let shape = output.shape().to_vec();
  if shape.len() != 3 || shape[0] != 1 || shape[1] <= ONNX_YOLO_BOX_FIELDS {
    return Err(OnnxYoloError::UnexpectedOutput(shape));
  }

  let pred = output.index_axis(Axis(0), 0);
  let (fields, num_candidates) = (shape[1], shape[2]);
  let (sx, sy) = scale;
  let (max_x, max_y) = bounds;

  let mut items = Vec::new();
  for i in 0..num_candidates {
    let (class_id, score) = (ONNX_YOLO_BOX_FIELDS..fields)
      .map(|f| (f - ONNX_YOLO_BOX_FIELDS, pred[[f, i]]))
      .fold((0usize, f32::MIN), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    if score < conf_threshold {
      continue;
    }

    let cx = pred[[0, i]];
    let cy = pred[[1, i]];
    let w = pred[[2, i]];
    let h = pred[[3, i]];

    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: [
        ((cx - w / 2.0) * sx).clamp(0.0, max_x),
        ((cy - h / 2.0) * sy).clamp(0.0, max_y),
        ((cx + w / 2.0) * sx).clamp(0.0, max_x),
        ((cy + h / 2.0) * sy).clamp(0.0, max_y),
      ],
    });
  }

  Ok(items)
}

impl Model for OnnxYolo {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = OnnxYoloError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor = self.preprocess(input)?;

    let (width, height) = (input.width() as f32, input.height() as f32);
    let scale = (
      width / self.input_size as f32,
      height / self.input_size as f32,
    );

    let items = {
      let mut session = self.session.lock().map_err(|_| OnnxYoloError::Poisoned)?;
      debug!("执行模型推理");
      let outputs = session.run(ort::inputs![tensor])?;
      let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
      let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
      let view = ArrayViewD::from_shape(IxDyn(&dims), data)?;
      decode_output(view, scale, (width, height), self.conf_threshold)?
    };

    let candidates = items.len();
    let items = nms(items, self.iou_threshold);
    debug!("候选框 {} 个, NMS 后 {} 个", candidates, items.len());

    Ok(DetectResult::from(items))
  }
}

impl WithLabel for OnnxYolo {
  fn label_for(&self, class_id: u32) -> String {
    self.names.label_for(class_id)
  }
}
