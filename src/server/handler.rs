// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/server/handler.rs - HTTP 请求处理
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
  Json,
  body::Bytes,
  extract::{
    Multipart, State,
    multipart::{MultipartError, MultipartRejection},
  },
  http::{StatusCode, header},
  response::{Html, IntoResponse, Response},
};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  input::{InputError, decode_image_bytes},
  label::{VehicleLabel, WithLabel},
  model::{DetectRequest, DetectResult, ModelError, check_threshold},
  output::{OutputError, encode_png},
  report::PredictResponse,
  server::{AppState, DetectModel},
};

const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("No file provided")]
  NoFile,
  #[error("Model not loaded")]
  ModelNotLoaded,
  #[error("File too large, the upload limit is 16 MiB")]
  PayloadTooLarge,
  #[error("{0}")]
  BadRequest(String),
  #[error(transparent)]
  Input(#[from] InputError),
  #[error(transparent)]
  Model(#[from] ModelError),
  #[error(transparent)]
  Output(#[from] OutputError),
  #[error("推理任务异常退出: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NoFile | ApiError::BadRequest(_) | ApiError::Input(_) => StatusCode::BAD_REQUEST,
      ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::Model(ModelError::InvalidThreshold { .. } | ModelError::Frame(_)) => {
        StatusCode::BAD_REQUEST
      }
      ApiError::ModelNotLoaded | ApiError::Model(_) | ApiError::Output(_) | ApiError::Join(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("请求失败: {}", self);
    } else {
      warn!("请求无效: {}", self);
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
  pub status: String,
  pub model_loaded: bool,
  pub model_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
  pub id: u32,
  pub name: String,
}

/// 上传的表单：`file` 图像和可选的 `conf` 置信度阈值
struct Upload {
  file: Bytes,
  confidence: Option<f32>,
}

impl From<MultipartError> for ApiError {
  fn from(err: MultipartError) -> Self {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
      ApiError::PayloadTooLarge
    } else {
      ApiError::BadRequest(err.body_text())
    }
  }
}

fn parse_confidence(text: &str) -> Result<Option<f32>, ApiError> {
  let text = text.trim();
  if text.is_empty() {
    return Ok(None);
  }
  let value = text
    .parse::<f32>()
    .map_err(|_| ApiError::BadRequest(format!("Invalid confidence value: {}", text)))?;
  Ok(Some(check_threshold("conf", value)?))
}

async fn read_upload(
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, ApiError> {
  let mut multipart = multipart.map_err(|err| {
    debug!("请求不是 multipart 表单: {}", err);
    ApiError::NoFile
  })?;

  let mut file = None;
  let mut confidence = None;

  while let Some(field) = multipart.next_field().await? {
    let name = field.name().unwrap_or_default().to_string();
    match name.as_str() {
      "file" => {
        let bytes = field.bytes().await?;
        debug!("收到上传文件，{} 字节", bytes.len());
        file = Some(bytes);
      }
      "conf" => {
        let text = field.text().await?;
        confidence = parse_confidence(&text)?;
      }
      other => debug!("忽略表单字段: {}", other),
    }
  }

  Ok(Upload {
    file: file.ok_or(ApiError::NoFile)?,
    confidence,
  })
}

/// 在阻塞线程池上解码并推理，返回结果和解码后的图像
async fn run_detection<M: DetectModel>(
  state: Arc<AppState<M>>,
  upload: Upload,
) -> Result<(DetectResult, RgbImage), ApiError> {
  let confidence = upload.confidence.unwrap_or(state.default_confidence);

  tokio::task::spawn_blocking(move || -> Result<(DetectResult, RgbImage), ApiError> {
    let model = state.model.as_ref().ok_or(ApiError::ModelNotLoaded)?;
    let image = decode_image_bytes(&upload.file)?;
    let request = DetectRequest::new(image).with_confidence(Some(confidence));
    let result = model.infer(&request)?;
    info!(
      "检测到 {} 个目标（阈值 {:.2}），耗时 {:.2?}",
      result.len(),
      confidence,
      result.elapsed
    );
    Ok((result, request.image))
  })
  .await?
}

pub async fn index<M: DetectModel>(State(state): State<Arc<AppState<M>>>) -> Html<String> {
  Html(INDEX_HTML.replace(
    "{{DEFAULT_CONFIDENCE}}",
    &format!("{:.2}", state.default_confidence),
  ))
}

pub async fn health<M: DetectModel>(State(state): State<Arc<AppState<M>>>) -> Json<HealthResponse> {
  Json(HealthResponse {
    status: "ok".to_string(),
    model_loaded: state.model_loaded(),
    model_path: state.model_path.display().to_string(),
  })
}

pub async fn labels() -> Json<Vec<LabelEntry>> {
  Json(
    VehicleLabel::ALL
      .iter()
      .map(|label| LabelEntry {
        id: label.to_label_id(),
        name: label.to_label_str(),
      })
      .collect(),
  )
}

pub async fn predict<M: DetectModel>(
  State(state): State<Arc<AppState<M>>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
  if !state.model_loaded() {
    return Err(ApiError::ModelNotLoaded);
  }

  let upload = read_upload(multipart).await?;
  let (result, _) = run_detection(state.clone(), upload).await?;
  Ok(Json(PredictResponse::new(&result, &state.model_name)))
}

pub async fn predict_image<M: DetectModel>(
  State(state): State<Arc<AppState<M>>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
  if !state.model_loaded() {
    return Err(ApiError::ModelNotLoaded);
  }

  let upload = read_upload(multipart).await?;
  let (result, image) = run_detection(state.clone(), upload).await?;

  let png = tokio::task::spawn_blocking(move || {
    let annotated = state.draw.annotate(&image, &result);
    encode_png(&annotated)
  })
  .await??;

  Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
