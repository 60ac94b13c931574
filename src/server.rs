// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/server.rs - HTTP 检测服务
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

//! 基于 axum 的车辆检测 HTTP 服务。
//!
//! | 方法 | 路径             | 说明                          |
//! |------|------------------|-------------------------------|
//! | GET  | `/`              | 网页界面                      |
//! | GET  | `/health`        | 服务状态与模型是否加载        |
//! | GET  | `/labels`        | 类别表                        |
//! | POST | `/predict`       | 上传图像，返回 JSON 检测结果  |
//! | POST | `/predict/image` | 上传图像，返回标注后的 PNG    |

use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};
use tracing::{error, info};

use crate::{
  model::{DetectRequest, DetectResult, DetectorConfig, Model, ModelError},
  output::draw::Draw,
};

mod handler;

pub use self::handler::{ApiError, HealthResponse, LabelEntry};

/// 上传大小上限 16 MiB
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// 响应中的模型名称
pub const DEFAULT_MODEL_NAME: &str = "Vehicle Detection Model";

/// 服务可使用的检测模型
pub trait DetectModel:
  Model<Input = DetectRequest, Output = DetectResult, Error = ModelError> + Send + Sync + 'static
{
}

impl<T> DetectModel for T where
  T: Model<Input = DetectRequest, Output = DetectResult, Error = ModelError> + Send + Sync + 'static
{
}

/// 处理函数共享的状态。模型加载失败时 `model` 为空，服务仍然启动。
pub struct AppState<M> {
  pub model: Option<M>,
  pub model_path: PathBuf,
  pub model_name: String,
  pub default_confidence: f32,
  pub draw: Draw,
}

impl<M> AppState<M> {
  pub fn new(model: Option<M>, model_path: impl Into<PathBuf>) -> Self {
    Self {
      model,
      model_path: model_path.into(),
      model_name: DEFAULT_MODEL_NAME.to_string(),
      default_confidence: DetectorConfig::default().confidence,
      draw: Draw::default(),
    }
  }

  pub fn with_default_confidence(mut self, confidence: f32) -> Self {
    self.default_confidence = confidence;
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
    self.model_name = name.into();
    self
  }

  pub fn model_loaded(&self) -> bool {
    self.model.is_some()
  }
}

#[derive(Error, Debug)]
pub enum ServerError {
  #[error("无法绑定地址 {addr}: {source}")]
  Bind {
    addr: String,
    #[source]
    source: std::io::Error,
  },
  #[error("服务运行错误: {0}")]
  Serve(#[source] std::io::Error),
}

pub fn router<M: DetectModel>(state: Arc<AppState<M>>) -> Router {
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

  Router::new()
    .route("/", get(handler::index::<M>))
    .route("/health", get(handler::health::<M>))
    .route("/labels", get(handler::labels))
    .route("/predict", post(handler::predict::<M>))
    .route("/predict/image", post(handler::predict_image::<M>))
    .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
  TcpListener::bind((host, port))
    .await
    .map_err(|source| ServerError::Bind {
      addr: format!("{}:{}", host, port),
      source,
    })
}

/// 在给定的监听器上运行服务，直到 `shutdown` 完成
pub async fn serve<M, F>(
  state: Arc<AppState<M>>,
  listener: TcpListener,
  shutdown: F,
) -> Result<(), ServerError>
where
  M: DetectModel,
  F: Future<Output = ()> + Send + 'static,
{
  if let Ok(addr) = listener.local_addr() {
    info!("服务监听于 http://{}", addr);
  }

  axum::serve(listener, router(state))
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(ServerError::Serve)
}

/// 在后台启动服务，返回实际绑定的地址（端口为 0 时由系统分配）
pub async fn start_server<M: DetectModel>(
  state: Arc<AppState<M>>,
  host: &str,
  port: u16,
) -> Result<SocketAddr, ServerError> {
  let listener = bind(host, port).await?;
  let addr = listener.local_addr().map_err(ServerError::Serve)?;

  tokio::spawn(async move {
    if let Err(err) = serve(state, listener, std::future::pending()).await {
      error!("{}", err);
    }
  });

  Ok(addr)
}

/// 等待 Ctrl-C
pub async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到退出信号，正在关闭服务"),
    Err(err) => error!("无法监听退出信号: {}", err),
  }
}
