// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 检测模型
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

use std::{
  path::{Path, PathBuf},
  sync::Mutex,
  time::Instant,
};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Value,
};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::LetterboxFrame,
  model::{
    DetectRequest, DetectResult, DetectorConfig, Model, ModelError, check_threshold, decode,
  },
  utils::url_path,
};

pub struct OnnxModel {
  session: Mutex<Session>,
  config: DetectorConfig,
  path: PathBuf,
}

pub struct OnnxModelBuilder {
  model_path: PathBuf,
  config: DetectorConfig,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Self::from_path(url_path(url)))
  }
}

impl OnnxModelBuilder {
  pub fn from_path(path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: path.into(),
      config: DetectorConfig::default(),
    }
  }

  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<OnnxModel, ModelError> {
    self.config.validate()?;

    if !self.model_path.is_file() {
      return Err(ModelError::NotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let size = std::fs::metadata(&self.model_path)?.len();
    debug!("模型文件大小: {:.2} MB", size as f64 / (1024.0 * 1024.0));

    info!("创建 ONNX Runtime 推理会话");
    let builder = Session::builder().map_err(ModelError::runtime)?;

    #[cfg(feature = "cuda")]
    let builder = {
      info!("启用 CUDA 执行后端");
      builder
        .with_execution_providers([CUDAExecutionProvider::default().build()])
        .map_err(ModelError::runtime)?
    };

    let session = builder
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ModelError::runtime)?
      .with_intra_threads(self.config.intra_threads.max(1))
      .map_err(ModelError::runtime)?
      .commit_from_file(&self.model_path)
      .map_err(ModelError::runtime)?;
    info!("模型加载完成");

    Ok(OnnxModel {
      session: Mutex::new(session),
      config: self.config,
      path: self.model_path,
    })
  }
}

impl OnnxModel {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  /// 执行一次推理，返回第一个输出的形状和数据
  fn run(&self, frame: &LetterboxFrame) -> Result<(Vec<usize>, Vec<f32>), ModelError> {
    let shape = frame.shape();
    let input = Value::from_array((shape.as_slice(), frame.as_nchw().to_vec().into_boxed_slice()))
      .map_err(ModelError::runtime)?;

    let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;
    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![input])
      .map_err(ModelError::runtime)?;

    let (output_shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(ModelError::runtime)?;
    let output_shape: Vec<usize> = output_shape.iter().map(|&d| d.max(0) as usize).collect();
    debug!("模型输出形状: {:?}", output_shape);

    Ok((output_shape, data.to_vec()))
  }
}

impl Model for OnnxModel {
  type Input = DetectRequest;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let now = Instant::now();

    let confidence = match input.confidence {
      Some(value) => check_threshold("confidence", value)?,
      None => self.config.confidence,
    };
    let config = DetectorConfig {
      confidence,
      ..self.config.clone()
    };

    let frame = LetterboxFrame::from_image(&input.image, config.input_size)?;
    let (shape, data) = self.run(&frame)?;
    let items = decode(config.layout, &shape, &data, &frame, &config)?;

    let elapsed = now.elapsed();
    debug!("推理完成，耗时: {:.2?}", elapsed);

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      image_width: input.image.width(),
      image_height: input.image.height(),
      elapsed,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_from_url_requires_scheme() {
    let url = Url::parse("image:///tmp/best.onnx").unwrap();
    assert!(matches!(
      OnnxModelBuilder::from_url(&url),
      Err(ModelError::ModelPathError(_))
    ));

    let url = Url::parse("onnx:///models/my%20best.onnx").unwrap();
    let builder = OnnxModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/models/my best.onnx"));
  }

  #[test]
  fn missing_model_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best.onnx");
    let err = OnnxModelBuilder::from_path(&path).build().err().unwrap();
    assert!(matches!(err, ModelError::NotFound(p) if p == path));
  }

  #[test]
  fn invalid_config_is_rejected_before_loading() {
    let config = DetectorConfig {
      confidence: 2.0,
      ..DetectorConfig::default()
    };
    let err = OnnxModelBuilder::from_path("best.onnx")
      .config(config)
      .build()
      .err()
      .unwrap();
    assert!(matches!(err, ModelError::InvalidThreshold { .. }));
  }
}
