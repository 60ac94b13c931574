// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/model.rs - 模型
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

use std::{path::PathBuf, time::Duration};

use image::RgbImage;
use thiserror::Error;

use crate::{frame::FrameError, label::label_name};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

impl DetectItem {
  pub fn label(&self) -> String {
    label_name(self.class_id)
  }

  pub fn width(&self) -> f32 {
    (self.bbox[2] - self.bbox[0]).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.bbox[3] - self.bbox[1]).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  pub image_width: u32,
  pub image_height: u32,
  pub elapsed: Duration,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

/// 单次推理请求，`confidence` 为空时使用模型配置的阈值
#[derive(Debug, Clone)]
pub struct DetectRequest {
  pub image: RgbImage,
  pub confidence: Option<f32>,
}

impl DetectRequest {
  pub fn new(image: RgbImage) -> Self {
    Self {
      image,
      confidence: None,
    }
  }

  pub fn with_confidence(mut self, confidence: Option<f32>) -> Self {
    self.confidence = confidence;
    self
  }
}

/// 模型输出张量的排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputLayout {
  /// 根据输出形状自动判断
  #[default]
  Auto,
  /// [1, 4 + nc, N]，画布像素坐标的 cx/cy/w/h 加类别分数，需要 NMS
  Yolov8,
  /// [1, N, 4 + nc]，归一化的 cx/cy/w/h 加类别分数
  RtDetr,
  /// [1, N, 6]，画布像素坐标的 x1/y1/x2/y2、分数、类别
  #[value(name = "end2end")]
  End2End,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
  pub input_size: u32,
  pub confidence: f32,
  pub iou_threshold: f32,
  pub max_detections: usize,
  pub layout: OutputLayout,
  pub intra_threads: usize,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      input_size: crate::frame::DEFAULT_INPUT_SIZE,
      confidence: 0.5,
      iou_threshold: 0.7,
      max_detections: 300,
      layout: OutputLayout::Auto,
      intra_threads: 4,
    }
  }
}

impl DetectorConfig {
  pub fn validate(&self) -> Result<(), ModelError> {
    check_threshold("confidence", self.confidence)?;
    check_threshold("iou", self.iou_threshold)?;
    if self.input_size == 0 {
      return Err(ModelError::Frame(FrameError::InvalidInputSize(0)));
    }
    Ok(())
  }
}

/// 阈值必须是 [0, 1] 区间内的有限数
pub fn check_threshold(name: &'static str, value: f32) -> Result<f32, ModelError> {
  if value.is_finite() && (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(ModelError::InvalidThreshold { name, value })
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(String),
  #[error("无法识别的输出形状: {0:?}")]
  UnexpectedShape(Vec<usize>),
  #[error("阈值 {name} 无效: {value}，应在 0 到 1 之间")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("预处理错误: {0}")]
  Frame(#[from] FrameError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理会话锁已失效")]
  Poisoned,
}

impl ModelError {
  pub fn runtime<E: std::fmt::Display>(err: E) -> Self {
    ModelError::Runtime(err.to_string())
  }
}

mod decode;
mod onnx;

pub use self::decode::{ResolvedLayout, decode, iou, nms, resolve_layout};
pub use self::onnx::{OnnxModel, OnnxModelBuilder};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn threshold_bounds() {
    assert_eq!(check_threshold("confidence", 0.0).unwrap(), 0.0);
    assert_eq!(check_threshold("confidence", 1.0).unwrap(), 1.0);
    assert!(check_threshold("confidence", 1.5).is_err());
    assert!(check_threshold("confidence", -0.1).is_err());
    assert!(check_threshold("confidence", f32::NAN).is_err());
  }

  #[test]
  fn default_config_is_valid() {
    let config = DetectorConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.input_size, 640);
    assert_eq!(config.confidence, 0.5);
    assert_eq!(config.iou_threshold, 0.7);
  }

  #[test]
  fn detect_item_geometry() {
    let item = DetectItem {
      class_id: 1,
      score: 0.9,
      bbox: [10.0, 20.0, 30.0, 60.0],
    };
    assert_eq!(item.width(), 20.0);
    assert_eq!(item.height(), 40.0);
    assert_eq!(item.area(), 800.0);
    assert_eq!(item.label(), "Car");
  }
}
