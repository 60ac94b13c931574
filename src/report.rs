// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/report.rs - 检测结果报告
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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  label::label_name,
  model::{DetectItem, DetectResult},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub class_id: u32,
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

impl From<&DetectItem> for Detection {
  fn from(item: &DetectItem) -> Self {
    let [x_min, y_min, x_max, y_max] = item.bbox;
    Self {
      class_id: item.class_id,
      class_name: label_name(item.class_id),
      confidence: item.score,
      bbox: BoundingBox {
        x_min,
        y_min,
        x_max,
        y_max,
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCount {
  pub class_id: u32,
  pub class_name: String,
  pub count: usize,
}

/// 统计信息：总数、平均置信度、类别数、各类别数量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  pub total: usize,
  pub mean_confidence: f32,
  pub distinct_classes: usize,
  pub per_class: Vec<ClassCount>,
}

impl Summary {
  pub fn from_items(items: &[DetectItem]) -> Self {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for item in items {
      *counts.entry(item.class_id).or_default() += 1;
    }

    let mut per_class: Vec<ClassCount> = counts
      .into_iter()
      .map(|(class_id, count)| ClassCount {
        class_id,
        class_name: label_name(class_id),
        count,
      })
      .collect();
    // 数量降序，数量相同按类别编号
    per_class.sort_by(|a, b| b.count.cmp(&a.count).then(a.class_id.cmp(&b.class_id)));

    let mean_confidence = if items.is_empty() {
      0.0
    } else {
      items.iter().map(|item| item.score).sum::<f32>() / items.len() as f32
    };

    Self {
      total: items.len(),
      mean_confidence,
      distinct_classes: per_class.len(),
      per_class,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
  pub width: u32,
  pub height: u32,
}

/// `/predict` 的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
  pub detections: Vec<Detection>,
  pub count: usize,
  pub model: String,
  pub summary: Summary,
  pub image: ImageSize,
  pub elapsed_ms: f64,
}

impl PredictResponse {
  pub fn new(result: &DetectResult, model: &str) -> Self {
    Self {
      detections: result.items.iter().map(Detection::from).collect(),
      count: result.len(),
      model: model.to_string(),
      summary: Summary::from_items(&result.items),
      image: ImageSize {
        width: result.image_width,
        height: result.image_height,
      },
      elapsed_ms: result.elapsed.as_micros() as f64 / 1000.0,
    }
  }
}

/// 批量检测时每张图像的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReport {
  pub name: String,
  pub index: u64,
  pub image: ImageSize,
  pub detections: Vec<Detection>,
  pub summary: Summary,
}

impl ImageReport {
  pub fn new(name: &str, index: u64, result: &DetectResult) -> Self {
    Self {
      name: name.to_string(),
      index,
      image: ImageSize {
        width: result.image_width,
        height: result.image_height,
      },
      detections: result.items.iter().map(Detection::from).collect(),
      summary: Summary::from_items(&result.items),
    }
  }
}
