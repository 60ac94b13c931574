// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/model/decode.rs - 检测输出解码与 NMS
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

use tracing::{debug, error};

use crate::{
  frame::LetterboxFrame,
  model::{DetectItem, DetectorConfig, ModelError, OutputLayout},
};

const BOX_DIMS: usize = 4;
const END2END_ROW: usize = 6;

/// 确定了维度的输出排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedLayout {
  Yolov8 { classes: usize, anchors: usize },
  RtDetr { queries: usize, classes: usize },
  End2End { rows: usize },
}

impl ResolvedLayout {
  fn needs_nms(&self) -> bool {
    matches!(self, ResolvedLayout::Yolov8 { .. })
  }
}

/// 去掉批次维度后，根据形状确定输出排列
pub fn resolve_layout(layout: OutputLayout, shape: &[usize]) -> Result<ResolvedLayout, ModelError> {
  let (a, b) = match shape {
    [1, a, b] | [a, b] => (*a, *b),
    _ => return Err(ModelError::UnexpectedShape(shape.to_vec())),
  };

  let layout = match layout {
    OutputLayout::Auto if b == END2END_ROW => OutputLayout::End2End,
    OutputLayout::Auto if a < b => OutputLayout::Yolov8,
    OutputLayout::Auto => OutputLayout::RtDetr,
    explicit => explicit,
  };

  let resolved = match layout {
    OutputLayout::Yolov8 if a > BOX_DIMS => ResolvedLayout::Yolov8 {
      classes: a - BOX_DIMS,
      anchors: b,
    },
    OutputLayout::RtDetr if b > BOX_DIMS => ResolvedLayout::RtDetr {
      queries: a,
      classes: b - BOX_DIMS,
    },
    OutputLayout::End2End if b == END2END_ROW => ResolvedLayout::End2End { rows: a },
    _ => {
      error!("输出形状 {:?} 与排列 {:?} 不匹配", shape, layout);
      return Err(ModelError::UnexpectedShape(shape.to_vec()));
    }
  };

  debug!("输出排列: {:?}", resolved);
  Ok(resolved)
}

/// 返回最大分数及其类别
fn best_class(scores: impl Iterator<Item = f32>) -> (f32, u32) {
  let mut max_score = f32::MIN;
  let mut class_id = 0u32;
  for (c, score) in scores.enumerate() {
    if score > max_score {
      max_score = score;
      class_id = c as u32;
    }
  }
  (max_score, class_id)
}

fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
  [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// 解码模型输出，结果为原图像素坐标并按分数降序排列
pub fn decode(
  layout: OutputLayout,
  shape: &[usize],
  data: &[f32],
  frame: &LetterboxFrame,
  config: &DetectorConfig,
) -> Result<Vec<DetectItem>, ModelError> {
  let resolved = resolve_layout(layout, shape)?;
  let expected: usize = shape.iter().product();
  if data.len() != expected {
    error!("输出数据长度 {} 与形状 {:?} 不符", data.len(), shape);
    return Err(ModelError::UnexpectedShape(shape.to_vec()));
  }

  let threshold = config.confidence;
  let size = frame.input_size() as f32;
  let mut items = Vec::new();

  match resolved {
    ResolvedLayout::Yolov8 { classes, anchors } => {
      for i in 0..anchors {
        let (score, class_id) =
          best_class((0..classes).map(|c| data[(BOX_DIMS + c) * anchors + i]));
        if score <= threshold {
          continue;
        }
        let bbox = cxcywh_to_xyxy(
          data[i],
          data[anchors + i],
          data[2 * anchors + i],
          data[3 * anchors + i],
        );
        items.push(DetectItem {
          class_id,
          score,
          bbox,
        });
      }
    }
    ResolvedLayout::RtDetr { queries, classes } => {
      let stride = BOX_DIMS + classes;
      for q in 0..queries {
        let row = &data[q * stride..(q + 1) * stride];
        let (score, class_id) = best_class(row[BOX_DIMS..].iter().copied());
        if score <= threshold {
          continue;
        }
        let bbox = cxcywh_to_xyxy(row[0] * size, row[1] * size, row[2] * size, row[3] * size);
        items.push(DetectItem {
          class_id,
          score,
          bbox,
        });
      }
    }
    ResolvedLayout::End2End { rows } => {
      for r in 0..rows {
        let row = &data[r * END2END_ROW..(r + 1) * END2END_ROW];
        let score = row[4];
        if score <= threshold || row[5] < 0.0 {
          continue;
        }
        items.push(DetectItem {
          class_id: row[5].round() as u32,
          score,
          bbox: [row[0], row[1], row[2], row[3]],
        });
      }
    }
  }

  let mut items: Vec<DetectItem> = items
    .into_iter()
    .map(|item| DetectItem {
      bbox: frame.unletterbox(item.bbox),
      ..item
    })
    .filter(|item| item.width() > 0.0 && item.height() > 0.0)
    .collect();

  debug!("阈值过滤后候选框数量: {}", items.len());

  if resolved.needs_nms() {
    items = nms(items, config.iou_threshold);
  } else {
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
  }
  items.truncate(config.max_detections);

  debug!("检测到 {} 个物体", items.len());
  Ok(items)
}

/// 按类别的非极大值抑制，结果按分数降序
pub fn nms(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut suppressed = vec![false; items.len()];
  let mut result = Vec::new();

  for i in 0..items.len() {
    if suppressed[i] {
      continue;
    }
    for j in (i + 1)..items.len() {
      if !suppressed[j]
        && items[j].class_id == items[i].class_id
        && iou(&items[i].bbox, &items[j].bbox) > iou_threshold
      {
        suppressed[j] = true;
      }
    }
    result.push(items[i].clone());
  }

  result
}

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use image::RgbImage;

  use super::*;

  // 64x64 的原图，画布同为 64，坐标一一对应
  fn identity_frame() -> LetterboxFrame {
    LetterboxFrame::from_image(&RgbImage::new(64, 64), 64).unwrap()
  }

  fn config(confidence: f32) -> DetectorConfig {
    DetectorConfig {
      input_size: 64,
      confidence,
      ..DetectorConfig::default()
    }
  }

  /// 构造 [1, 4 + nc, N] 的输出
  fn yolov8_output(classes: usize, anchors: &[([f32; 4], usize, f32)]) -> (Vec<usize>, Vec<f32>) {
    let n = anchors.len();
    let mut data = vec![0f32; (BOX_DIMS + classes) * n];
    for (i, (cxcywh, class_id, score)) in anchors.iter().enumerate() {
      for d in 0..BOX_DIMS {
        data[d * n + i] = cxcywh[d];
      }
      data[(BOX_DIMS + class_id) * n + i] = *score;
    }
    (vec![1, BOX_DIMS + classes, n], data)
  }

  #[test]
  fn auto_layout_detection() {
    assert_eq!(
      resolve_layout(OutputLayout::Auto, &[1, 10, 8400]).unwrap(),
      ResolvedLayout::Yolov8 {
        classes: 6,
        anchors: 8400
      }
    );
    assert_eq!(
      resolve_layout(OutputLayout::Auto, &[1, 300, 10]).unwrap(),
      ResolvedLayout::RtDetr {
        queries: 300,
        classes: 6
      }
    );
    assert_eq!(
      resolve_layout(OutputLayout::Auto, &[1, 300, 6]).unwrap(),
      ResolvedLayout::End2End { rows: 300 }
    );
    assert!(resolve_layout(OutputLayout::Auto, &[1, 3, 640, 640]).is_err());
    assert!(resolve_layout(OutputLayout::Yolov8, &[1, 4, 100]).is_err());
    assert!(resolve_layout(OutputLayout::End2End, &[1, 300, 10]).is_err());
  }

  #[test]
  fn yolov8_filters_and_suppresses() {
    let (shape, data) = yolov8_output(
      6,
      &[
        ([20.0, 20.0, 10.0, 10.0], 1, 0.9),
        // 与第一个框高度重叠，同类别，被抑制
        ([21.0, 20.0, 10.0, 10.0], 1, 0.8),
        // 同位置不同类别，保留
        ([20.0, 20.0, 10.0, 10.0], 5, 0.7),
        // 低于阈值
        ([50.0, 50.0, 8.0, 8.0], 0, 0.3),
      ],
    );

    let items = decode(
      OutputLayout::Yolov8,
      &shape,
      &data,
      &identity_frame(),
      &config(0.5),
    )
    .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 1);
    assert_eq!(items[0].bbox, [15.0, 15.0, 25.0, 25.0]);
    assert_eq!(items[1].class_id, 5);
    assert!(items[0].score >= items[1].score);
  }

  #[test]
  fn lower_threshold_keeps_more() {
    let (shape, data) = yolov8_output(
      6,
      &[
        ([20.0, 20.0, 10.0, 10.0], 1, 0.9),
        ([50.0, 50.0, 8.0, 8.0], 0, 0.3),
      ],
    );
    let items = decode(
      OutputLayout::Yolov8,
      &shape,
      &data,
      &identity_frame(),
      &config(0.25),
    )
    .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].class_id, 0);
  }

  #[test]
  fn moderately_overlapping_boxes_survive_default_nms() {
    // 偏移 3 像素，IoU 约 0.54，低于默认阈值 0.7
    let (shape, data) = yolov8_output(
      6,
      &[
        ([20.0, 20.0, 10.0, 10.0], 1, 0.9),
        ([23.0, 20.0, 10.0, 10.0], 1, 0.8),
      ],
    );
    let overlap = iou(&[15.0, 15.0, 25.0, 25.0], &[18.0, 15.0, 28.0, 25.0]);
    assert!(overlap > 0.5 && overlap < 0.6);

    let items = decode(
      OutputLayout::Yolov8,
      &shape,
      &data,
      &identity_frame(),
      &DetectorConfig {
        input_size: 64,
        ..DetectorConfig::default()
      },
    )
    .unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.class_id == 1));
  }

  #[test]
  fn score_equal_to_threshold_is_dropped() {
    let data = vec![
      0.0, 0.0, 10.0, 10.0, 0.5, 0.0, //
      20.0, 20.0, 30.0, 30.0, 0.75, 1.0,
    ];
    let items = decode(
      OutputLayout::End2End,
      &[1, 2, 6],
      &data,
      &identity_frame(),
      &config(0.5),
    )
    .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
  }

  #[test]
  fn rtdetr_uses_normalized_boxes() {
    // 一个查询：cx=0.5, cy=0.5, w=0.25, h=0.5，类别 3
    let mut data = vec![0.5, 0.5, 0.25, 0.5, 0.0, 0.0, 0.0, 0.95, 0.0, 0.0];
    data.extend([0.1, 0.1, 0.1, 0.1, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let items = decode(
      OutputLayout::RtDetr,
      &[1, 2, 10],
      &data,
      &identity_frame(),
      &config(0.5),
    )
    .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 3);
    assert_eq!(items[0].bbox, [24.0, 16.0, 40.0, 48.0]);
  }

  #[test]
  fn end2end_rows_are_sorted_and_capped() {
    let data = vec![
      0.0, 0.0, 10.0, 10.0, 0.6, 0.0, //
      20.0, 20.0, 30.0, 30.0, 0.9, 2.0, //
      40.0, 40.0, 50.0, 50.0, 0.8, 4.0, //
      0.0, 0.0, 0.0, 0.0, 0.0, -1.0,
    ];
    let mut config = config(0.5);
    config.max_detections = 2;
    let items = decode(
      OutputLayout::Auto,
      &[1, 4, 6],
      &data,
      &identity_frame(),
      &config,
    )
    .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 2);
    assert_eq!(items[1].class_id, 4);
  }

  #[test]
  fn boxes_map_to_source_image() {
    // 128x64 原图在 64 画布上缩放 0.5，纵向填充 16
    let frame = LetterboxFrame::from_image(&RgbImage::new(128, 64), 64).unwrap();
    let data = vec![8.0, 24.0, 24.0, 40.0, 0.9, 1.0];
    let items = decode(OutputLayout::End2End, &[1, 1, 6], &data, &frame, &config(0.5)).unwrap();
    assert_eq!(items[0].bbox, [16.0, 16.0, 48.0, 48.0]);
  }

  #[test]
  fn degenerate_boxes_are_dropped() {
    let data = vec![10.0, 10.0, 10.0, 30.0, 0.9, 1.0];
    let items = decode(
      OutputLayout::End2End,
      &[1, 1, 6],
      &data,
      &identity_frame(),
      &config(0.5),
    )
    .unwrap();
    assert!(items.is_empty());
  }

  #[test]
  fn mismatched_data_length_is_an_error() {
    let err = decode(
      OutputLayout::End2End,
      &[1, 2, 6],
      &[0.0; 6],
      &identity_frame(),
      &config(0.5),
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::UnexpectedShape(_)));
  }

  #[test]
  fn iou_values() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
    assert!((half - 1.0 / 3.0).abs() < 1e-6);
    assert_eq!(iou(&[0.0; 4], &[0.0; 4]), 0.0);
  }
}
