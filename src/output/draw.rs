// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::info;

use crate::{
  label::VEHICLE_CLASS_NUM,
  model::{DetectItem, DetectResult},
  output::OutputError,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: u32 = 4;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  thickness: i32,
  palette: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 每个车辆类别一种颜色
    let palette = (0..VEHICLE_CLASS_NUM)
      .map(|i| {
        let hue = (i as f32 / VEHICLE_CLASS_NUM as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      palette,
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  pub fn with_font_file(path: &Path) -> Result<Self, OutputError> {
    let data = std::fs::read(path)?;
    let font =
      FontArc::try_from_vec(data).map_err(|_| OutputError::InvalidFont(path.to_path_buf()))?;
    info!("加载标注字体: {}", path.display());
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  /// 可选字体：未指定时只绘制边框
  pub fn from_optional_font(path: Option<&Path>) -> Result<Self, OutputError> {
    match path {
      Some(path) => Self::with_font_file(path),
      None => {
        info!("未指定标注字体，只绘制检测框");
        Ok(Self::default())
      }
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color_for(&self, class_id: u32) -> Rgb<u8> {
    self.palette[class_id as usize % self.palette.len()]
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_bbox_with_label(image, item);
    }
  }

  /// 返回绘制了检测结果的新图像
  pub fn annotate(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut annotated = image.clone();
    self.draw_detections(&mut annotated, result);
    annotated
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (item.bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (item.bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (item.bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (item.bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color_for(item.class_id);

    // 边框向内加粗
    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", item.label(), item.score);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, &label);
    let label_width = text_width + 2 * LABEL_TEXT_HORIZONTAL_PADDING;
    let label_height = text_height + 2 * LABEL_TEXT_VERTICAL_PADDING as u32;

    // 标签放在边框上方，空间不足时放在框内
    let label_x = x_min;
    let label_y = if y_min >= label_height as i32 {
      y_min - label_height as i32
    } else {
      y_min
    };

    let max_width = (w - label_x).max(0) as u32;
    let label_width = label_width.min(max_width);
    if label_width == 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      TEXT_COLOR,
      label_x + LABEL_TEXT_HORIZONTAL_PADDING as i32,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      &label,
    );
  }
}

/// 以文本形式记录检测结果
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format(&self, result: &DetectResult) -> String {
    let mut records = Vec::new();
    for item in result.items.iter() {
      let name = if self.label_with_name {
        item.label()
      } else {
        format!("{}", item.class_id)
      };
      let record = format!(
        "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
        name, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
      );
      records.push(record);
    }
    records.join("\n")
  }

  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(result))
  }
}
