// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/frame.rs - Letterbox NCHW 帧定义
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

use image::{Rgb, RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

const RGB_CHANNELS: usize = 3;

/// 填充区域的灰度值
pub const LETTERBOX_FILL: u8 = 114;
/// 默认模型输入边长
pub const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("图像尺寸为空")]
  EmptyImage,
  #[error("模型输入尺寸无效: {0}")]
  InvalidInputSize(u32),
}

/// 保持宽高比缩放并居中填充到正方形画布的帧，NCHW 排列，取值归一化到 [0, 1]
#[derive(Debug, Clone)]
pub struct LetterboxFrame {
  data: Box<[f32]>,
  input_size: u32,
  scale: f32,
  pad_x: f32,
  pad_y: f32,
  source_width: u32,
  source_height: u32,
}

impl LetterboxFrame {
  pub fn from_image(image: &RgbImage, input_size: u32) -> Result<Self, FrameError> {
    let (source_width, source_height) = image.dimensions();
    if source_width == 0 || source_height == 0 {
      return Err(FrameError::EmptyImage);
    }
    if input_size == 0 {
      return Err(FrameError::InvalidInputSize(input_size));
    }

    let size = input_size as f32;
    let scale = (size / source_width as f32).min(size / source_height as f32);
    let scaled_w = ((source_width as f32 * scale).round() as u32).clamp(1, input_size);
    let scaled_h = ((source_height as f32 * scale).round() as u32).clamp(1, input_size);
    let pad_x = (input_size - scaled_w) / 2;
    let pad_y = (input_size - scaled_h) / 2;

    debug!(
      "Letterbox: {}x{} -> {}x{}, 缩放 {:.4}, 填充 ({}, {})",
      source_width, source_height, scaled_w, scaled_h, scale, pad_x, pad_y
    );

    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([LETTERBOX_FILL; 3]));
    if (scaled_w, scaled_h) == (source_width, source_height) {
      imageops::replace(&mut canvas, image, pad_x as i64, pad_y as i64);
    } else {
      let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);
      imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);
    }

    // HWC -> CHW
    let plane = (input_size as usize) * (input_size as usize);
    let mut data = vec![0f32; RGB_CHANNELS * plane];
    for (idx, pixel) in canvas.pixels().enumerate() {
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      input_size,
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
      source_width,
      source_height,
    })
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  /// 张量形状 [1, 3, H, W]
  pub fn shape(&self) -> [usize; 4] {
    let size = self.input_size as usize;
    [1, RGB_CHANNELS, size, size]
  }

  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn padding(&self) -> (f32, f32) {
    (self.pad_x, self.pad_y)
  }

  pub fn source_dimensions(&self) -> (u32, u32) {
    (self.source_width, self.source_height)
  }

  /// 将画布坐标系下的 [x_min, y_min, x_max, y_max] 映射回原图并裁剪到图像范围内
  pub fn unletterbox(&self, bbox: [f32; 4]) -> [f32; 4] {
    let w = self.source_width as f32;
    let h = self.source_height as f32;
    let map_x = |v: f32| ((v - self.pad_x) / self.scale).clamp(0.0, w);
    let map_y = |v: f32| ((v - self.pad_y) / self.scale).clamp(0.0, h);
    [map_x(bbox[0]), map_y(bbox[1]), map_x(bbox[2]), map_y(bbox[3])]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
  }

  #[test]
  fn wide_image_is_padded_vertically() {
    let image = RgbImage::from_pixel(128, 64, Rgb([255, 0, 0]));
    let frame = LetterboxFrame::from_image(&image, 64).unwrap();

    assert!(approx(frame.scale(), 0.5));
    assert_eq!(frame.padding(), (0.0, 16.0));
    assert_eq!(frame.shape(), [1, 3, 64, 64]);
    assert_eq!(frame.as_nchw().len(), 3 * 64 * 64);

    let plane = 64 * 64;
    let data = frame.as_nchw();
    // 左上角属于填充区域
    assert!(approx(data[0], LETTERBOX_FILL as f32 / 255.0));
    // 中心像素来自原图
    let center = 32 * 64 + 32;
    assert!(approx(data[center], 1.0));
    assert!(approx(data[plane + center], 0.0));
    assert!(approx(data[2 * plane + center], 0.0));
  }

  #[test]
  fn unletterbox_maps_back_to_source_pixels() {
    let image = RgbImage::new(128, 64);
    let frame = LetterboxFrame::from_image(&image, 64).unwrap();

    let bbox = frame.unletterbox([0.0, 16.0, 64.0, 48.0]);
    assert_eq!(bbox, [0.0, 0.0, 128.0, 64.0]);

    let bbox = frame.unletterbox([16.0, 24.0, 32.0, 40.0]);
    assert_eq!(bbox, [32.0, 16.0, 64.0, 48.0]);
  }

  #[test]
  fn unletterbox_clamps_into_image() {
    let image = RgbImage::new(64, 128);
    let frame = LetterboxFrame::from_image(&image, 64).unwrap();
    assert_eq!(frame.padding(), (16.0, 0.0));

    let bbox = frame.unletterbox([0.0, -10.0, 70.0, 80.0]);
    assert_eq!(bbox, [0.0, 0.0, 64.0, 128.0]);
  }

  #[test]
  fn small_image_is_upscaled() {
    let image = RgbImage::new(16, 16);
    let frame = LetterboxFrame::from_image(&image, 64).unwrap();
    assert!(approx(frame.scale(), 4.0));
    assert_eq!(frame.padding(), (0.0, 0.0));
    assert_eq!(frame.source_dimensions(), (16, 16));
  }

  #[test]
  fn empty_image_is_rejected() {
    let image = RgbImage::new(0, 10);
    assert_eq!(
      LetterboxFrame::from_image(&image, 64).unwrap_err(),
      FrameError::EmptyImage
    );
    let image = RgbImage::new(10, 10);
    assert_eq!(
      LetterboxFrame::from_image(&image, 0).unwrap_err(),
      FrameError::InvalidInputSize(0)
    );
  }
}
