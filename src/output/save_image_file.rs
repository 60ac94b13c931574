// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::PathBuf;

use image::RgbImage;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputFrame,
  model::DetectResult,
  output::{OutputError, Render, draw::Draw},
  utils::url_path,
};

/// 将标注后的图像保存到单个文件，多帧输入时后一帧覆盖前一帧
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: url_path(uri),
      draw: Draw::default(),
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn save_image(&self, image: RgbImage) -> Result<(), OutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &InputFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw.annotate(&frame.image, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crate::model::DetectItem;

  use super::*;

  #[test]
  fn saves_annotated_image_creating_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out.png");
    let output = SaveImageFileOutput::new(&path);

    let frame = InputFrame {
      image: RgbImage::new(16, 16),
      name: "frame".to_string(),
      index: 0,
    };
    let result = DetectResult {
      items: vec![DetectItem {
        class_id: 0,
        score: 0.8,
        bbox: [2.0, 2.0, 10.0, 10.0],
      }]
      .into_boxed_slice(),
      image_width: 16,
      image_height: 16,
      elapsed: Duration::ZERO,
    };

    output.render_result(&frame, &result).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (16, 16));
    assert_eq!(*saved.get_pixel(2, 2), Draw::default().color_for(0));
  }
}
