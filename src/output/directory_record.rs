// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Datelike, Utc};
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputFrame,
  model::DetectResult,
  output::{
    OutputError, Render,
    draw::{Draw, Record},
  },
  utils::url_path,
};

pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    frame: &InputFrame,
    result: &DetectResult,
  ) -> Result<(), OutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        let image = draw.annotate(&frame.image, result);
        image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.image.save(path)?;
        record.record(result, path)?;
      }
    };

    Ok(())
  }

  pub fn with(kind: &str) -> Self {
    match kind {
      "record-name" => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      "record-id" => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      _ => DrawWrapper::Draw(Box::default()),
    }
  }
}

/// 按日期分目录保存结果，默认跳过没有检测结果的帧
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = OutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(uri.scheme().to_string()));
    }

    let kind = {
      let mut kind = "draw";
      for (k, v) in uri.query_pairs() {
        if k == "record" {
          if v == "id" {
            kind = "record-id";
          } else {
            kind = "record-name";
          }
          break;
        }
      }
      kind
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: url_path(uri),
      draw: DrawWrapper::with(kind),
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  /// 标注模式下替换绘制器，记录模式不受影响
  pub fn with_draw(mut self, draw: Draw) -> Self {
    if let DrawWrapper::Draw(_) = self.draw {
      self.draw = DrawWrapper::Draw(Box::new(draw));
    }
    self
  }

  fn frame_id(&self) -> Result<u16, OutputError> {
    let mut counter = self.frame_counter.lock().map_err(|_| OutputError::Poisoned)?;
    let id = counter.wrapping_add(1);
    *counter = id;
    Ok(id)
  }

  fn frame_path(&self, frame: &InputFrame) -> Result<PathBuf, OutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}-{}.png",
      now.format("%H-%M-%S"),
      self.frame_id()?,
      frame.name
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &InputFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("帧 {} 没有检测结果，跳过保存", frame.name);
      return Ok(());
    }
    let path = self.frame_path(frame)?;
    self.draw.save_result(&path, frame, result)
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use image::RgbImage;

  use crate::model::DetectItem;

  use super::*;

  fn frame(name: &str) -> InputFrame {
    InputFrame {
      image: RgbImage::new(8, 8),
      name: name.to_string(),
      index: 0,
    }
  }

  fn result(count: usize) -> DetectResult {
    let items = (0..count)
      .map(|i| DetectItem {
        class_id: i as u32,
        score: 0.9,
        bbox: [1.0, 1.0, 6.0, 6.0],
      })
      .collect::<Vec<_>>();
    DetectResult {
      items: items.into_boxed_slice(),
      image_width: 8,
      image_height: 8,
      elapsed: Duration::ZERO,
    }
  }

  fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  fn folder_url(dir: &Path, query: &str) -> url::Url {
    url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap()
  }

  #[test]
  fn skips_empty_frames_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::from_url(&folder_url(dir.path(), "")).unwrap();
    output.render_result(&frame("empty"), &result(0)).unwrap();
    output.render_result(&frame("cars"), &result(2)).unwrap();

    let images = files_with_extension(dir.path(), "png");
    assert_eq!(images.len(), 1);
    assert!(
      images[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("-cars.png")
    );

    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::from_url(&folder_url(dir.path(), "?always")).unwrap();
    output.render_result(&frame("empty"), &result(0)).unwrap();
    assert_eq!(files_with_extension(dir.path(), "png").len(), 1);
  }

  #[test]
  fn record_mode_writes_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::from_url(&folder_url(dir.path(), "?record=id")).unwrap();
    output.render_result(&frame("road"), &result(2)).unwrap();

    let records = files_with_extension(dir.path(), "txt");
    assert_eq!(records.len(), 1);
    let text = std::fs::read_to_string(&records[0]).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("0, 0.9000"));
    assert!(lines[1].starts_with("1, 0.9000"));
  }
}
