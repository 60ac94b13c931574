// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/input/directory.rs - 目录批量输入
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

use std::{collections::VecDeque, path::PathBuf};

use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputError, InputFrame, decode_image_bytes, frame_name, is_supported_extension},
  utils::url_path,
};

/// 按文件名顺序逐个读取目录中的图片，无法读取的文件记录警告后跳过
pub struct DirectoryInput {
  pending: VecDeque<PathBuf>,
  index: u64,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url_path(url))
  }
}

impl DirectoryInput {
  pub fn open(directory: PathBuf) -> Result<Self, InputError> {
    if !directory.is_dir() {
      return Err(InputError::NotADirectory(directory));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      if path.is_file() && is_supported_extension(&path) {
        files.push(path);
      }
    }
    files.sort();

    info!("目录 {} 中找到 {} 张图片", directory.display(), files.len());

    Ok(DirectoryInput {
      pending: files.into(),
      index: 0,
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for DirectoryInput {
  type Item = InputFrame;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      let image = std::fs::read(&path)
        .map_err(InputError::from)
        .and_then(|bytes| decode_image_bytes(&bytes));

      match image {
        Ok(image) => {
          let frame = InputFrame {
            image,
            name: frame_name(&path),
            index: self.index,
          };
          self.index += 1;
          return Some(frame);
        }
        Err(e) => warn!("跳过无法读取的图片 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};

  use super::*;

  #[test]
  fn iterates_images_in_name_order_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(3, 3, Rgb([0, 0, 0]))
      .save(dir.path().join("a.jpg"))
      .unwrap();
    std::fs::write(dir.path().join("c.png"), b"broken").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let input = DirectoryInput::open(dir.path().to_path_buf()).unwrap();
    assert_eq!(input.remaining(), 3);

    let frames: Vec<_> = input.collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].name, "a");
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[1].name, "b");
    assert_eq!(frames[1].index, 1);
  }

  #[test]
  fn file_path_is_not_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.png");
    std::fs::write(&path, b"").unwrap();
    assert!(matches!(
      DirectoryInput::open(path),
      Err(InputError::NotADirectory(_))
    ));
  }
}
