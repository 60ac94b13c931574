// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/input.rs - 图像输入
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
  io::Cursor,
  path::{Path, PathBuf},
};

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme};

/// 支持的图片扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 输入帧
#[derive(Debug, Clone)]
pub struct InputFrame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 来源名称（文件名主干）
  pub name: String,
  /// 帧索引
  pub index: u64,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("不支持的图像格式: {0}，仅支持 JPG、JPEG、PNG")]
  UnsupportedFormat(String),
  #[error("上传的图像为空")]
  Empty,
  #[error("不是目录: {0}")]
  NotADirectory(PathBuf),
}

pub fn is_supported_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
    })
    .unwrap_or(false)
}

/// 解码上传的图像数据，只接受 JPEG 与 PNG，按 EXIF 方向摆正后统一转换为 RGB8
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbImage, InputError> {
  if bytes.is_empty() {
    return Err(InputError::Empty);
  }

  let format = image::guess_format(bytes)
    .map_err(|_| InputError::UnsupportedFormat("unknown".to_string()))?;
  match format {
    ImageFormat::Jpeg | ImageFormat::Png => {}
    other => return Err(InputError::UnsupportedFormat(format!("{:?}", other))),
  }

  let mut decoder = ImageReader::with_format(Cursor::new(bytes), format).into_decoder()?;
  let orientation = decoder.orientation()?;
  let mut image = DynamicImage::from_decoder(decoder)?;
  image.apply_orientation(orientation);
  Ok(image.to_rgb8())
}

fn frame_name(path: &Path) -> String {
  path
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_else(|| "image".to_string())
}

mod directory;
mod read_image_file;

pub use self::directory::DirectoryInput;
pub use self::read_image_file::ImageFileInput;

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  Directory(DirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      DirectoryInput::SCHEME => Ok(InputWrapper::Directory(DirectoryInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = InputFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::Directory(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
  }

  #[test]
  fn extension_filter() {
    assert!(is_supported_extension(Path::new("a/b/car.JPG")));
    assert!(is_supported_extension(Path::new("bus.png")));
    assert!(is_supported_extension(Path::new("van.jpeg")));
    assert!(!is_supported_extension(Path::new("truck.bmp")));
    assert!(!is_supported_extension(Path::new("README")));
  }

  #[test]
  fn decodes_png_and_jpeg() {
    let image = RgbImage::from_pixel(8, 4, Rgb([10, 200, 30]));

    let decoded = decode_image_bytes(&encode(&image, ImageFormat::Png)).unwrap();
    assert_eq!(decoded, image);

    let decoded = decode_image_bytes(&encode(&image, ImageFormat::Jpeg)).unwrap();
    assert_eq!(decoded.dimensions(), (8, 4));
  }

  /// 在 SOI 之后插入只含 Orientation 标签的 EXIF 段
  fn with_exif_orientation(jpeg: &[u8], orientation: u8) -> Vec<u8> {
    let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&[b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
    app1.extend_from_slice(&[0x00, 0x01]);
    app1.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    app1.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
    app1.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    out
  }

  #[test]
  fn jpeg_exif_orientation_is_applied() {
    let jpeg = encode(&RgbImage::from_pixel(8, 4, Rgb([90, 90, 90])), ImageFormat::Jpeg);

    let rotated = decode_image_bytes(&with_exif_orientation(&jpeg, 6)).unwrap();
    assert_eq!(rotated.dimensions(), (4, 8));

    let upright = decode_image_bytes(&with_exif_orientation(&jpeg, 1)).unwrap();
    assert_eq!(upright.dimensions(), (8, 4));
  }

  #[test]
  fn rejects_empty_and_unknown_bytes() {
    assert!(matches!(decode_image_bytes(&[]), Err(InputError::Empty)));
    assert!(matches!(
      decode_image_bytes(b"definitely not an image"),
      Err(InputError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn rejects_other_image_formats() {
    // GIF 文件头
    let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
    assert!(matches!(
      decode_image_bytes(gif),
      Err(InputError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn wrapper_dispatches_on_scheme() {
    let url = url::Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
  }
}
