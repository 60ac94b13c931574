// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/output.rs - 输出定义
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

use std::{io::Cursor, path::PathBuf};

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::InputFrame, model::DetectResult};

pub trait Render: Sized {
  type Error;
  fn render_result(&self, frame: &InputFrame, result: &DetectResult) -> Result<(), Self::Error>;

  /// 所有帧处理完毕后调用
  fn finish(&self) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// 未指定输出时不做任何事
impl<R: Render> Render for Option<R> {
  type Error = R::Error;

  fn render_result(&self, frame: &InputFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.render_result(frame, result),
      None => Ok(()),
    }
  }

  fn finish(&self) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.finish(),
      None => Ok(()),
    }
  }
}

pub mod draw;

mod directory_record;
mod json_report;
mod save_image_file;

pub use self::directory_record::DirectoryRecordOutput;
pub use self::json_report::JsonReportOutput;
pub use self::save_image_file::SaveImageFileOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("无法加载字体文件: {0}")]
  InvalidFont(PathBuf),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输出锁已失效")]
  Poisoned,
}

/// 编码为 PNG
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, OutputError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png)?;
  Ok(buffer.into_inner())
}

pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
  JsonReportOutput(JsonReportOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFileOutput(
        SaveImageFileOutput::from_url(url)?,
      )),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      JsonReportOutput::SCHEME => Ok(OutputWrapper::JsonReportOutput(
        JsonReportOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  /// 替换绘制器，例如加载了字体之后
  pub fn with_draw(self, draw: draw::Draw) -> Self {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_draw(draw))
      }
      OutputWrapper::DirectoryRecordOutput(output) => {
        OutputWrapper::DirectoryRecordOutput(output.with_draw(draw))
      }
      other => other,
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &InputFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.render_result(frame, result),
      OutputWrapper::DirectoryRecordOutput(output) => output.render_result(frame, result),
      OutputWrapper::JsonReportOutput(output) => output.render_result(frame, result),
    }
  }

  fn finish(&self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.finish(),
      OutputWrapper::DirectoryRecordOutput(output) => output.finish(),
      OutputWrapper::JsonReportOutput(output) => output.finish(),
    }
  }
}
