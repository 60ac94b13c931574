// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/output/json_report.rs - JSON 报告输出
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
  fs::File,
  io::{BufWriter, Write},
  path::PathBuf,
  sync::Mutex,
};

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputFrame,
  model::DetectResult,
  output::{OutputError, Render},
  report::ImageReport,
  utils::url_path,
};

/// 收集每一帧的检测报告，`finish` 时写成一个 JSON 数组
pub struct JsonReportOutput {
  path: PathBuf,
  reports: Mutex<Vec<ImageReport>>,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(Self::new(url_path(uri)))
  }
}

impl JsonReportOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      reports: Mutex::new(Vec::new()),
    }
  }
}

impl Render for JsonReportOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &InputFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let report = ImageReport::new(&frame.name, frame.index, result);
    self
      .reports
      .lock()
      .map_err(|_| OutputError::Poisoned)?
      .push(report);
    Ok(())
  }

  fn finish(&self) -> Result<(), Self::Error> {
    let reports = self.reports.lock().map_err(|_| OutputError::Poisoned)?;

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(&mut writer, &*reports)?;
    writer.flush()?;
    info!("写入 {} 条检测报告到 {}", reports.len(), self.path.display());
    Ok(())
  }
}
