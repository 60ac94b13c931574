// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/utils.rs - 工具函数
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

use tracing_subscriber::EnvFilter;
use url::Url;

/// URL 路径部分解码为文件系统路径
pub fn url_path(url: &Url) -> PathBuf {
  let path = url.path();
  match urlencoding::decode(path) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(path),
  }
}

/// 初始化日志，`RUST_LOG` 优先
pub fn init_tracing(debug: bool) {
  let default_level = if debug { "debug" } else { "info" };
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .compact()
    .init();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = Url::parse("image:///data/%E8%BD%A6/car%201.jpg").unwrap();
    assert_eq!(url_path(&url), PathBuf::from("/data/车/car 1.jpg"));
  }
}
