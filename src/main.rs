// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/main.rs - 车辆检测 HTTP 服务
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use cheliang::{
  args::DetectorArgs,
  model::OnnxModelBuilder,
  output::draw::Draw,
  server::{self, AppState},
  utils::init_tracing,
};

/// Cheliang 车辆检测服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// ONNX 模型文件路径
  #[arg(value_name = "MODEL", default_value = "best.onnx")]
  model: PathBuf,

  /// 监听地址
  #[arg(long, default_value = "0.0.0.0")]
  host: String,

  /// 监听端口
  #[arg(short, long, default_value = "5000")]
  port: u16,

  #[command(flatten)]
  detector: DetectorArgs,

  /// 输出调试日志
  #[arg(short, long)]
  debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  init_tracing(args.debug);

  info!("Cheliang 车辆检测服务");
  info!("模型文件路径: {}", args.model.display());

  let config = args.detector.to_config();
  config.validate()?;
  let draw = Draw::from_optional_font(args.detector.font.as_deref())?;

  let model_path = args.model.clone();
  let model = tokio::task::spawn_blocking(move || {
    OnnxModelBuilder::from_path(model_path)
      .config(config)
      .build()
  })
  .await?;
  let model = match model {
    Ok(model) => {
      info!("模型已加载: {}", model.path().display());
      Some(model)
    }
    Err(err) => {
      error!("模型未加载: {}", err);
      None
    }
  };

  let state = Arc::new(
    AppState::new(model, &args.model)
      .with_default_confidence(args.detector.confidence)
      .with_draw(draw),
  );

  let listener = server::bind(&args.host, args.port).await?;
  server::serve(state, listener, server::shutdown_signal()).await?;

  info!("服务已退出");
  Ok(())
}
