// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/bin/detect.rs - 批量图像检测
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use cheliang::{
  FromUrl,
  args::DetectorArgs,
  input::InputWrapper,
  model::OnnxModelBuilder,
  output::{OutputWrapper, draw::Draw},
  task::{BatchTask, OneShotTask, Task},
  utils::init_tracing,
};

/// 对图像文件或目录执行车辆检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径，例如 onnx:///models/best.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，image:///… 或 folder:///…
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，image:///…、folder:///…[?record=name|id][&always] 或 json:///…
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 最多处理的帧数
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<usize>,

  #[command(flatten)]
  pub detector: DetectorArgs,

  /// 输出调试日志
  #[arg(short, long)]
  pub debug: bool,
}

fn main() -> Result<()> {
  let args = Args::parse();
  init_tracing(args.debug);

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let model = OnnxModelBuilder::from_url(&args.model)?
    .config(args.detector.to_config())
    .build()?;
  let draw = Draw::from_optional_font(args.detector.font.as_deref())?;
  let output = OutputWrapper::from_url(&args.output)?.with_draw(draw);

  match input {
    InputWrapper::ReadImageFile(_) => OneShotTask.run_task(input, model, output)?,
    InputWrapper::Directory(_) => BatchTask::default()
      .with_frame_number(args.max_frames)
      .run_task(input, model, output)?,
  }

  Ok(())
}
