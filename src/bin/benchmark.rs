// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/bin/benchmark.rs - 推理耗时测试
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
  input::ImageFileInput,
  model::OnnxModelBuilder,
  output::{SaveImageFileOutput, draw::Draw},
  task::{RepeatShotTask, Task},
  utils::init_tracing,
};

/// 对同一张图像重复推理，统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，image:///…
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 最后一次结果的保存路径，image:///…
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 重复次数
  #[arg(long, default_value = "100")]
  pub repeat: usize,

  #[command(flatten)]
  pub detector: DetectorArgs,
}

fn main() -> Result<()> {
  let args = Args::parse();
  init_tracing(false);

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);

  let input = ImageFileInput::from_url(&args.input)?;
  let model = OnnxModelBuilder::from_url(&args.model)?
    .config(args.detector.to_config())
    .build()?;
  let output = match &args.output {
    Some(url) => {
      let draw = Draw::from_optional_font(args.detector.font.as_deref())?;
      Some(SaveImageFileOutput::from_url(url)?.with_draw(draw))
    }
    None => None,
  };

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .run_task(input, model, output)?;

  Ok(())
}
