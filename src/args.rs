// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/args.rs - 检测参数配置
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

use clap::Args;

use crate::model::{DetectorConfig, OutputLayout};

/// 各个程序共用的检测参数
#[derive(Args, Debug, Clone)]
pub struct DetectorArgs {
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 每张图像最多保留的检测数量
  #[arg(long, default_value = "300", value_name = "COUNT")]
  pub max_detections: usize,

  /// 模型输入边长
  #[arg(long, default_value = "640", value_name = "PIXELS")]
  pub input_size: u32,

  /// 模型输出排列
  #[arg(long, value_enum, default_value_t = OutputLayout::Auto)]
  pub layout: OutputLayout,

  /// 推理线程数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub threads: usize,

  /// 标注文字使用的 TTF/OTF 字体文件，不指定时只绘制边框，不绘制类别与分数
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

impl DetectorArgs {
  pub fn to_config(&self) -> DetectorConfig {
    DetectorConfig {
      input_size: self.input_size,
      confidence: self.confidence,
      iou_threshold: self.nms_threshold,
      max_detections: self.max_detections,
      layout: self.layout,
      intra_threads: self.threads,
    }
  }
}
