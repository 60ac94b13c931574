// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/task.rs - 检测任务
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
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{
  input::InputFrame,
  model::{DetectRequest, DetectResult, Model},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 将帧图像交给模型推理，推理结束后把图像放回帧中
fn detect_frame<M>(model: &M, frame: InputFrame) -> Result<(InputFrame, DetectResult), M::Error>
where
  M: Model<Input = DetectRequest, Output = DetectResult>,
{
  let InputFrame { image, name, index } = frame;
  let request = DetectRequest::new(image);
  let result = model.infer(&request)?;
  let frame = InputFrame {
    image: request.image,
    name,
    index,
  };
  Ok((frame, result))
}

pub struct OneShotTask;

impl<ME, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = InputFrame>,
  M: Model<Input = DetectRequest, Output = DetectResult, Error = ME>,
  O: Render<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧 {} 获取成功，开始推理...", frame.name);
    let now = Instant::now();
    let (frame, result) = detect_frame(&model, frame)?;
    info!(
      "推理完成，检测到 {} 个目标，耗时: {:.2?}",
      result.len(),
      now.elapsed()
    );
    output.render_result(&frame, &result)?;
    output.finish()?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对单帧重复推理，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

/// 计时时跳过的预热次数
const WARMUP_RUNS: usize = 2;

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 100 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

/// 平均耗时，次数多于预热次数时去掉前两次
pub fn mean_latency(times: &[Duration]) -> Option<Duration> {
  let measured = if times.len() > WARMUP_RUNS {
    &times[WARMUP_RUNS..]
  } else {
    times
  };
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<ME, RE, I, M, O> Task<I, M, O> for RepeatShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = InputFrame>,
  M: Model<Input = DetectRequest, Output = DetectResult, Error = ME>,
  O: Render<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理 {} 次...", self.repeat);

    let request = DetectRequest::new(frame.image.clone());
    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&request)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，{} 个目标，耗时: {:.2?}", i, result.len(), elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
      output.finish()?;
    }

    if let Some(mean) = mean_latency(&times) {
      warn!("平均推理时间: {:.2?}", mean);
    }

    Ok(())
  }
}

/// 逐帧处理全部输入，可限制帧数，收到 Ctrl-C 后在当前帧结束时退出
#[derive(Debug)]
pub struct BatchTask {
  frame_number: Option<usize>,
  interrupt: bool,
}

impl Default for BatchTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      interrupt: true,
    }
  }
}

impl BatchTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 是否安装 Ctrl-C 处理函数，一个进程只能安装一次
  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }

  fn install_interrupt(&self) -> Option<Receiver<()>> {
    if !self.interrupt {
      return None;
    }

    let (tx, rx) = channel();
    let installed = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });

    match installed {
      Ok(()) => Some(rx),
      Err(err) => {
        warn!("无法设置 Ctrl-C 处理函数: {}", err);
        None
      }
    }
  }
}

impl<ME, RE, I, M, O> Task<I, M, O> for BatchTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = InputFrame>,
  M: Model<Input = DetectRequest, Output = DetectResult, Error = ME>,
  O: Render<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let interrupt = self.install_interrupt();

    let started = Instant::now();
    let mut frames = 0usize;
    let mut detections = 0usize;
    for frame in input {
      frames += 1;
      let now = Instant::now();
      let (frame, result) = detect_frame(&model, frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      detections += result.len();
      info!(
        "第 {} 帧 {}: {} 个目标，耗时: {:.2?} / {:.2?}",
        frames,
        frame.name,
        result.len(),
        elapsed_a,
        elapsed_b
      );

      if self.frame_number.is_some_and(|n| frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frames);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    output.finish()?;
    info!(
      "任务完成: {} 帧，{} 个目标，总耗时: {:.2?}",
      frames,
      detections,
      started.elapsed()
    );
    Ok(())
  }
}
