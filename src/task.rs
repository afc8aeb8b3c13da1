// 该文件是 Kiosk Detect 项目的一部分。
// src/task.rs - 逐帧检测任务
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

use std::{thread, time::Duration};

use image::{GenericImageView, Pixel};
use tracing::{debug, info, warn};

use crate::{
  detector::Detector,
  model::{EngineLoader, WithLabel},
  output::Render,
};

pub trait Task<I, L: EngineLoader, T: WithLabel, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: &Detector<L, T>, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<F, I, L, T, O> Task<I, L, T, O> for OneShotTask
where
  F: GenericImageView,
  F::Pixel: Pixel<Subpixel = u8> + 'static,
  I: Iterator<Item = F>,
  L: EngineLoader,
  T: WithLabel,
  O: Render<F>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: &Detector<L, T>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let detections = detector.detect(&frame);
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &detections)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧重复检测，统计平均耗时
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times;
    self
  }
}

impl<F, I, L, T, O> Task<I, L, T, O> for RepeatShotTask
where
  F: GenericImageView,
  F::Pixel: Pixel<Subpixel = u8> + 'static,
  I: Iterator<Item = F>,
  L: EngineLoader,
  T: WithLabel,
  O: Render<F>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: &Detector<L, T>, output: O) -> Result<(), Self::Error> {
    // 前两次为预热，不计入平均值
    const WARMUP: usize = 2;

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = std::time::Instant::now();
      let detections = detector.detect(&frame);
      let elapsed = now.elapsed();
      info!("({})推理完成，{} 个目标，耗时: {:.2?}", i, detections.len(), elapsed);
      output.render_result(&frame, &detections)?;
      times.push(elapsed);
    }

    if times.len() > WARMUP {
      warn!(
        "平均推理时间: {:.2?}",
        times.iter().skip(WARMUP).sum::<Duration>() / (times.len() - WARMUP) as u32
      );
    }

    Ok(())
  }
}

/// 固定节拍驱动的连续检测
///
/// 上一帧的检测与渲染尚未结束时到达的帧直接丢弃，不会并发推理。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interval: Option<Duration>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
    self.interval = interval;
    self
  }
}

impl<F, I, L, T, O> Task<I, L, T, O> for ContinuousTask
where
  F: GenericImageView + Send,
  F::Pixel: Pixel<Subpixel = u8> + 'static,
  I: Iterator<Item = F>,
  L: EngineLoader + Sync,
  T: WithLabel + Sync,
  O: Render<F> + Sync,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: &Detector<L, T>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    // 每个进程只能注册一次，重复运行任务时沿用已有的处理函数
    if let Err(e) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    }) {
      warn!("无法注册中断处理: {}", e);
    }

    let output = &output;
    let mut frame_index = 0usize;
    let mut skipped = 0usize;

    thread::scope(|s| -> anyhow::Result<()> {
      let mut worker: Option<thread::ScopedJoinHandle<'_, anyhow::Result<()>>> = None;

      for frame in input {
        frame_index += 1;

        if let Some(handle) = &worker
          && !handle.is_finished()
        {
          skipped += 1;
          debug!("第 {} 帧到达时上一帧仍在处理，跳过", frame_index);
        } else {
          if let Some(handle) = worker.take() {
            handle
              .join()
              .map_err(|_| anyhow::anyhow!("检测线程异常退出"))??;
          }
          info!("处理第 {} 帧图像", frame_index);
          worker = Some(s.spawn(move || {
            let detections = detector.detect(&frame);
            output.render_result(&frame, &detections)?;
            Ok(())
          }));
        }

        if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
          info!("达到指定帧数 {}, 退出任务循环", frame_index);
          break;
        }
        if rx.try_recv().is_ok() {
          warn!("中断信号接收，退出任务循环");
          break;
        }
        if let Some(interval) = self.interval {
          thread::sleep(interval);
        }
      }

      if let Some(handle) = worker.take() {
        handle
          .join()
          .map_err(|_| anyhow::anyhow!("检测线程异常退出"))??;
      }
      Ok(())
    })?;

    info!(
      "任务完成，共 {} 帧，跳过 {} 帧，退出",
      frame_index, skipped
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use image::RgbImage;
  use url::Url;

  use super::*;
  use crate::{
    config::DetectorConfig,
    model::{Detection, InferenceEngine},
    tensor::{RawOutput, Tensor},
  };

  #[derive(Debug, thiserror::Error)]
  #[error("never")]
  struct Never;

  struct EmptyEngine;

  impl InferenceEngine for EmptyEngine {
    type Error = Never;

    fn run(&self, _tensor: &Tensor) -> Result<RawOutput, Self::Error> {
      Ok(RawOutput::from(Vec::new()))
    }
  }

  struct EmptyLoader;

  impl EngineLoader for EmptyLoader {
    type Engine = EmptyEngine;
    type Error = Never;

    fn load(&self, _location: &Url) -> Result<Self::Engine, Self::Error> {
      Ok(EmptyEngine)
    }
  }

  /// 每次渲染耗时固定，记录收到的帧宽度
  struct SlowRender {
    delay: Duration,
    widths: Mutex<Vec<u32>>,
  }

  impl SlowRender {
    fn new(delay: Duration) -> Self {
      Self {
        delay,
        widths: Mutex::new(Vec::new()),
      }
    }
  }

  impl Render<RgbImage> for &SlowRender {
    type Error = Never;

    fn render_result(&self, frame: &RgbImage, _detections: &[Detection]) -> Result<(), Never> {
      thread::sleep(self.delay);
      self.widths.lock().unwrap().push(frame.width());
      Ok(())
    }
  }

  fn detector() -> Detector<EmptyLoader> {
    let detector = Detector::new(EmptyLoader, DetectorConfig::default().with_input_size(16)).unwrap();
    detector
      .load_model(&Url::parse("mock:///model").unwrap())
      .unwrap();
    detector
  }

  fn frames(count: u32) -> impl Iterator<Item = RgbImage> {
    (1..=count).map(|width| RgbImage::new(width, 1))
  }

  #[test]
  fn continuous_skips_frames_while_previous_is_rendering() {
    let detector = detector();
    let output = SlowRender::new(Duration::from_millis(200));

    ContinuousTask::default()
      .run_task(frames(4), &detector, &output)
      .unwrap();

    // 第一帧仍在渲染时后三帧已经到达
    assert_eq!(*output.widths.lock().unwrap(), vec![1]);
  }

  #[test]
  fn continuous_processes_every_frame_when_fast_enough() {
    let detector = detector();
    let output = SlowRender::new(Duration::ZERO);

    ContinuousTask::default()
      .with_interval(Some(Duration::from_millis(50)))
      .run_task(frames(3), &detector, &output)
      .unwrap();

    assert_eq!(*output.widths.lock().unwrap(), vec![1, 2, 3]);
  }

  #[test]
  fn continuous_stops_at_frame_limit() {
    let detector = detector();
    let output = SlowRender::new(Duration::ZERO);
    let pulled = AtomicUsize::new(0);

    ContinuousTask::default()
      .with_frame_number(Some(2))
      .with_interval(Some(Duration::from_millis(50)))
      .run_task(
        frames(10).inspect(|_| {
          pulled.fetch_add(1, Ordering::SeqCst);
        }),
        &detector,
        &output,
      )
      .unwrap();

    assert_eq!(pulled.load(Ordering::SeqCst), 2);
    assert_eq!(*output.widths.lock().unwrap(), vec![1, 2]);
  }

  #[test]
  fn repeat_shot_renders_every_run() {
    let detector = detector();
    let output = SlowRender::new(Duration::ZERO);

    RepeatShotTask::default()
      .with_times(5)
      .run_task(frames(1), &detector, &output)
      .unwrap();

    assert_eq!(output.widths.lock().unwrap().len(), 5);
  }
}
