// 该文件是 Kiosk Detect 项目的一部分。
// src/detector.rs - 实时目标检测器
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

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{GenericImageView, Pixel};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  config::{ConfigError, DetectorConfig},
  model::{
    CocoLabel, DecodeError, Decoder, Detection, EngineLoader, InferenceEngine, WithLabel,
    suppress,
  },
  preprocess::{PreprocessError, Preprocessor},
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型加载错误: {0}")]
  ModelLoad(#[source] BoxError),
  #[error("模型正在加载中")]
  AlreadyLoading,
  #[error("检测器已释放")]
  Disposed,
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("预处理错误: {0}")]
  InvalidFrame(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[source] BoxError),
  #[error("推理过程崩溃")]
  InferencePanicked,
  #[error("输出解码错误: {0}")]
  MalformedOutput(#[from] DecodeError),
}

/// 检测器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
  Unloaded,
  Loading,
  Ready,
  Disposed,
}

enum Slot<E> {
  Unloaded,
  Loading,
  Ready(Arc<E>),
  Disposed,
}

struct Inner<E> {
  slot: Slot<E>,
  // 每次加载或释放递增，推理结束时用来判断结果是否过期
  epoch: u64,
}

/// 同一时刻只允许一次推理
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
      .ok()
      .map(|_| BusyGuard(flag))
  }
}

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// 实时目标检测器
///
/// 每帧依次执行预处理、推理、解码与 NMS。`detect` 从不返回错误：
/// 未加载、正忙或推理失败时都返回空列表，保证驱动循环不会中断。
/// 模型加载失败则必须由调用方处理。
pub struct Detector<L: EngineLoader, T: WithLabel = CocoLabel> {
  loader: L,
  labels: T,
  config: DetectorConfig,
  preprocessor: Preprocessor,
  decoder: Decoder,
  inner: Mutex<Inner<L::Engine>>,
  busy: AtomicBool,
  skipped: AtomicU64,
}

impl<L: EngineLoader> Detector<L, CocoLabel> {
  pub fn new(loader: L, config: DetectorConfig) -> Result<Self, DetectorError> {
    Self::with_labels(loader, CocoLabel, config)
  }
}

impl<L: EngineLoader, T: WithLabel> Detector<L, T> {
  pub fn with_labels(loader: L, labels: T, config: DetectorConfig) -> Result<Self, DetectorError> {
    config.validate()?;

    Ok(Self {
      preprocessor: Preprocessor::new(config.input_size),
      decoder: Decoder::new(
        config.num_classes,
        config.input_size,
        config.confidence_threshold,
      ),
      loader,
      labels,
      config,
      inner: Mutex::new(Inner {
        slot: Slot::Unloaded,
        epoch: 0,
      }),
      busy: AtomicBool::new(false),
      skipped: AtomicU64::new(0),
    })
  }

  fn lock(&self) -> MutexGuard<'_, Inner<L::Engine>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn state(&self) -> DetectorState {
    match self.lock().slot {
      Slot::Unloaded => DetectorState::Unloaded,
      Slot::Loading => DetectorState::Loading,
      Slot::Ready(_) => DetectorState::Ready,
      Slot::Disposed => DetectorState::Disposed,
    }
  }

  pub fn is_ready(&self) -> bool {
    self.state() == DetectorState::Ready
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  /// 因上一次推理尚未结束而跳过的帧数
  pub fn skipped_frames(&self) -> u64 {
    self.skipped.load(Ordering::Relaxed)
  }

  /// 加载模型，成功后进入 `Ready`
  ///
  /// 重新加载时旧会话会先被释放；失败时检测器回到 `Unloaded`。
  pub fn load_model(&self, location: &Url) -> Result<(), DetectorError> {
    let epoch = {
      let mut inner = self.lock();
      if matches!(inner.slot, Slot::Loading) {
        warn!("模型正在加载，忽略重复请求: {}", location);
        return Err(DetectorError::AlreadyLoading);
      }
      inner.slot = Slot::Loading;
      inner.epoch += 1;
      inner.epoch
    };

    info!("开始加载模型: {}", location);
    let now = std::time::Instant::now();
    let result = self.loader.load(location);

    let mut inner = self.lock();
    if inner.epoch != epoch {
      warn!("加载期间检测器已被释放，丢弃新会话");
      return Err(DetectorError::Disposed);
    }

    match result {
      Ok(engine) => {
        inner.slot = Slot::Ready(Arc::new(engine));
        info!("模型加载完成，耗时: {:.2?}", now.elapsed());
        Ok(())
      }
      Err(e) => {
        inner.slot = Slot::Unloaded;
        error!("模型加载失败: {}", e);
        Err(DetectorError::ModelLoad(Box::new(e)))
      }
    }
  }

  /// 检测一帧，失败时返回空列表
  pub fn detect<I>(&self, frame: &I) -> Vec<Detection>
  where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8> + 'static,
  {
    let (engine, epoch) = {
      let inner = self.lock();
      match &inner.slot {
        Slot::Ready(engine) => (Arc::clone(engine), inner.epoch),
        _ => {
          debug!("模型尚未加载，跳过检测");
          return Vec::new();
        }
      }
    };

    let Some(_busy) = BusyGuard::acquire(&self.busy) else {
      self.skipped.fetch_add(1, Ordering::Relaxed);
      debug!("上一帧仍在推理，跳过本帧");
      return Vec::new();
    };

    let now = std::time::Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| self.run_pipeline(engine.as_ref(), frame)))
      .unwrap_or(Err(DetectorError::InferencePanicked));

    match result {
      Ok(detections) => {
        if self.lock().epoch != epoch {
          debug!("检测器已释放，丢弃过期结果");
          return Vec::new();
        }
        debug!(
          "检测完成，{} 个目标，耗时: {:.2?}",
          detections.len(),
          now.elapsed()
        );
        detections
      }
      Err(e) => {
        error!("检测失败: {}", e);
        Vec::new()
      }
    }
  }

  fn run_pipeline<I>(&self, engine: &L::Engine, frame: &I) -> Result<Vec<Detection>, DetectorError>
  where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8> + 'static,
  {
    let (width, height) = frame.dimensions();
    let tensor = self.preprocessor.run(frame)?;
    let output = engine
      .run(&tensor)
      .map_err(|e| DetectorError::Inference(Box::new(e)))?;
    drop(tensor);

    let candidates = self.decoder.decode(&output, width as f32, height as f32)?;
    let keep = suppress(&candidates, self.config.nms_iou_threshold);
    debug!("NMS: {} 个候选框保留 {} 个", candidates.len(), keep.len());

    // 类别过滤在 NMS 之后，不改变跨类别抑制的结果
    Ok(
      keep
        .into_iter()
        .filter(|&i| self.config.allows(candidates[i].class_id))
        .map(|i| Detection::from_candidate(&candidates[i], &self.labels))
        .collect(),
    )
  }

  /// 释放推理会话，可重复调用
  ///
  /// 正在进行的推理结束后会话才真正被销毁，其结果会被丢弃。
  pub fn dispose(&self) {
    let mut inner = self.lock();
    if matches!(inner.slot, Slot::Disposed) {
      return;
    }
    inner.slot = Slot::Disposed;
    inner.epoch += 1;
    info!("检测器已释放");
  }
}

impl<L: EngineLoader, T: WithLabel> Drop for Detector<L, T> {
  fn drop(&mut self) {
    self.dispose();
  }
}
