// 该文件是 Kiosk Detect 项目的一部分。
// src/bin/simple_continueshot.rs - 连续帧推理
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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use url::Url;

use kiosk_detect::{
  Detector, DetectorConfig, FromUrl,
  input::InputWrapper,
  model::OnnxLoader,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Kiosk Detect 连续检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 最大处理帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 帧间隔（毫秒），检测慢于该间隔时多余的帧会被跳过
  #[arg(long, value_name = "MILLISECONDS")]
  pub interval_ms: Option<u64>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut config = DetectorConfig::from_url(&args.model)?;
  if let Some(confidence) = args.confidence {
    config = config.with_confidence_threshold(confidence);
  }
  if let Some(iou) = args.iou {
    config = config.with_nms_iou_threshold(iou);
  }

  let input = InputWrapper::from_url(&args.input)?;
  let detector = Detector::new(OnnxLoader::default().num_classes(config.num_classes), config)?;
  detector.load_model(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interval(args.interval_ms.map(Duration::from_millis))
    .run_task(input, &detector, output)?;

  info!("跳过帧数: {}", detector.skipped_frames());
  detector.dispose();

  Ok(())
}
