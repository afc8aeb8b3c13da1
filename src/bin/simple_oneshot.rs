// 该文件是 Kiosk Detect 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧推理
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
use url::Url;

use kiosk_detect::{
  Detector, DetectorConfig, FromUrl,
  input::InputWrapper,
  model::OnnxLoader,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Kiosk Detect 单帧检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径，例如 onnx:///models/yolov8n.onnx?confidence=0.5
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，image:///path 或 folder:///path
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，log:// 或 record:///path
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
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

  OneShotTask.run_task(input, &detector, output)?;
  detector.dispose();

  Ok(())
}
