// 该文件是 Kiosk Detect 项目的一部分。
// src/model.rs - 推理能力接口与检测结果
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

use serde::Serialize;
use url::Url;

use crate::{
  geometry::BBox,
  tensor::{RawOutput, Tensor},
};

/// 推理引擎：张量输入，原始输出
///
/// 同一个引擎不会被并发调用，检测器保证这一点。
pub trait InferenceEngine: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, tensor: &Tensor) -> Result<RawOutput, Self::Error>;
}

/// 从模型位置创建推理引擎
pub trait EngineLoader {
  type Engine: InferenceEngine;
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(&self, location: &Url) -> Result<Self::Engine, Self::Error>;
}

/// 抑制前的候选框，仅在单帧处理期间存在
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  /// 原始帧像素坐标 `[x_min, y_min, x_max, y_max]`
  pub bbox: BBox,
  pub class_id: usize,
  pub score: f32,
}

/// 对外输出的检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: BBox,
  #[serde(rename = "class")]
  pub class_label: String,
  pub confidence: f32,
  pub class_id: usize,
}

impl Detection {
  pub fn from_candidate<L: WithLabel + ?Sized>(candidate: &Candidate, labels: &L) -> Self {
    Detection {
      bbox: candidate.bbox,
      class_label: labels.label_of(candidate.class_id).to_string(),
      confidence: candidate.score,
      class_id: candidate.class_id,
    }
  }
}

mod decode;
pub use self::decode::{DecodeError, Decoder};

mod nms;
pub use self::nms::suppress;

mod label;
pub use self::label::{
  COCO_CLASS_NUM, COCO_CLASSES, COCO_VEHICLE_CLASSES, CocoLabel, LabelTable, UNKNOWN_LABEL,
  WithLabel,
};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxEngine, OnnxError, OnnxLoader, OutputLayout};
