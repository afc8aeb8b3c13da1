// 该文件是 Kiosk Detect 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
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

use std::sync::Mutex;

use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor as OrtTensor, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  model::{COCO_CLASS_NUM, EngineLoader, InferenceEngine},
  tensor::{RawOutput, Tensor},
};

const ONNX_SCHEME: &str = "onnx";
const DEFAULT_OUTPUT_NAME: &str = "output0";

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("会话错误: {0}")]
  Session(String),
  #[error("缺少输出张量: {0}")]
  MissingOutput(String),
  #[error("输出形状错误: {0}")]
  Shape(#[from] ndarray::ShapeError),
  #[error("会话锁已损坏")]
  Poisoned,
}

/// 模型输出的内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
  /// `[1, 4 + C, N]`，YOLOv8 导出的默认格式，需要转置
  #[default]
  AttributeMajor,
  /// `[1, N, 4 + C]`，已经按行排列
  RowMajor,
}

pub struct OnnxLoader {
  num_classes: usize,
  layout: OutputLayout,
  output_name: String,
}

impl Default for OnnxLoader {
  fn default() -> Self {
    Self {
      num_classes: COCO_CLASS_NUM,
      layout: OutputLayout::default(),
      output_name: DEFAULT_OUTPUT_NAME.to_string(),
    }
  }
}

impl OnnxLoader {
  pub fn num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn layout(mut self, layout: OutputLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn output_name(mut self, name: &str) -> Self {
    self.output_name = name.to_string();
    self
  }
}

impl EngineLoader for OnnxLoader {
  type Engine = OnnxEngine;
  type Error = OnnxError;

  fn load(&self, location: &Url) -> Result<Self::Engine, Self::Error> {
    if location.scheme() != ONNX_SCHEME {
      return Err(OnnxError::SchemeMismatch(location.scheme().to_string()));
    }

    info!("加载模型文件: {}", location.path());
    let model_bytes = std::fs::read(location.path())?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_bytes.len() as f64 / (1024.0 * 1024.0)
    );

    let session = Session::builder()
      .map_err(|e| OnnxError::Session(e.to_string()))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| OnnxError::Session(e.to_string()))?
      .commit_from_memory(&model_bytes)
      .map_err(|e| OnnxError::Session(e.to_string()))?;
    info!("ONNX 会话创建完成");

    Ok(OnnxEngine {
      session: Mutex::new(session),
      num_attributes: 4 + self.num_classes,
      layout: self.layout,
      output_name: self.output_name.clone(),
    })
  }
}

pub struct OnnxEngine {
  session: Mutex<Session>,
  num_attributes: usize,
  layout: OutputLayout,
  output_name: String,
}

impl OnnxEngine {
  fn to_rows(&self, data: Vec<f32>) -> Result<Vec<f32>, OnnxError> {
    match self.layout {
      OutputLayout::RowMajor => Ok(data),
      OutputLayout::AttributeMajor => {
        let rows = data.len() / self.num_attributes;
        let attributes = Array2::from_shape_vec((self.num_attributes, rows), data)?;
        Ok(attributes.t().iter().copied().collect())
      }
    }
  }
}

impl InferenceEngine for OnnxEngine {
  type Error = OnnxError;

  fn run(&self, tensor: &Tensor) -> Result<RawOutput, Self::Error> {
    let shape = tensor.shape().to_vec();
    let input = OrtTensor::from_array((shape, tensor.as_slice().to_vec().into_boxed_slice()))
      .map(Value::from)
      .map_err(|e| OnnxError::Session(e.to_string()))?;

    let data: Vec<f32> = {
      let mut session = self.session.lock().map_err(|_| OnnxError::Poisoned)?;
      let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| OnnxError::Session(e.to_string()))?;
      let output = outputs
        .get(self.output_name.as_str())
        .ok_or_else(|| OnnxError::MissingOutput(self.output_name.clone()))?;
      let (_, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| OnnxError::Session(e.to_string()))?;
      data.to_vec()
    };

    Ok(RawOutput::from(self.to_rows(data)?))
  }
}
