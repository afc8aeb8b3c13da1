// 该文件是 Kiosk Detect 项目的一部分。
// src/tensor.rs - 模型输入张量与原始输出定义
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

use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
pub struct ShapeMismatch {
  pub expected: usize,
  pub actual: usize,
}

/// NCHW 平面布局的 f32 张量，形状固定为 `[1, 3, H, W]`
///
/// 先存放整个 R 平面，再是 G 平面与 B 平面，每个平面按行优先排列。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  data: Box<[f32]>,
  height: usize,
  width: usize,
}

impl Tensor {
  pub fn new(height: usize, width: usize, data: Vec<f32>) -> Result<Self, ShapeMismatch> {
    let expected = RGB_CHANNELS * height * width;
    if data.len() != expected {
      return Err(ShapeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      height,
      width,
    })
  }

  pub(crate) fn from_parts(height: usize, width: usize, data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), RGB_CHANNELS * height * width);
    Self {
      data: data.into_boxed_slice(),
      height,
      width,
    }
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height, self.width]
  }

  /// 单个通道平面
  pub fn plane(&self, channel: usize) -> &[f32] {
    let size = self.height * self.width;
    &self.data[channel * size..(channel + 1) * size]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn into_vec(self) -> Vec<f32> {
    self.data.into_vec()
  }
}

/// 推理引擎输出的扁平缓冲区，按 `N` 行、每行 `4 + C` 个值解释
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  data: Box<[f32]>,
}

impl From<Vec<f32>> for RawOutput {
  fn from(data: Vec<f32>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl RawOutput {
  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}
