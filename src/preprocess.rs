// 该文件是 Kiosk Detect 项目的一部分。
// src/preprocess.rs - 帧预处理
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

use image::{GenericImageView, ImageBuffer, Pixel, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::tensor::{RGB_CHANNELS, Tensor};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("无效帧: 尺寸 {width}x{height}")]
  InvalidFrame { width: u32, height: u32 },
}

/// 把任意尺寸的帧拉伸到 `size x size` 并转换为归一化的平面张量
///
/// 不保持宽高比，解码阶段用原始帧尺寸把坐标缩放回去。
#[derive(Debug, Clone)]
pub struct Preprocessor {
  size: u32,
  filter: FilterType,
}

impl Preprocessor {
  pub fn new(size: u32) -> Self {
    Self {
      size,
      filter: FilterType::Triangle,
    }
  }

  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn run<I>(&self, frame: &I) -> Result<Tensor, PreprocessError>
  where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8> + 'static,
  {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
      return Err(PreprocessError::InvalidFrame { width, height });
    }

    debug!("缩放帧 {}x{} -> {}x{}", width, height, self.size, self.size);
    let resized = image::imageops::resize(frame, self.size, self.size, self.filter);

    Ok(planar_normalized(&resized))
  }
}

/// 交错的 8 位像素转换为 RGB 平面顺序的 `[0, 1]` 浮点数
pub fn planar_normalized<P>(image: &ImageBuffer<P, Vec<u8>>) -> Tensor
where
  P: Pixel<Subpixel = u8>,
{
  let (width, height) = image.dimensions();
  let (width, height) = (width as usize, height as usize);
  let plane = width * height;
  let mut data = vec![0.0f32; RGB_CHANNELS * plane];

  for (x, y, pixel) in image.enumerate_pixels() {
    let index = y as usize * width + x as usize;
    let rgb = pixel.to_rgb();
    for c in 0..RGB_CHANNELS {
      data[c * plane + index] = rgb[c] as f32 / 255.0;
    }
  }

  Tensor::from_parts(height, width, data)
}
