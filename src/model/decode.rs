// 该文件是 Kiosk Detect 项目的一部分。
// src/model/decode.rs - 原始输出解码
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
use tracing::debug;

use crate::{model::Candidate, tensor::RawOutput};

const BOX_PARAMS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出长度 {len} 不是行宽 {row_width} 的整数倍")]
  MalformedOutput { len: usize, row_width: usize },
}

/// 把 `N x (4 + C)` 的原始输出解释为候选框
#[derive(Debug, Clone)]
pub struct Decoder {
  num_classes: usize,
  input_size: f32,
  confidence_threshold: f32,
}

impl Decoder {
  pub fn new(num_classes: usize, input_size: u32, confidence_threshold: f32) -> Self {
    Self {
      num_classes,
      input_size: input_size as f32,
      confidence_threshold,
    }
  }

  pub fn row_width(&self) -> usize {
    BOX_PARAMS + self.num_classes
  }

  /// 解码并按置信度阈值过滤，低于阈值的行直接丢弃
  ///
  /// 坐标从 `input_size x input_size` 的模型空间缩放回原始帧尺寸，不裁剪到帧边界。
  pub fn decode(
    &self,
    output: &RawOutput,
    original_width: f32,
    original_height: f32,
  ) -> Result<Vec<Candidate>, DecodeError> {
    let row_width = self.row_width();
    let data = output.as_slice();
    if data.len() % row_width != 0 {
      return Err(DecodeError::MalformedOutput {
        len: data.len(),
        row_width,
      });
    }

    let scale_x = original_width / self.input_size;
    let scale_y = original_height / self.input_size;

    let mut candidates = Vec::new();
    for row in data.chunks_exact(row_width) {
      let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);

      // 相同分数取先出现的类别
      let mut max_score = 0.0f32;
      let mut max_class_id = 0usize;
      for (class_id, &score) in row[BOX_PARAMS..].iter().enumerate() {
        if score > max_score {
          max_score = score;
          max_class_id = class_id;
        }
      }

      if max_score <= self.confidence_threshold {
        continue;
      }

      candidates.push(Candidate {
        bbox: [
          (cx - w / 2.0) * scale_x,
          (cy - h / 2.0) * scale_y,
          (cx + w / 2.0) * scale_x,
          (cy + h / 2.0) * scale_y,
        ],
        class_id: max_class_id,
        score: max_score,
      });
    }

    debug!(
      "解码 {} 行，{} 个候选框超过阈值 {}",
      data.len() / row_width,
      candidates.len(),
      self.confidence_threshold
    );

    Ok(candidates)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CLASSES: usize = 80;

  fn row(cx: f32, cy: f32, w: f32, h: f32, scores: &[(usize, f32)]) -> Vec<f32> {
    let mut row = vec![0.0; BOX_PARAMS + CLASSES];
    row[..4].copy_from_slice(&[cx, cy, w, h]);
    for &(class_id, score) in scores {
      row[BOX_PARAMS + class_id] = score;
    }
    row
  }

  #[test]
  fn single_row_is_scaled_to_frame() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let output = RawOutput::from(row(320.0, 320.0, 100.0, 100.0, &[(2, 0.9)]));

    let candidates = decoder.decode(&output, 1280.0, 1280.0).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 2);
    assert_eq!(candidates[0].score, 0.9);
    assert_eq!(candidates[0].bbox, [540.0, 540.0, 740.0, 740.0]);
  }

  #[test]
  fn non_square_frame_scales_each_axis() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let output = RawOutput::from(row(320.0, 320.0, 64.0, 64.0, &[(0, 0.7)]));

    let candidates = decoder.decode(&output, 1920.0, 1080.0).unwrap();
    let bbox = candidates[0].bbox;
    assert!((bbox[0] - 864.0).abs() < 1e-3);
    assert!((bbox[2] - 1056.0).abs() < 1e-3);
    assert!((bbox[1] - 486.0).abs() < 1e-3);
    assert!((bbox[3] - 594.0).abs() < 1e-3);
  }

  #[test]
  fn score_equal_to_threshold_is_discarded() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let output = RawOutput::from(row(10.0, 10.0, 4.0, 4.0, &[(1, 0.5)]));
    assert!(decoder.decode(&output, 640.0, 640.0).unwrap().is_empty());
  }

  #[test]
  fn ties_resolve_to_first_class() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let output = RawOutput::from(row(10.0, 10.0, 4.0, 4.0, &[(7, 0.8), (3, 0.8)]));
    let candidates = decoder.decode(&output, 640.0, 640.0).unwrap();
    assert_eq!(candidates[0].class_id, 3);
  }

  #[test]
  fn boxes_are_not_clamped() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let output = RawOutput::from(row(0.0, 0.0, 100.0, 100.0, &[(0, 0.9)]));
    let candidates = decoder.decode(&output, 640.0, 640.0).unwrap();
    assert_eq!(candidates[0].bbox, [-50.0, -50.0, 50.0, 50.0]);
  }

  #[test]
  fn rows_keep_scan_order() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let mut data = row(10.0, 10.0, 4.0, 4.0, &[(5, 0.6)]);
    data.extend(row(20.0, 20.0, 4.0, 4.0, &[(6, 0.3)]));
    data.extend(row(30.0, 30.0, 4.0, 4.0, &[(7, 0.95)]));

    let candidates = decoder
      .decode(&RawOutput::from(data), 640.0, 640.0)
      .unwrap();
    let classes: Vec<usize> = candidates.iter().map(|c| c.class_id).collect();
    assert_eq!(classes, vec![5, 7]);
  }

  #[test]
  fn truncated_output_is_rejected() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let output = RawOutput::from(vec![0.0; 84 * 2 + 3]);
    assert_eq!(
      decoder.decode(&output, 640.0, 640.0).unwrap_err(),
      DecodeError::MalformedOutput {
        len: 171,
        row_width: 84
      }
    );
  }

  #[test]
  fn empty_output_yields_nothing() {
    let decoder = Decoder::new(CLASSES, 640, 0.5);
    let output = RawOutput::from(Vec::new());
    assert!(decoder.decode(&output, 640.0, 640.0).unwrap().is_empty());
  }
}
