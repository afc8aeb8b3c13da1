// 该文件是 Kiosk Detect 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::cmp::Ordering;

use crate::{geometry::iou, model::Candidate};

/// 贪心 NMS，返回保留的候选框下标（按原始下标升序）
///
/// 不区分类别：不同类别的框重叠足够多时同样互相抑制。
/// IoU 严格大于阈值才会被抑制。
pub fn suppress(candidates: &[Candidate], iou_threshold: f32) -> Vec<usize> {
  // 按置信度降序排序
  let mut order: Vec<usize> = (0..candidates.len()).collect();
  order.sort_by(|&a, &b| {
    candidates[b]
      .score
      .partial_cmp(&candidates[a].score)
      .unwrap_or(Ordering::Equal)
  });

  let mut suppressed = vec![false; candidates.len()];
  let mut keep = Vec::new();

  for (rank, &i) in order.iter().enumerate() {
    if suppressed[i] {
      continue;
    }
    keep.push(i);

    for &j in &order[rank + 1..] {
      if suppressed[j] {
        continue;
      }
      if iou(&candidates[i].bbox, &candidates[j].bbox) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  keep.sort_unstable();
  keep
}
