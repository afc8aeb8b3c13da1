// 该文件是 Kiosk Detect 项目的一部分。
// src/geometry.rs - 边界框几何运算
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

/// 角点格式的边界框 `[x_min, y_min, x_max, y_max]`
pub type BBox = [f32; 4];

/// 边界框面积，退化或反向的框面积为 0
pub fn area(bbox: &BBox) -> f32 {
  (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0)
}

/// 两个边界框的重叠面积
pub fn intersection_area(a: &BBox, b: &BBox) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
}

/// 交并比，并集面积为 0 时返回 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let intersection = intersection_area(a, b);
  let union = area(a) + area(b) - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
