// 该文件是 Kiosk Detect 项目的一部分。
// src/model/label.rs - 类别标签表
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

pub const COCO_CLASS_NUM: usize = 80;

/// COCO 中的车辆类别：car、motorcycle、bus、truck
pub const COCO_VEHICLE_CLASSES: [usize; 4] = [2, 3, 5, 7];

/// 未知类别的占位标签
pub const UNKNOWN_LABEL: &str = "unknown";

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; COCO_CLASS_NUM] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 有序的类别标签表，类别 ID 即下标
pub trait WithLabel {
  fn label_of(&self, class_id: usize) -> &str;
}

/// 固定的 COCO 80 类标签表
#[derive(Debug, Clone, Copy, Default)]
pub struct CocoLabel;

impl WithLabel for CocoLabel {
  fn label_of(&self, class_id: usize) -> &str {
    COCO_CLASSES.get(class_id).copied().unwrap_or(UNKNOWN_LABEL)
  }
}

/// 自定义标签表，例如只训练了车牌与车辆的模型
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
  labels: Vec<String>,
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

impl LabelTable {
  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl WithLabel for LabelTable {
  fn label_of(&self, class_id: usize) -> &str {
    self
      .labels
      .get(class_id)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_lookup() {
    assert_eq!(CocoLabel.label_of(0), "person");
    assert_eq!(CocoLabel.label_of(2), "car");
    assert_eq!(CocoLabel.label_of(79), "toothbrush");
    assert_eq!(CocoLabel.label_of(80), UNKNOWN_LABEL);
  }

  #[test]
  fn vehicle_classes_are_vehicles() {
    let labels: Vec<&str> = COCO_VEHICLE_CLASSES
      .iter()
      .map(|&id| CocoLabel.label_of(id))
      .collect();
    assert_eq!(labels, vec!["car", "motorcycle", "bus", "truck"]);
  }

  #[test]
  fn custom_table_falls_back_to_unknown() {
    let table: LabelTable = ["plate", "vehicle"].into_iter().collect();
    assert_eq!(table.len(), 2);
    assert_eq!(table.label_of(1), "vehicle");
    assert_eq!(table.label_of(2), UNKNOWN_LABEL);
  }
}
