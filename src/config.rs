// 该文件是 Kiosk Detect 项目的一部分。
// src/config.rs - 检测器参数配置
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
use url::Url;

use crate::model::COCO_CLASS_NUM;

/// 模型输入边长
pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.4;
/// 输入边长上限，超过后单帧张量过大
pub const MAX_INPUT_SIZE: u32 = 4096;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("阈值 {key} 超出 [0, 1] 范围: {value}")]
  ThresholdOutOfRange { key: &'static str, value: f32 },
  #[error("{key} 必须大于 0")]
  Zero { key: &'static str },
  #[error("输入边长 {value} 超过上限 {max}")]
  InputTooLarge { value: u32, max: u32 },
  #[error("类别 {class_id} 超出类别数量 {num_classes}")]
  ClassOutOfRange { class_id: usize, num_classes: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  /// 模型输入边长，帧会被拉伸为 `input_size x input_size`
  pub input_size: u32,
  /// 类别数量，每行输出宽度为 `4 + num_classes`
  pub num_classes: usize,
  /// 置信度阈值，降低后更多低置信度候选框进入抑制
  pub confidence_threshold: f32,
  /// NMS IoU 阈值，降低后重叠框的抑制更激进
  pub nms_iou_threshold: f32,
  /// 只保留这些类别，`None` 表示全部保留
  ///
  /// 过滤发生在 NMS 之后，被其他类别抑制的框不会因此恢复。
  pub allowed_classes: Option<Vec<usize>>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      num_classes: COCO_CLASS_NUM,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
      allowed_classes: None,
    }
  }
}

impl DetectorConfig {
  pub fn with_input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_nms_iou_threshold(mut self, threshold: f32) -> Self {
    self.nms_iou_threshold = threshold;
    self
  }

  pub fn with_classes<I: IntoIterator<Item = usize>>(mut self, classes: I) -> Self {
    self.allowed_classes = Some(classes.into_iter().collect());
    self
  }

  pub fn allows(&self, class_id: usize) -> bool {
    self
      .allowed_classes
      .as_ref()
      .map(|classes| classes.contains(&class_id))
      .unwrap_or(true)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_size == 0 {
      return Err(ConfigError::Zero { key: "size" });
    }
    if self.input_size > MAX_INPUT_SIZE {
      return Err(ConfigError::InputTooLarge {
        value: self.input_size,
        max: MAX_INPUT_SIZE,
      });
    }
    if self.num_classes == 0 {
      return Err(ConfigError::Zero { key: "num_classes" });
    }
    for (key, value) in [
      ("confidence", self.confidence_threshold),
      ("iou", self.nms_iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { key, value });
      }
    }
    if let Some(classes) = &self.allowed_classes
      && let Some(&class_id) = classes.iter().find(|&&c| c >= self.num_classes)
    {
      return Err(ConfigError::ClassOutOfRange {
        class_id,
        num_classes: self.num_classes,
      });
    }
    Ok(())
  }

  /// 从模型 URL 的查询参数覆盖默认值
  ///
  /// 例如 `onnx:///models/yolov8n.onnx?confidence=0.6&iou=0.45&classes=2,3,5,7`，
  /// 支持的键：`confidence`、`iou`、`size`、`num_classes`、`classes`，其余键忽略。
  pub fn from_url(url: &Url) -> Result<Self, ConfigError> {
    let mut config = Self::default();

    for (k, v) in url.query_pairs() {
      let invalid = || ConfigError::InvalidValue {
        key: k.to_string(),
        value: v.to_string(),
      };
      match k.as_ref() {
        "confidence" => config.confidence_threshold = v.parse().map_err(|_| invalid())?,
        "iou" => config.nms_iou_threshold = v.parse().map_err(|_| invalid())?,
        "size" => config.input_size = v.parse().map_err(|_| invalid())?,
        "num_classes" => config.num_classes = v.parse().map_err(|_| invalid())?,
        "classes" => {
          let classes = v
            .split(',')
            .map(|c| c.trim().parse())
            .collect::<Result<Vec<usize>, _>>()
            .map_err(|_| invalid())?;
          config.allowed_classes = Some(classes);
        }
        _ => {}
      }
    }

    config.validate()?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_model_wire_format() {
    let config = DetectorConfig::default();
    assert_eq!(config.input_size, 640);
    assert_eq!(config.num_classes, 80);
    assert_eq!(config.confidence_threshold, 0.5);
    assert_eq!(config.nms_iou_threshold, 0.4);
    assert_eq!(config.allowed_classes, None);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn query_pairs_override_defaults() {
    let url = Url::parse("onnx:///models/yolov8n.onnx?confidence=0.25&iou=0.6&record").unwrap();
    let config = DetectorConfig::from_url(&url).unwrap();
    assert_eq!(config.confidence_threshold, 0.25);
    assert_eq!(config.nms_iou_threshold, 0.6);
    assert_eq!(config.input_size, 640);
  }

  #[test]
  fn unparseable_value_is_rejected() {
    let url = Url::parse("onnx:///m.onnx?size=big").unwrap();
    assert_eq!(
      DetectorConfig::from_url(&url).unwrap_err(),
      ConfigError::InvalidValue {
        key: "size".to_string(),
        value: "big".to_string()
      }
    );
  }

  #[test]
  fn threshold_out_of_range_is_rejected() {
    let url = Url::parse("onnx:///m.onnx?iou=1.5").unwrap();
    assert!(matches!(
      DetectorConfig::from_url(&url),
      Err(ConfigError::ThresholdOutOfRange { key: "iou", .. })
    ));
  }

  #[test]
  fn class_list_is_parsed_from_query() {
    let url = Url::parse("onnx:///m.onnx?classes=2,3,5,7").unwrap();
    let config = DetectorConfig::from_url(&url).unwrap();
    assert_eq!(config.allowed_classes, Some(vec![2, 3, 5, 7]));
    assert!(config.allows(5));
    assert!(!config.allows(0));
    assert!(DetectorConfig::default().allows(0));
  }

  #[test]
  fn bad_class_list_is_rejected() {
    let url = Url::parse("onnx:///m.onnx?classes=2,car").unwrap();
    assert!(matches!(
      DetectorConfig::from_url(&url),
      Err(ConfigError::InvalidValue { .. })
    ));

    let url = Url::parse("onnx:///m.onnx?num_classes=3&classes=2,5").unwrap();
    assert_eq!(
      DetectorConfig::from_url(&url).unwrap_err(),
      ConfigError::ClassOutOfRange {
        class_id: 5,
        num_classes: 3
      }
    );
  }

  #[test]
  fn oversized_input_is_rejected() {
    let url = Url::parse("onnx:///m.onnx?size=100000").unwrap();
    assert_eq!(
      DetectorConfig::from_url(&url).unwrap_err(),
      ConfigError::InputTooLarge {
        value: 100000,
        max: MAX_INPUT_SIZE
      }
    );
    assert!(
      DetectorConfig::default()
        .with_input_size(MAX_INPUT_SIZE)
        .validate()
        .is_ok()
    );
  }
}
