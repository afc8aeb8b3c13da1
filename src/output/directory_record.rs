// 该文件是 Kiosk Detect 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use image::GenericImageView;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{FromUrl, FromUrlWithScheme, model::Detection, output::Render};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  frame: u64,
  timestamp: DateTime<Utc>,
  width: u32,
  height: u32,
  detections: &'a [Detection],
}

/// 每帧一行 JSON，按天写入 `<dir>/YYYY-MM-DD.jsonl`，`record:///path?always`
///
/// 默认只记录有检测结果的帧，带 `always` 参数时空帧也记录。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: Mutex<u64>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u64 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    *counter += 1;
    *counter
  }

  fn record_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    if !self.directory.exists() {
      std::fs::create_dir_all(&self.directory)?;
    }
    Ok(
      self
        .directory
        .join(format!("{}.jsonl", now.format("%Y-%m-%d"))),
    )
  }
}

impl<F: GenericImageView> Render<F> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &F, detections: &[Detection]) -> Result<(), Self::Error> {
    let frame_id = self.frame_id();
    if !self.always && detections.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let (width, height) = frame.dimensions();
    let record = FrameRecord {
      frame: frame_id,
      timestamp: now,
      width,
      height,
      detections,
    };

    let path = self.record_path(&now)?;
    let mut line = serde_json::to_string(&record)?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(line.as_bytes())?;
    debug!("记录第 {} 帧到 {}", frame_id, path.display());

    Ok(())
  }
}
