// 该文件是 Kiosk Detect 项目的一部分。
// src/output.rs - 检测结果输出
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

use image::GenericImageView;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::Detection};

pub trait Render<Frame> {
  type Error;
  fn render_result(&self, frame: &Frame, detections: &[Detection]) -> Result<(), Self::Error>;
}

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 只把检测结果写进日志，`log://`
#[derive(Debug, Default)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

impl<F: GenericImageView> Render<F> for LogOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &F, detections: &[Detection]) -> Result<(), Self::Error> {
    let (width, height) = frame.dimensions();
    info!("帧 {}x{}: 检测到 {} 个对象", width, height, detections.len());
    for det in detections {
      info!(
        "  - {}({}): {:.2}% at [{:.0}, {:.0}, {:.0}, {:.0}]",
        det.class_label,
        det.class_id,
        det.confidence * 100.0,
        det.bbox[0],
        det.bbox[1],
        det.bbox[2],
        det.bbox[3]
      );
    }
    Ok(())
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl<F: GenericImageView> Render<F> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, detections: &[Detection]) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_result(frame, detections),
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, detections)
        .map_err(OutputError::from),
    }
  }
}
