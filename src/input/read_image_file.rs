// 该文件是 Xiaotu （小图） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFrame,
  preprocess::{PreprocessError, decode},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] PreprocessError),
}

pub struct ImageFileInput {
  frame: Option<ImageFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url.path();
    info!("读取图像文件: {}", path);
    let bytes = std::fs::read(path)?;
    let image = decode(&bytes)?;

    Ok(ImageFileInput {
      frame: Some(ImageFrame {
        source: path.to_string(),
        index: 0,
        image,
      }),
    })
  }
}

impl IntoIterator for ImageFileInput {
  type Item = ImageFrame;
  type IntoIter = ImageFileInputIter;

  fn into_iter(self) -> Self::IntoIter {
    ImageFileInputIter { inner: self }
  }
}

pub struct ImageFileInputIter {
  inner: ImageFileInput,
}

impl Iterator for ImageFileInputIter {
  type Item = ImageFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.frame.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn yields_single_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thumb.jpg");
    RgbImage::from_pixel(16, 9, Rgb([200, 10, 10])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut frames = ImageFileInput::from_url(&url).unwrap().into_iter();
    let frame = frames.next().unwrap();
    assert_eq!((frame.image.width(), frame.image.height()), (16, 9));
    assert_eq!(frame.source, path.display().to_string());
    assert!(frames.next().is_none());
  }

  #[test]
  fn undecodable_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"\x89PNG but not really").unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::ImageLoadError(PreprocessError::Decode(_)))
    ));
  }

  #[test]
  fn missing_file_fails() {
    let url = Url::parse("image:///definitely/not/here.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
