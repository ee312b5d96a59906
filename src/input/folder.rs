// 该文件是 Xiaotu （小图） 项目的一部分。
// src/input/folder.rs - 目录图像输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::ImageFrame, preprocess::decode};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum FolderInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名顺序逐张读取目录中的图像（不递归）
pub struct FolderInput {
  files: Vec<PathBuf>,
}

impl FromUrlWithScheme for FolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderInput {
  type Error = FolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FolderInputError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

impl FolderInput {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, FolderInputError> {
    let directory = directory.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(Self { files })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

impl IntoIterator for FolderInput {
  type Item = ImageFrame;
  type IntoIter = FolderInputIter;

  fn into_iter(self) -> Self::IntoIter {
    FolderInputIter {
      files: self.files.into_iter(),
      index: 0,
    }
  }
}

pub struct FolderInputIter {
  files: std::vec::IntoIter<PathBuf>,
  index: u64,
}

impl Iterator for FolderInputIter {
  type Item = ImageFrame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.files.by_ref() {
      let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
          warn!("无法读取图像文件: {}, 错误: {}", path.display(), e);
          continue;
        }
      };
      match decode(&bytes) {
        Ok(image) => {
          let frame = ImageFrame {
            source: path.display().to_string(),
            index: self.index,
            image,
          };
          self.index += 1;
          debug!("读取第 {} 张图像: {}", frame.index, frame.source);
          return Some(frame);
        }
        Err(e) => warn!("跳过无法解码的图像: {}, 错误: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn walks_images_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
      .save(dir.path().join("a.PNG"))
      .unwrap();
    std::fs::write(dir.path().join("c.jpg"), b"broken").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();

    let input = FolderInput::open(dir.path()).unwrap();
    assert_eq!(input.len(), 3);

    let frames: Vec<ImageFrame> = input.into_iter().collect();
    assert_eq!(frames.len(), 2);
    assert!(frames[0].source.ends_with("a.PNG"));
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[0].image.width(), 4);
    assert!(frames[1].source.ends_with("b.png"));
    assert_eq!(frames[1].index, 1);
  }

  #[test]
  fn missing_directory_fails() {
    assert!(matches!(
      FolderInput::open("/definitely/not/a/dir"),
      Err(FolderInputError::IoError(_))
    ));
  }
}
