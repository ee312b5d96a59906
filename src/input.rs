// 该文件是 Xiaotu （小图） 项目的一部分。
// src/input.rs - 图像输入
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

use image::DynamicImage;
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme};

mod folder;
mod read_image_file;

pub use self::folder::{FolderInput, FolderInputError, FolderInputIter};
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, ImageFileInputIter};

/// 待分类的一张图像
#[derive(Debug, Clone)]
pub struct ImageFrame {
  /// 图像来源（文件路径）
  pub source: String,
  /// 帧索引
  pub index: u64,
  pub image: DynamicImage,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("Folder input error: {0}")]
  FolderInputError(#[from] FolderInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  Folder(FolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      FolderInput::SCHEME => Ok(InputWrapper::Folder(FolderInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl IntoIterator for InputWrapper {
  type Item = ImageFrame;
  type IntoIter = InputWrapperIter;

  fn into_iter(self) -> Self::IntoIter {
    match self {
      InputWrapper::ReadImageFile(input) => InputWrapperIter::ReadImageFile(input.into_iter()),
      InputWrapper::Folder(input) => InputWrapperIter::Folder(input.into_iter()),
    }
  }
}

pub enum InputWrapperIter {
  ReadImageFile(ImageFileInputIter),
  Folder(FolderInputIter),
}

impl Iterator for InputWrapperIter {
  type Item = ImageFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapperIter::ReadImageFile(input) => input.next(),
      InputWrapperIter::Folder(input) => input.next(),
    }
  }
}
