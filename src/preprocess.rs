// 该文件是 Xiaotu （小图） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use image::{DynamicImage, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::{NchwTensor, RGB_CHANNELS};

/// ImageNet 统计量，必须与训练时的预处理一致
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("图像尺寸为零: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
}

/// 逐通道仿射归一化 `(v / 255 - mean[c]) / std[c]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
  pub mean: [f32; 3],
  pub std: [f32; 3],
}

impl Default for Normalize {
  fn default() -> Self {
    Self {
      mean: IMAGENET_MEAN,
      std: IMAGENET_STD,
    }
  }
}

impl Normalize {
  #[inline]
  pub fn apply(&self, channel: usize, value: u8) -> f32 {
    let scaled = value as f32 / 255.0;
    (scaled - self.mean[channel]) / self.std[channel]
  }
}

/// 将任意图像转换为 `[1, 3, H, W]` 平面张量
/// 归一化常量与模型训练时一致，不可单独修改
#[derive(Debug, Clone, Default)]
pub struct Preprocessor<const W: u32, const H: u32> {
  normalize: Normalize,
}

impl<const W: u32, const H: u32> Preprocessor<W, H> {
  pub fn preprocess(&self, image: &DynamicImage) -> Result<NchwTensor<W, H>, PreprocessError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(PreprocessError::EmptyImage { width, height });
    }

    // Alpha 通道直接丢弃
    let rgb = image.to_rgb8();
    let rgb = if (width, height) == (W, H) {
      rgb
    } else {
      debug!("缩放图像: {}x{} -> {}x{}", width, height, W, H);
      image::imageops::resize(&rgb, W, H, FilterType::Triangle)
    };

    Ok(self.to_tensor(&rgb))
  }

  /// 解码后再预处理
  pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<NchwTensor<W, H>, PreprocessError> {
    let image = decode(bytes)?;
    self.preprocess(&image)
  }

  fn to_tensor(&self, image: &RgbImage) -> NchwTensor<W, H> {
    let mut tensor = NchwTensor::<W, H>::default();
    let height = H as usize;
    let width = W as usize;
    let slice = tensor.as_mut();

    for (x, y, pixel) in image.enumerate_pixels() {
      let (w, h) = (x as usize, y as usize);
      for c in 0..RGB_CHANNELS {
        let index = c * height * width + h * width + w;
        slice[index] = self.normalize.apply(c, pixel[c]);
      }
    }
    tensor
  }
}

/// 从编码字节（PNG、JPEG、BMP、GIF、WebP）解码图像
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
  let image = image::load_from_memory(bytes)?;
  let (width, height) = (image.width(), image.height());
  if width == 0 || height == 0 {
    return Err(PreprocessError::EmptyImage { width, height });
  }
  Ok(image)
}
