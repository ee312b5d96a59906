// 该文件是 Xiaotu （小图） 项目的一部分。
// src/frame.rs - NCHW 张量定义
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

pub const RGB_CHANNELS: usize = 3;

/// 参考模型的输入宽度
pub const INPUT_W: u32 = 224;
/// 参考模型的输入高度
pub const INPUT_H: u32 = 224;

/// 参考模型使用的输入张量 `[1, 3, 224, 224]`
pub type ImageTensor = NchwTensor<INPUT_W, INPUT_H>;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 平面（通道优先）布局的浮点张量，逻辑形状为 `[1, 3, H, W]`。
///
/// `(c, h, w)` 位于偏移 `c * H * W + h * W + w`。
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

/// 送入推理引擎的张量借用视图
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
  pub shape: [usize; 4],
  pub data: &'a [f32],
}

impl<const W: u32, const H: u32> NchwTensor<W, H> {
  pub const LEN: usize = RGB_CHANNELS * (W as usize) * (H as usize);

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, H as usize, W as usize]
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 单个通道的连续平面
  pub fn plane(&self, channel: usize) -> &[f32] {
    let plane = (W as usize) * (H as usize);
    &self.data[channel * plane..(channel + 1) * plane]
  }

  pub fn get(&self, channel: usize, h: usize, w: usize) -> Option<f32> {
    if channel >= RGB_CHANNELS || h >= H as usize || w >= W as usize {
      return None;
    }
    let index = channel * (H as usize) * (W as usize) + h * (W as usize) + w;
    self.data.get(index).copied()
  }

  pub fn view(&self) -> TensorView<'_> {
    TensorView {
      shape: self.shape(),
      data: &self.data,
    }
  }
}

impl<const W: u32, const H: u32> Default for NchwTensor<W, H> {
  fn default() -> Self {
    let data = vec![0f32; Self::LEN].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<f32>> for NchwTensor<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameError::LengthMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> AsRef<[f32]> for NchwTensor<W, H> {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl<const W: u32, const H: u32> AsMut<[f32]> for NchwTensor<W, H> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

/// 模型原始输出，每个类别一个分数
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector {
  scores: Box<[f32]>,
}

impl ScoreVector {
  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.scores
  }
}

impl From<Vec<f32>> for ScoreVector {
  fn from(scores: Vec<f32>) -> Self {
    Self {
      scores: scores.into_boxed_slice(),
    }
  }
}

impl AsRef<[f32]> for ScoreVector {
  fn as_ref(&self) -> &[f32] {
    &self.scores
  }
}
