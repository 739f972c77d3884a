/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器状态的分块 8-bit 量化
 *
 * 每 `BLOCK_SIZE` 个元素共享一个 absmax 缩放系数：
 * - 有符号状态（一阶矩）：线性量化到 [-127, 127]
 * - 非负状态（二阶矩）：先开方再量化到 [0, 255]，以保留小值的动态范围
 */

use ndarray::{ArrayD, IxDyn};

pub const BLOCK_SIZE: usize = 256;

/// 分块量化后的张量
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedState {
    shape: Vec<usize>,
    codes: Vec<u8>,
    absmax: Vec<f32>,
    signed: bool,
}

impl QuantizedState {
    pub fn quantize(x: &ArrayD<f32>, signed: bool) -> Self {
        let data: Vec<f32> = x.iter().copied().collect();
        let mut codes = Vec::with_capacity(data.len());
        let mut absmax = Vec::with_capacity(data.len().div_ceil(BLOCK_SIZE));
        for block in data.chunks(BLOCK_SIZE) {
            let max = block.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
            absmax.push(max);
            codes.extend(block.iter().map(|&v| encode(v, max, signed)));
        }
        Self {
            shape: x.shape().to_vec(),
            codes,
            absmax,
            signed,
        }
    }

    pub fn dequantize(&self) -> ArrayD<f32> {
        let data: Vec<f32> = self
            .codes
            .chunks(BLOCK_SIZE)
            .zip(&self.absmax)
            .flat_map(|(block, &max)| block.iter().map(move |&c| decode(c, max, self.signed)))
            .collect();
        ArrayD::from_shape_vec(IxDyn(&self.shape), data)
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&self.shape)))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// 占用字节数（码字 + 每块一个 f32 缩放系数）
    pub fn nbytes(&self) -> usize {
        self.codes.len() + self.absmax.len() * std::mem::size_of::<f32>()
    }
}

fn encode(v: f32, max: f32, signed: bool) -> u8 {
    if max == 0.0 {
        return 0;
    }
    if signed {
        ((v / max) * 127.0).round().clamp(-127.0, 127.0) as i8 as u8
    } else {
        ((v.max(0.0) / max).sqrt() * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

fn decode(code: u8, max: f32, signed: bool) -> f32 {
    if signed {
        f32::from(code as i8) / 127.0 * max
    } else {
        let r = f32::from(code) / 255.0;
        r * r * max
    }
}

/// 优化器状态缓冲：32-bit 原样保存，或 8-bit 量化保存
#[derive(Debug, Clone)]
pub enum StateBuffer {
    Full(ArrayD<f32>),
    Quantized(QuantizedState),
}

impl StateBuffer {
    pub fn zeros(shape: &[usize], quantized: bool, signed: bool) -> Self {
        let zeros = ArrayD::zeros(IxDyn(shape));
        if quantized {
            Self::Quantized(QuantizedState::quantize(&zeros, signed))
        } else {
            Self::Full(zeros)
        }
    }

    /// 取出 f32 副本用于本步计算
    pub fn load(&self) -> ArrayD<f32> {
        match self {
            Self::Full(x) => x.clone(),
            Self::Quantized(q) => q.dequantize(),
        }
    }

    /// 写回本步更新后的值（量化缓冲会重新量化）
    pub fn store(&mut self, value: ArrayD<f32>) {
        match self {
            Self::Full(x) => *x = value,
            Self::Quantized(q) => *q = QuantizedState::quantize(&value, q.signed),
        }
    }

    pub const fn is_quantized(&self) -> bool {
        matches!(self, Self::Quantized(_))
    }
}
