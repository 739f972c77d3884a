/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : bitsandbytes 风格后端：优化器状态分块量化为 8-bit
 *
 * 仅在启用 `bitsandbytes` feature 时编译，由 `register_bitsandbytes_optimizers` 注册。
 */

mod adam;
mod lion;
mod quantize;

pub use adam::Adam;
pub use lion::Lion;
pub use quantize::{BLOCK_SIZE, QuantizedState, StateBuffer};

use crate::errors::OptimError;
use crate::optim::torch::WeightDecayMode;
use crate::optim::{Optimizer, OptimizerConfig, ParamGroup};
use crate::registry::OptimizerEntry;

/// 元素数少于该值的参数始终使用 32-bit 状态
pub const DEFAULT_MIN_8BIT_SIZE: usize = 4096;

/// 状态精度选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateOptions {
    pub optim_bits: u8,
    pub min_8bit_size: usize,
}

impl StateOptions {
    /// 解析`optim_bits`、`min_8bit_size`，并检查配置项；`force_8bit`用于 *8bit 变体
    fn from_config(
        cfg: &OptimizerConfig,
        force_8bit: bool,
        extra_keys: &[&str],
    ) -> Result<Self, OptimError> {
        let mut keys = vec!["lr", "weight_decay", "min_8bit_size"];
        if !force_8bit {
            keys.push("optim_bits");
        }
        keys.extend_from_slice(extra_keys);
        cfg.check_keys(&keys)?;

        let optim_bits = if force_8bit {
            8
        } else {
            match cfg.get_usize("optim_bits", 32)? {
                8 => 8,
                32 => 32,
                other => {
                    return Err(OptimError::InvalidConfig {
                        key: "optim_bits".to_string(),
                        message: format!("只支持8或32，实际为{other}"),
                    });
                }
            }
        };
        Ok(Self {
            optim_bits,
            min_8bit_size: cfg.get_usize("min_8bit_size", DEFAULT_MIN_8BIT_SIZE)?,
        })
    }

    /// 元素数为`numel`的参数是否使用 8-bit 状态
    const fn quantize(&self, numel: usize) -> bool {
        self.optim_bits == 8 && numel >= self.min_8bit_size
    }
}

fn build_adam(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adam::from_config(groups, cfg, WeightDecayMode::L2, false)?))
}

fn build_adamw(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adam::from_config(groups, cfg, WeightDecayMode::Decoupled, false)?))
}

fn build_adam8bit(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adam::from_config(groups, cfg, WeightDecayMode::L2, true)?))
}

fn build_adamw8bit(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adam::from_config(groups, cfg, WeightDecayMode::Decoupled, true)?))
}

fn build_lion(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Lion::from_config(groups, cfg, false)?))
}

fn build_lion8bit(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Lion::from_config(groups, cfg, true)?))
}

/// 本后端提供的优化器；`Adam`、`AdamW` 与内置同名，注册时会改名为 `bnb_Adam`、`bnb_AdamW`
pub fn entries() -> Vec<OptimizerEntry> {
    vec![
        OptimizerEntry::new("Adam", build_adam),
        OptimizerEntry::new("AdamW", build_adamw),
        OptimizerEntry::new("Adam8bit", build_adam8bit),
        OptimizerEntry::new("AdamW8bit", build_adamw8bit),
        OptimizerEntry::new("Lion", build_lion),
        OptimizerEntry::new("Lion8bit", build_lion8bit),
    ]
}
