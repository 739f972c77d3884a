/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器模块：Optimizer trait、参数组与各后端优化器实现
 */

mod base;
pub mod builder;
pub mod config;
pub mod torch;
mod wrapper;

#[cfg(feature = "bitsandbytes")]
pub mod bnb;
#[cfg(feature = "sophia")]
pub mod sophia;

pub use base::{Optimizer, OptimizerState, ParamGroup};
pub use builder::{BuildConfig, ClipGradConfig, CustomKey, ParamwiseConfig};
pub use config::OptimizerConfig;
pub use wrapper::{OptimWrapper, clip_grad_norm};

pub(crate) use base::{check_hyper_param, prepare_grad};

#[cfg(test)]
mod tests;
