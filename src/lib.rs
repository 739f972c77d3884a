//! # Optim Registry
//!
//! `optim_registry`把各后端的优化器以名称注册进一个显式持有的注册表，
//! 训练配置只需写`{"type": "AdamW", "lr": 1e-3}`即可按名称构建优化器。
//!
//! - 内置优化器（SGD、Adam、AdamW、`TorchAdafactor`……）总是可用；
//! - bitsandbytes 风格的 8-bit 优化器与 SophiaG 由 cargo feature 开关，
//!   未启用时对应的注册函数返回空列表。
//!
//! ```ignore
//! let mut registry = OptimizerRegistry::new();
//! register_torch_optimizers(&mut registry);
//! let added = register_bitsandbytes_optimizers(&mut registry);
//! let optimizer = registry.build(&OptimizerConfig::new("SGD").with("lr", 0.1), groups)?;
//! ```

pub mod errors;
pub mod optim;
pub mod param;
pub mod registry;
pub mod utils;

pub use errors::OptimError;
pub use optim::{BuildConfig, OptimWrapper, Optimizer, OptimizerConfig, ParamGroup};
pub use param::{ParamId, ParamStore, Parameter};
pub use registry::{
    Capability, OptimizerEntry, OptimizerProvider, OptimizerRegistry, Registration,
    register_bitsandbytes_optimizers, register_sophia_optimizers, register_torch_optimizers,
};
