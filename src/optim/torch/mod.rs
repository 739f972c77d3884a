/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 内置优化器（PyTorch 风格），由 `register_torch_optimizers` 注册
 */

mod adafactor;
mod adam;
mod adam_variants;
mod adaptive;
mod rprop;
mod sgd;

pub use adafactor::Adafactor;
pub use adam::{Adam, WeightDecayMode};
pub use adam_variants::{Adamax, NAdam, RAdam};
pub use adaptive::{Adadelta, Adagrad, RMSprop};
pub use rprop::{ASGD, Rprop};
pub use sgd::SGD;

#[cfg(any(feature = "bitsandbytes", feature = "sophia"))]
pub(crate) use adam::check_betas;

use crate::registry::OptimizerEntry;

/// 内置优化器的注册名与构造函数（按名称排序）
///
/// Adafactor 以 `TorchAdafactor` 注册，以免与其它后端的同名实现冲突。
pub fn builtin_entries() -> Vec<OptimizerEntry> {
    vec![
        OptimizerEntry::new("ASGD", rprop::build_asgd),
        OptimizerEntry::new("Adadelta", adaptive::build_adadelta),
        OptimizerEntry::new("Adagrad", adaptive::build_adagrad),
        OptimizerEntry::new("Adam", adam::build_adam),
        OptimizerEntry::new("AdamW", adam::build_adamw),
        OptimizerEntry::new("Adamax", adam_variants::build_adamax),
        OptimizerEntry::new("NAdam", adam_variants::build_nadam),
        OptimizerEntry::new("RAdam", adam_variants::build_radam),
        OptimizerEntry::new("RMSprop", adaptive::build_rmsprop),
        OptimizerEntry::new("Rprop", rprop::build_rprop),
        OptimizerEntry::new("SGD", sgd::build),
        OptimizerEntry::new("TorchAdafactor", adafactor::build),
    ]
}
