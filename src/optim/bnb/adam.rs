/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 状态可 8-bit 量化的 Adam / AdamW
 */

use std::collections::HashMap;

use ndarray::Zip;

use super::{StateBuffer, StateOptions};
use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::torch::{WeightDecayMode, check_betas};
use crate::optim::{
    Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param, prepare_grad,
};
use crate::param::{ParamId, ParamStore};

#[derive(Debug, Clone)]
struct Slot {
    step: i32,
    exp_avg: StateBuffer,
    exp_avg_sq: StateBuffer,
}

/// Adam / AdamW，一阶、二阶矩可按块量化为 8-bit
///
/// 每步先反量化旧状态，在 f32 下完成更新并计算参数增量，再重新量化写回，
/// 因此量化误差只影响跨步保存的状态。
#[derive(Debug, Clone)]
pub struct Adam {
    state: OptimizerState,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    decay_mode: WeightDecayMode,
    options: StateOptions,
    slots: HashMap<ParamId, Slot>,
}

impl Adam {
    pub fn from_config(
        groups: Vec<ParamGroup>,
        cfg: &OptimizerConfig,
        decay_mode: WeightDecayMode,
        force_8bit: bool,
    ) -> Result<Self, OptimError> {
        let options = StateOptions::from_config(cfg, force_8bit, &["betas", "eps"])?;
        let (beta1, beta2) = cfg.get_pair("betas", (0.9, 0.999))?;
        check_betas((beta1, beta2))?;
        let epsilon = cfg.get_f32("eps", 1e-8)?;
        check_hyper_param("eps", epsilon, ComparisonOperator::GreaterOrEqual, 0.0)?;
        let default_decay = match decay_mode {
            WeightDecayMode::L2 => 0.0,
            WeightDecayMode::Decoupled => 1e-2,
        };
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-3)?,
                cfg.get_f32("weight_decay", default_decay)?,
            )?,
            beta1,
            beta2,
            epsilon,
            decay_mode,
            options,
            slots: HashMap::new(),
        })
    }

    /// 指定参数的状态是否以 8-bit 保存（仅在第一次 `step` 之后可知）
    pub fn is_quantized(&self, id: ParamId) -> Option<bool> {
        self.slots.get(&id).map(|s| s.exp_avg.is_quantized())
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &str {
        match (self.decay_mode, self.options.optim_bits) {
            (WeightDecayMode::L2, 8) => "Adam8bit",
            (WeightDecayMode::L2, _) => "Adam",
            (WeightDecayMode::Decoupled, 8) => "AdamW8bit",
            (WeightDecayMode::Decoupled, _) => "AdamW",
        }
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);
        let options = self.options;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let l2 = match self.decay_mode {
                WeightDecayMode::L2 => hyper.weight_decay,
                WeightDecayMode::Decoupled => {
                    value.mapv_inplace(|p| p * (1.0 - hyper.lr * hyper.weight_decay));
                    0.0
                }
            };
            let grad = prepare_grad(grad, value, false, l2);
            let slot = self.slots.entry(hyper.id).or_insert_with(|| {
                let quantized = options.quantize(grad.len());
                Slot {
                    step: 0,
                    exp_avg: StateBuffer::zeros(grad.shape(), quantized, true),
                    exp_avg_sq: StateBuffer::zeros(grad.shape(), quantized, false),
                }
            });
            slot.step += 1;

            let mut exp_avg = slot.exp_avg.load();
            let mut exp_avg_sq = slot.exp_avg_sq.load();
            Zip::from(&mut exp_avg)
                .and(&mut exp_avg_sq)
                .and(&grad)
                .for_each(|m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                });

            let step_size = hyper.lr / (1.0 - beta1.powi(slot.step));
            let bias_correction2_sqrt = (1.0 - beta2.powi(slot.step)).sqrt();
            Zip::from(value)
                .and(&exp_avg)
                .and(&exp_avg_sq)
                .for_each(|p, &m, &v| {
                    *p -= step_size * m / (v.sqrt() / bias_correction2_sqrt + eps);
                });

            slot.exp_avg.store(exp_avg);
            slot.exp_avg_sq.store(exp_avg_sq);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}
