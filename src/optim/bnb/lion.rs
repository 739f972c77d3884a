/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : Lion 优化器（状态可 8-bit 量化）
 */

use std::collections::HashMap;

use ndarray::Zip;

use super::{StateBuffer, StateOptions};
use crate::errors::OptimError;
use crate::optim::torch::check_betas;
use crate::optim::{Optimizer, OptimizerConfig, OptimizerState, ParamGroup};
use crate::param::{ParamId, ParamStore};

/// Lion：只保存一阶矩，更新量取符号
///
/// - θ = θ * (1 - α * λ)
/// - θ = θ - α * sign(β1 * m + (1 - β1) * g)
/// - m = β2 * m + (1 - β2) * g
#[derive(Debug, Clone)]
pub struct Lion {
    state: OptimizerState,
    beta1: f32,
    beta2: f32,
    options: StateOptions,
    exp_avgs: HashMap<ParamId, StateBuffer>,
}

impl Lion {
    pub fn from_config(
        groups: Vec<ParamGroup>,
        cfg: &OptimizerConfig,
        force_8bit: bool,
    ) -> Result<Self, OptimError> {
        let options = StateOptions::from_config(cfg, force_8bit, &["betas"])?;
        let (beta1, beta2) = cfg.get_pair("betas", (0.9, 0.99))?;
        check_betas((beta1, beta2))?;
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-4)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            beta1,
            beta2,
            options,
            exp_avgs: HashMap::new(),
        })
    }
}

impl Optimizer for Lion {
    fn name(&self) -> &str {
        if self.options.optim_bits == 8 {
            "Lion8bit"
        } else {
            "Lion"
        }
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (beta1, beta2) = (self.beta1, self.beta2);
        let options = self.options;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            if hyper.weight_decay != 0.0 {
                value.mapv_inplace(|p| p * (1.0 - hyper.lr * hyper.weight_decay));
            }
            let buffer = self.exp_avgs.entry(hyper.id).or_insert_with(|| {
                StateBuffer::zeros(grad.shape(), options.quantize(grad.len()), true)
            });

            let mut exp_avg = buffer.load();
            let lr = hyper.lr;
            Zip::from(value)
                .and(&mut exp_avg)
                .and(grad)
                .for_each(|p, m, &g| {
                    let update = beta1 * *m + (1.0 - beta1) * g;
                    if update > 0.0 {
                        *p -= lr;
                    } else if update < 0.0 {
                        *p += lr;
                    }
                    *m = beta2 * *m + (1.0 - beta2) * g;
                });
            buffer.store(exp_avg);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.exp_avgs.clear();
    }
}
