/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : Adam 变体：Adamax、NAdam、RAdam
 */

use std::collections::HashMap;

use ndarray::Zip;

use super::adam::{AdamSlot, check_betas};
use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::{
    Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param, prepare_grad,
};
use crate::param::{ParamId, ParamStore};

const CONFIG_KEYS: &[&str] = &["lr", "betas", "eps", "weight_decay", "maximize"];

/// Adam 族共用的超参数
#[derive(Debug, Clone, Copy)]
struct Moments {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    maximize: bool,
}

impl Moments {
    fn from_config(cfg: &OptimizerConfig, eps: f32) -> Result<Self, OptimError> {
        let (beta1, beta2) = cfg.get_pair("betas", (0.9, 0.999))?;
        check_betas((beta1, beta2))?;
        let epsilon = cfg.get_f32("eps", eps)?;
        check_hyper_param("eps", epsilon, ComparisonOperator::GreaterOrEqual, 0.0)?;
        Ok(Self {
            beta1,
            beta2,
            epsilon,
            maximize: cfg.get_bool("maximize", false)?,
        })
    }
}

/// Adamax：以无穷范数替代二阶矩
///
/// - m = β1 * m + (1 - β1) * g
/// - u = max(β2 * u, |g| + ε)
/// - θ = θ - α / (1 - β1^t) * m / u
#[derive(Debug, Clone)]
pub struct Adamax {
    state: OptimizerState,
    moments: Moments,
    slots: HashMap<ParamId, AdamSlot>,
}

impl Adamax {
    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(CONFIG_KEYS)?;
        Ok(Self {
            moments: Moments::from_config(cfg, 1e-8)?,
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 2e-3)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            slots: HashMap::new(),
        })
    }
}

impl Optimizer for Adamax {
    fn name(&self) -> &str {
        "Adamax"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let Moments {
            beta1,
            beta2,
            epsilon,
            maximize,
        } = self.moments;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, maximize, hyper.weight_decay);
            // exp_avg_sq 在此存放无穷范数 u
            let slot = self
                .slots
                .entry(hyper.id)
                .or_insert_with(|| AdamSlot::zeros(grad.shape(), false));
            slot.step += 1;

            Zip::from(&mut slot.exp_avg)
                .and(&mut slot.exp_avg_sq)
                .and(&grad)
                .for_each(|m, u, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *u = (beta2 * *u).max(g.abs() + epsilon);
                });

            let clr = hyper.lr / (1.0 - beta1.powi(slot.step));
            Zip::from(value)
                .and(&slot.exp_avg)
                .and(&slot.exp_avg_sq)
                .for_each(|p, &m, &u| *p -= clr * m / u);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

#[derive(Debug, Clone)]
struct NAdamSlot {
    moments: AdamSlot,
    mu_product: f32,
}

/// NAdam：带 Nesterov 动量的 Adam
#[derive(Debug, Clone)]
pub struct NAdam {
    state: OptimizerState,
    moments: Moments,
    momentum_decay: f32,
    slots: HashMap<ParamId, NAdamSlot>,
}

impl NAdam {
    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        let mut keys = CONFIG_KEYS.to_vec();
        keys.push("momentum_decay");
        cfg.check_keys(&keys)?;
        let momentum_decay = cfg.get_f32("momentum_decay", 4e-3)?;
        check_hyper_param(
            "momentum_decay",
            momentum_decay,
            ComparisonOperator::GreaterOrEqual,
            0.0,
        )?;
        Ok(Self {
            moments: Moments::from_config(cfg, 1e-8)?,
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 2e-3)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            momentum_decay,
            slots: HashMap::new(),
        })
    }
}

impl Optimizer for NAdam {
    fn name(&self) -> &str {
        "NAdam"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let Moments {
            beta1,
            beta2,
            epsilon,
            maximize,
        } = self.moments;
        let psi = self.momentum_decay;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, maximize, hyper.weight_decay);
            let slot = self.slots.entry(hyper.id).or_insert_with(|| NAdamSlot {
                moments: AdamSlot::zeros(grad.shape(), false),
                mu_product: 1.0,
            });
            slot.moments.step += 1;
            let t = slot.moments.step as f32;

            let mu = beta1 * (1.0 - 0.5 * 0.96_f32.powf(t * psi));
            let mu_next = beta1 * (1.0 - 0.5 * 0.96_f32.powf((t + 1.0) * psi));
            slot.mu_product *= mu;
            let bias_correction2 = 1.0 - beta2.powi(slot.moments.step);

            Zip::from(&mut slot.moments.exp_avg)
                .and(&mut slot.moments.exp_avg_sq)
                .and(&grad)
                .for_each(|m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                });

            let grad_coef = hyper.lr * (1.0 - mu) / (1.0 - slot.mu_product);
            let avg_coef = hyper.lr * mu_next / (1.0 - slot.mu_product * mu_next);
            Zip::from(value)
                .and(&grad)
                .and(&slot.moments.exp_avg)
                .and(&slot.moments.exp_avg_sq)
                .for_each(|p, &g, &m, &v| {
                    let denom = (v / bias_correction2).sqrt() + epsilon;
                    *p -= grad_coef * g / denom + avg_coef * m / denom;
                });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

/// RAdam：对自适应学习率的方差做整流的 Adam
///
/// 早期步数（ρ_t ≤ 5）退化为带偏差修正的动量 SGD。
#[derive(Debug, Clone)]
pub struct RAdam {
    state: OptimizerState,
    moments: Moments,
    slots: HashMap<ParamId, AdamSlot>,
}

impl RAdam {
    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(CONFIG_KEYS)?;
        Ok(Self {
            moments: Moments::from_config(cfg, 1e-8)?,
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-3)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            slots: HashMap::new(),
        })
    }
}

impl Optimizer for RAdam {
    fn name(&self) -> &str {
        "RAdam"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let Moments {
            beta1,
            beta2,
            epsilon,
            maximize,
        } = self.moments;
        let rho_inf = 2.0 / (1.0 - beta2) - 1.0;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, maximize, hyper.weight_decay);
            let slot = self
                .slots
                .entry(hyper.id)
                .or_insert_with(|| AdamSlot::zeros(grad.shape(), false));
            slot.step += 1;
            let t = slot.step;

            Zip::from(&mut slot.exp_avg)
                .and(&mut slot.exp_avg_sq)
                .and(&grad)
                .for_each(|m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                });

            let bias_correction1 = 1.0 - beta1.powi(t);
            let bias_correction2 = 1.0 - beta2.powi(t);
            let rho_t = rho_inf - 2.0 * t as f32 * beta2.powi(t) / bias_correction2;
            let lr = hyper.lr;

            if rho_t > 5.0 {
                let rect = ((rho_t - 4.0) * (rho_t - 2.0) * rho_inf
                    / ((rho_inf - 4.0) * (rho_inf - 2.0) * rho_t))
                    .sqrt();
                let bc2_sqrt = bias_correction2.sqrt();
                Zip::from(value)
                    .and(&slot.exp_avg)
                    .and(&slot.exp_avg_sq)
                    .for_each(|p, &m, &v| {
                        let adaptive_lr = bc2_sqrt / (v.sqrt() + epsilon);
                        *p -= lr * m / bias_correction1 * rect * adaptive_lr;
                    });
            } else {
                Zip::from(value)
                    .and(&slot.exp_avg)
                    .for_each(|p, &m| *p -= lr * m / bias_correction1);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

macro_rules! builder_fn {
    ($fn_name:ident, $ty:ty) => {
        pub(crate) fn $fn_name(
            groups: Vec<ParamGroup>,
            cfg: &OptimizerConfig,
        ) -> Result<Box<dyn Optimizer>, OptimError> {
            Ok(Box::new(<$ty>::from_config(groups, cfg)?))
        }
    };
}

builder_fn!(build_adamax, Adamax);
builder_fn!(build_nadam, NAdam);
builder_fn!(build_radam, RAdam);
