/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-19 15:30:00
 * @Description  : Sophia 后端：SophiaG（二阶裁剪优化器）
 *
 * 仅在启用 `sophia` feature 时编译，由 `register_sophia_optimizers` 注册。
 */

use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::torch::check_betas;
use crate::optim::{
    Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param, prepare_grad,
};
use crate::param::{ParamId, ParamStore};
use crate::registry::OptimizerEntry;

#[derive(Debug, Clone)]
struct SophiaSlot {
    step: usize,
    exp_avg: ArrayD<f32>,
    hessian: ArrayD<f32>,
}

/// SophiaG
///
/// - m = β1 * m + (1 - β1) * g
/// - 每 `hessian_interval` 步：h = β2 * h + (1 - β2) * g²（Gauss-Newton-Bartlett 估计）
/// - θ = θ * (1 - α * λ)
/// - θ = θ - α * sign(m) * min(|m| / (ρ * bs * h + 1e-15), 1)
#[derive(Debug, Clone)]
pub struct SophiaG {
    state: OptimizerState,
    beta1: f32,
    beta2: f32,
    rho: f32,
    batch_size: f32,
    hessian_interval: usize,
    maximize: bool,
    slots: HashMap<ParamId, SophiaSlot>,
}

impl SophiaG {
    pub const CONFIG_KEYS: &'static [&'static str] = &[
        "lr",
        "betas",
        "rho",
        "weight_decay",
        "bs",
        "hessian_interval",
        "maximize",
    ];

    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        let (beta1, beta2) = cfg.get_pair("betas", (0.965, 0.99))?;
        check_betas((beta1, beta2))?;
        let rho = cfg.get_f32("rho", 0.04)?;
        check_hyper_param("rho", rho, ComparisonOperator::GreaterOrEqual, 0.0)?;
        let batch_size = cfg.get_f32("bs", 5120.0)?;
        check_hyper_param("bs", batch_size, ComparisonOperator::GreaterThan, 0.0)?;
        let hessian_interval = cfg.get_usize("hessian_interval", 10)?;
        check_hyper_param(
            "hessian_interval",
            hessian_interval as f32,
            ComparisonOperator::GreaterOrEqual,
            1.0,
        )?;
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-4)?,
                cfg.get_f32("weight_decay", 1e-1)?,
            )?,
            beta1,
            beta2,
            rho,
            batch_size,
            hessian_interval,
            maximize: cfg.get_bool("maximize", false)?,
            slots: HashMap::new(),
        })
    }

    /// 指定参数的对角 Hessian 估计
    pub fn hessian(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.slots.get(&id).map(|s| &s.hessian)
    }
}

impl Optimizer for SophiaG {
    fn name(&self) -> &str {
        "SophiaG"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (beta1, beta2) = (self.beta1, self.beta2);
        let scale = self.rho * self.batch_size;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, self.maximize, 0.0);
            let slot = self.slots.entry(hyper.id).or_insert_with(|| SophiaSlot {
                step: 0,
                exp_avg: ArrayD::zeros(grad.shape()),
                hessian: ArrayD::zeros(grad.shape()),
            });

            // 按间隔刷新 Hessian 估计
            if slot.step % self.hessian_interval == 0 {
                Zip::from(&mut slot.hessian)
                    .and(&grad)
                    .for_each(|h, &g| *h = beta2 * *h + (1.0 - beta2) * g * g);
            }
            slot.step += 1;

            // 解耦权重衰减: θ = θ * (1 - α * λ)
            if hyper.weight_decay != 0.0 {
                value.mapv_inplace(|p| p * (1.0 - hyper.lr * hyper.weight_decay));
            }

            let lr = hyper.lr;
            Zip::from(value)
                .and(&mut slot.exp_avg)
                .and(&slot.hessian)
                .and(&grad)
                .for_each(|p, m, &h, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    // 逐坐标裁剪后的更新幅度
                    let ratio = (m.abs() / (scale * h + 1e-15)).min(1.0);
                    if *m > 0.0 {
                        *p -= lr * ratio;
                    } else if *m < 0.0 {
                        *p += lr * ratio;
                    }
                });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

fn build_sophia_g(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(SophiaG::from_config(groups, cfg)?))
}

/// 本后端提供的优化器
pub fn entries() -> Vec<OptimizerEntry> {
    vec![OptimizerEntry::new("SophiaG", build_sophia_g)]
}
