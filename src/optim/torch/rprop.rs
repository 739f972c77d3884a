/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-19 15:30:00
 * @Description  : Rprop（弹性反向传播）与 ASGD（平均随机梯度下降）
 */

use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::{
    Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param, prepare_grad,
};
use crate::param::{ParamId, ParamStore};

#[derive(Debug, Clone)]
struct RpropSlot {
    prev: ArrayD<f32>,
    step_size: ArrayD<f32>,
}

/// Rprop：只使用梯度符号，步长按符号是否翻转做乘性调整
///
/// 符号不变：步长 × η+；符号翻转：步长 × η-，且本步不更新该坐标。
/// 步长被限制在 `step_sizes` 区间内。
#[derive(Debug, Clone)]
pub struct Rprop {
    state: OptimizerState,
    etas: (f32, f32),
    step_sizes: (f32, f32),
    maximize: bool,
    slots: HashMap<ParamId, RpropSlot>,
}

impl Rprop {
    pub const CONFIG_KEYS: &'static [&'static str] = &["lr", "etas", "step_sizes", "maximize"];

    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        let (eta_minus, eta_plus) = cfg.get_pair("etas", (0.5, 1.2))?;
        check_hyper_param("etas[0]", eta_minus, ComparisonOperator::GreaterThan, 0.0)?;
        check_hyper_param("etas[0]", eta_minus, ComparisonOperator::LessThan, 1.0)?;
        check_hyper_param("etas[1]", eta_plus, ComparisonOperator::GreaterThan, 1.0)?;
        // 步长区间须满足 0 ≤ min ≤ max
        let (step_min, step_max) = cfg.get_pair("step_sizes", (1e-6, 50.0))?;
        check_hyper_param("step_sizes[0]", step_min, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param(
            "step_sizes[1]",
            step_max,
            ComparisonOperator::GreaterOrEqual,
            step_min,
        )?;
        Ok(Self {
            state: OptimizerState::new(groups, cfg.get_f32("lr", 1e-2)?, 0.0)?,
            etas: (eta_minus, eta_plus),
            step_sizes: (step_min, step_max),
            maximize: cfg.get_bool("maximize", false)?,
            slots: HashMap::new(),
        })
    }

    /// 指定参数当前的逐坐标步长
    pub fn step_size(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.slots.get(&id).map(|s| &s.step_size)
    }
}

impl Optimizer for Rprop {
    fn name(&self) -> &str {
        "Rprop"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (eta_minus, eta_plus) = self.etas;
        let (step_min, step_max) = self.step_sizes;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, self.maximize, 0.0);
            let slot = self.slots.entry(hyper.id).or_insert_with(|| RpropSlot {
                prev: ArrayD::zeros(grad.shape()),
                step_size: ArrayD::from_elem(grad.shape(), hyper.lr),
            });

            Zip::from(value)
                .and(&grad)
                .and(&mut slot.prev)
                .and(&mut slot.step_size)
                .for_each(|p, &g, prev, size| {
                    // 与上一步梯度同号为正，变号为负
                    let sign = g * *prev;
                    let g = if sign > 0.0 {
                        *size = (*size * eta_plus).clamp(step_min, step_max);
                        g
                    } else if sign < 0.0 {
                        *size = (*size * eta_minus).clamp(step_min, step_max);
                        0.0
                    } else {
                        g
                    };
                    *p -= signum(g) * *size;
                    // 变号时记为 0，下一步不再调整步长
                    *prev = g;
                });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

/// 0 的符号记为 0（`f32::signum(0.0)` 为 1）
fn signum(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
struct AsgdSlot {
    step: i32,
    eta: f32,
    mu: f32,
    ax: ArrayD<f32>,
}

/// ASGD：SGD 的同时维护参数的 Polyak 平均
///
/// `t0` 步之后开始真正做平均，平均值可通过 [`ASGD::averaged`] 取出。
#[derive(Debug, Clone)]
pub struct ASGD {
    state: OptimizerState,
    lambd: f32,
    alpha: f32,
    t0: f32,
    maximize: bool,
    slots: HashMap<ParamId, AsgdSlot>,
}

impl ASGD {
    pub const CONFIG_KEYS: &'static [&'static str] =
        &["lr", "lambd", "alpha", "t0", "weight_decay", "maximize"];

    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-2)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            lambd: cfg.get_f32("lambd", 1e-4)?,
            alpha: cfg.get_f32("alpha", 0.75)?,
            t0: cfg.get_f32("t0", 1e6)?,
            maximize: cfg.get_bool("maximize", false)?,
            slots: HashMap::new(),
        })
    }

    /// 指定参数的平均值
    pub fn averaged(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.slots.get(&id).map(|s| &s.ax)
    }
}

impl Optimizer for ASGD {
    fn name(&self) -> &str {
        "ASGD"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (lambd, alpha, t0) = (self.lambd, self.alpha, self.t0);
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, self.maximize, hyper.weight_decay);
            let slot = self.slots.entry(hyper.id).or_insert_with(|| AsgdSlot {
                step: 0,
                eta: hyper.lr,
                mu: 1.0,
                ax: ArrayD::zeros(grad.shape()),
            });
            slot.step += 1;

            value.mapv_inplace(|p| p * (1.0 - lambd * slot.eta));
            value.scaled_add(-slot.eta, &grad);

            if slot.mu != 1.0 {
                let mu = slot.mu;
                Zip::from(&mut slot.ax)
                    .and(&*value)
                    .for_each(|a, &p| *a += (p - *a) * mu);
            } else {
                slot.ax.assign(&*value);
            }

            let t = slot.step as f32;
            slot.eta = hyper.lr / (1.0 + lambd * hyper.lr * t).powf(alpha);
            slot.mu = 1.0 / (t - t0).max(1.0);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

pub(crate) fn build_rprop(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Rprop::from_config(groups, cfg)?))
}

pub(crate) fn build_asgd(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(ASGD::from_config(groups, cfg)?))
}
