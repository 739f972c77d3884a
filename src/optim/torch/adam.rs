/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-19 15:30:00
 * @Description  : Adam / AdamW 优化器
 */

use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::{
    Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param, prepare_grad,
};
use crate::param::{ParamId, ParamStore};

/// 权重衰减的施加方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightDecayMode {
    /// 加到梯度上（Adam）
    L2,
    /// 直接作用于参数：θ = θ * (1 - α * λ)（AdamW）
    Decoupled,
}

/// 单个参数的矩估计
#[derive(Debug, Clone)]
pub(crate) struct AdamSlot {
    pub step: i32,
    pub exp_avg: ArrayD<f32>,
    pub exp_avg_sq: ArrayD<f32>,
    pub max_exp_avg_sq: Option<ArrayD<f32>>,
}

impl AdamSlot {
    pub fn zeros(shape: &[usize], amsgrad: bool) -> Self {
        Self {
            step: 0,
            exp_avg: ArrayD::zeros(shape),
            exp_avg_sq: ArrayD::zeros(shape),
            max_exp_avg_sq: amsgrad.then(|| ArrayD::zeros(shape)),
        }
    }
}

/// Adam 优化器
///
/// Adam: Adaptive Moment Estimation
/// - m = β1 * m + (1 - β1) * g
/// - v = β2 * v + (1 - β2) * g²
/// - θ = θ - α * `m_hat` / (√`v_hat` + ε)
///
/// `AdamW` 与之相同，只是权重衰减采用 [`WeightDecayMode::Decoupled`]。
#[derive(Debug, Clone)]
pub struct Adam {
    state: OptimizerState,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    amsgrad: bool,
    maximize: bool,
    decay_mode: WeightDecayMode,
    slots: HashMap<ParamId, AdamSlot>,
}

impl Adam {
    pub const CONFIG_KEYS: &'static [&'static str] =
        &["lr", "betas", "eps", "weight_decay", "amsgrad", "maximize"];

    /// 创建默认配置的 Adam（β=(0.9, 0.999)，ε=1e-8）
    pub fn new(groups: Vec<ParamGroup>, lr: f32) -> Result<Self, OptimError> {
        Self::new_with_config(groups, lr, (0.9, 0.999), 1e-8, 0.0, WeightDecayMode::L2)
    }

    /// 创建带完整配置的 Adam
    pub fn new_with_config(
        groups: Vec<ParamGroup>,
        lr: f32,
        betas: (f32, f32),
        epsilon: f32,
        weight_decay: f32,
        decay_mode: WeightDecayMode,
    ) -> Result<Self, OptimError> {
        check_betas(betas)?;
        check_hyper_param("eps", epsilon, ComparisonOperator::GreaterOrEqual, 0.0)?;
        Ok(Self {
            state: OptimizerState::new(groups, lr, weight_decay)?,
            beta1: betas.0,
            beta2: betas.1,
            epsilon,
            amsgrad: false,
            maximize: false,
            decay_mode,
            slots: HashMap::new(),
        })
    }

    pub const fn with_amsgrad(mut self, amsgrad: bool) -> Self {
        self.amsgrad = amsgrad;
        self
    }

    pub const fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    pub fn from_config(
        groups: Vec<ParamGroup>,
        cfg: &OptimizerConfig,
        decay_mode: WeightDecayMode,
    ) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        let default_decay = match decay_mode {
            WeightDecayMode::L2 => 0.0,
            WeightDecayMode::Decoupled => 1e-2,
        };
        Ok(Self::new_with_config(
            groups,
            cfg.get_f32("lr", 1e-3)?,
            cfg.get_pair("betas", (0.9, 0.999))?,
            cfg.get_f32("eps", 1e-8)?,
            cfg.get_f32("weight_decay", default_decay)?,
            decay_mode,
        )?
        .with_amsgrad(cfg.get_bool("amsgrad", false)?)
        .with_maximize(cfg.get_bool("maximize", false)?))
    }

    /// 获取指定参数的一阶矩 m
    pub fn get_momentum(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.slots.get(&id).map(|s| &s.exp_avg)
    }

    /// 获取指定参数的二阶矩 v
    pub fn get_velocity(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.slots.get(&id).map(|s| &s.exp_avg_sq)
    }

    /// 获取指定参数已更新的步数
    pub fn timestep(&self, id: ParamId) -> usize {
        self.slots.get(&id).map_or(0, |s| s.step as usize)
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &str {
        match self.decay_mode {
            WeightDecayMode::L2 => "Adam",
            WeightDecayMode::Decoupled => "AdamW",
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
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            // Adam 把衰减加到梯度上，AdamW 直接衰减参数
            let l2 = match self.decay_mode {
                WeightDecayMode::L2 => hyper.weight_decay,
                WeightDecayMode::Decoupled => {
                    value.mapv_inplace(|p| p * (1.0 - hyper.lr * hyper.weight_decay));
                    0.0
                }
            };
            let grad = prepare_grad(grad, value, self.maximize, l2);

            let slot = self
                .slots
                .entry(hyper.id)
                .or_insert_with(|| AdamSlot::zeros(grad.shape(), self.amsgrad));
            slot.step += 1;

            // 原地更新一阶矩 m = β1 * m + (1 - β1) * g 与二阶矩 v = β2 * v + (1 - β2) * g²
            Zip::from(&mut slot.exp_avg)
                .and(&mut slot.exp_avg_sq)
                .and(&grad)
                .for_each(|m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                });

            // 偏差修正
            let bias_correction1 = 1.0 - beta1.powi(slot.step);
            let bias_correction2_sqrt = (1.0 - beta2.powi(slot.step)).sqrt();
            let step_size = hyper.lr / bias_correction1;

            // amsgrad 使用历史最大的二阶矩
            let second_moment = match slot.max_exp_avg_sq.as_mut() {
                Some(max) => {
                    Zip::from(&mut *max)
                        .and(&slot.exp_avg_sq)
                        .for_each(|mx, &v| *mx = mx.max(v));
                    &*max
                }
                None => &slot.exp_avg_sq,
            };

            // 参数更新: θ = θ - α * m_hat / (√v_hat + ε)
            Zip::from(value)
                .and(&slot.exp_avg)
                .and(second_moment)
                .for_each(|p, &m, &v| {
                    *p -= step_size * m / (v.sqrt() / bias_correction2_sqrt + eps);
                });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

pub(crate) fn check_betas(betas: (f32, f32)) -> Result<(), OptimError> {
    check_hyper_param("betas[0]", betas.0, ComparisonOperator::GreaterOrEqual, 0.0)?;
    check_hyper_param("betas[0]", betas.0, ComparisonOperator::LessThan, 1.0)?;
    check_hyper_param("betas[1]", betas.1, ComparisonOperator::GreaterOrEqual, 0.0)?;
    check_hyper_param("betas[1]", betas.1, ComparisonOperator::LessThan, 1.0)
}

pub(crate) fn build_adam(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adam::from_config(groups, cfg, WeightDecayMode::L2)?))
}

pub(crate) fn build_adamw(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adam::from_config(
        groups,
        cfg,
        WeightDecayMode::Decoupled,
    )?))
}
