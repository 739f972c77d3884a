/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-19 15:30:00
 * @Description  : SGD（带动量/Nesterov）优化器
 */

use std::collections::HashMap;

use ndarray::ArrayD;

use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::{
    Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param, prepare_grad,
};
use crate::param::{ParamId, ParamStore};

/// SGD 优化器
///
/// 随机梯度下降：θ = θ - α * ∇θ
///
/// 启用动量时：b = μ * b + (1 - τ) * g，θ = θ - α * b
/// （Nesterov：θ = θ - α * (g + μ * b)）
#[derive(Debug, Clone)]
pub struct SGD {
    state: OptimizerState,
    momentum: f32,
    dampening: f32,
    nesterov: bool,
    maximize: bool,
    /// 动量缓冲（按 `ParamId` 索引）
    momentum_buffers: HashMap<ParamId, ArrayD<f32>>,
}

impl SGD {
    pub const CONFIG_KEYS: &'static [&'static str] = &[
        "lr",
        "momentum",
        "dampening",
        "weight_decay",
        "nesterov",
        "maximize",
    ];

    /// 创建不带动量的 SGD
    pub fn new(groups: Vec<ParamGroup>, lr: f32) -> Result<Self, OptimError> {
        Self::new_with_config(groups, lr, 0.0, 0.0, 0.0, false, false)
    }

    /// 创建带完整配置的 SGD
    pub fn new_with_config(
        groups: Vec<ParamGroup>,
        lr: f32,
        momentum: f32,
        dampening: f32,
        weight_decay: f32,
        nesterov: bool,
        maximize: bool,
    ) -> Result<Self, OptimError> {
        check_hyper_param("momentum", momentum, ComparisonOperator::GreaterOrEqual, 0.0)?;
        if nesterov {
            // Nesterov 需要动量且不能有阻尼
            check_hyper_param("momentum", momentum, ComparisonOperator::GreaterThan, 0.0)?;
            check_hyper_param("dampening", dampening, ComparisonOperator::LessOrEqual, 0.0)?;
        }
        Ok(Self {
            state: OptimizerState::new(groups, lr, weight_decay)?,
            momentum,
            dampening,
            nesterov,
            maximize,
            momentum_buffers: HashMap::new(),
        })
    }

    pub fn from_config(
        groups: Vec<ParamGroup>,
        cfg: &OptimizerConfig,
    ) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        Self::new_with_config(
            groups,
            cfg.get_f32("lr", 1e-3)?,
            cfg.get_f32("momentum", 0.0)?,
            cfg.get_f32("dampening", 0.0)?,
            cfg.get_f32("weight_decay", 0.0)?,
            cfg.get_bool("nesterov", false)?,
            cfg.get_bool("maximize", false)?,
        )
    }

    pub fn momentum_buffer(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.momentum_buffers.get(&id)
    }
}

impl Optimizer for SGD {
    fn name(&self) -> &str {
        "SGD"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            // 取反（maximize）并叠加 L2 权重衰减: g = g + λ * θ
            let mut grad = prepare_grad(grad, value, self.maximize, hyper.weight_decay);

            // 动量: b = μ * b + (1 - τ) * g
            if self.momentum != 0.0 {
                let (momentum, dampening) = (self.momentum, self.dampening);
                // 第一步直接以梯度作为缓冲
                let buf = self
                    .momentum_buffers
                    .entry(hyper.id)
                    .and_modify(|buf| {
                        *buf *= momentum;
                        buf.scaled_add(1.0 - dampening, &grad);
                    })
                    .or_insert_with(|| grad.clone());
                // Nesterov: g = g + μ * b；否则 g = b
                if self.nesterov {
                    grad.scaled_add(momentum, &*buf);
                } else {
                    grad.assign(&*buf);
                }
            }

            // 参数更新: θ = θ - α * g
            value.scaled_add(-hyper.lr, &grad);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.momentum_buffers.clear();
    }
}

pub(crate) fn build(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(SGD::from_config(groups, cfg)?))
}
