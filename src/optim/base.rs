/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-19 15:30:00
 * @Description  : 优化器基础trait和辅助结构
 */

use std::collections::HashSet;

use ndarray::ArrayD;

use crate::errors::{ComparisonOperator, OptimError};
use crate::param::{ParamId, ParamStore};

/// 优化器核心 trait
///
/// `PyTorch` 风格训练循环：
/// ```ignore
/// optimizer.zero_grad(&mut store)?;
/// // ……由训练循环计算并写入梯度：store.set_grad(id, grad)?
/// optimizer.step(&mut store)?; // ← 只更新参数
/// ```
///
/// 学习率、参数组等公共行为由 [`OptimizerState`] 提供默认实现，
/// 具体优化器只需实现 `name`、`state`、`state_mut`、`step` 与 `reset`。
pub trait Optimizer {
    /// 优化器的算法名（与注册表中的名称无关）
    fn name(&self) -> &str;

    fn state(&self) -> &OptimizerState;

    fn state_mut(&mut self) -> &mut OptimizerState;

    /// 参数更新（使用已写入的梯度）；没有梯度的参数跳过
    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError>;

    /// 重置累积状态（如 Adam 的动量）
    fn reset(&mut self);

    /// 清零优化器绑定参数的梯度
    fn zero_grad(&self, store: &mut ParamStore) -> Result<(), OptimError> {
        for id in self.state().params() {
            store.clear_grad(id)?;
        }
        Ok(())
    }

    /// 获取（基础）学习率
    fn learning_rate(&self) -> f32 {
        self.state().learning_rate()
    }

    /// 设置（基础）学习率，参数组的`lr_mult`保持不变
    fn set_learning_rate(&mut self, lr: f32) {
        self.state_mut().set_learning_rate(lr);
    }

    fn param_groups(&self) -> &[ParamGroup] {
        self.state().groups()
    }
}

/// 参数组：一组共享学习率/权重衰减倍率的参数
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGroup {
    pub params: Vec<ParamId>,
    pub lr_mult: f32,
    pub decay_mult: f32,
}

impl ParamGroup {
    pub const fn new(params: Vec<ParamId>) -> Self {
        Self {
            params,
            lr_mult: 1.0,
            decay_mult: 1.0,
        }
    }

    pub const fn with_lr_mult(mut self, lr_mult: f32) -> Self {
        self.lr_mult = lr_mult;
        self
    }

    pub const fn with_decay_mult(mut self, decay_mult: f32) -> Self {
        self.decay_mult = decay_mult;
        self
    }
}

/// 单个参数在本次更新中实际使用的超参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ParamHyper {
    pub id: ParamId,
    pub lr: f32,
    pub weight_decay: f32,
}

/// 优化器状态管理：参数组 + 基础学习率 + 基础权重衰减
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerState {
    groups: Vec<ParamGroup>,
    learning_rate: f32,
    weight_decay: f32,
}

impl OptimizerState {
    /// 创建优化器状态
    ///
    /// 所有参数组都为空时报`EmptyParams`；同一参数重复出现（同组或跨组）时报`InvalidConfig`。
    pub fn new(
        groups: Vec<ParamGroup>,
        learning_rate: f32,
        weight_decay: f32,
    ) -> Result<Self, OptimError> {
        if groups.iter().all(|g| g.params.is_empty()) {
            return Err(OptimError::EmptyParams);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = groups
            .iter()
            .flat_map(|g| g.params.iter())
            .find(|&&id| !seen.insert(id))
        {
            return Err(OptimError::InvalidConfig {
                key: "params".to_string(),
                message: format!("参数{dup:?}在参数组中重复出现"),
            });
        }
        check_hyper_param("lr", learning_rate, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param(
            "weight_decay",
            weight_decay,
            ComparisonOperator::GreaterOrEqual,
            0.0,
        )?;
        Ok(Self {
            groups,
            learning_rate,
            weight_decay,
        })
    }

    pub fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    /// 按参数组顺序展开的所有参数
    pub fn params(&self) -> Vec<ParamId> {
        self.groups
            .iter()
            .flat_map(|g| g.params.iter().copied())
            .collect()
    }

    pub const fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub const fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }

    pub const fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// 每个参数乘上所在组倍率后的学习率与权重衰减
    pub(crate) fn hyper_per_param(&self) -> Vec<ParamHyper> {
        self.groups
            .iter()
            .flat_map(|g| {
                let lr = self.learning_rate * g.lr_mult;
                let weight_decay = self.weight_decay * g.decay_mult;
                g.params.iter().map(move |&id| ParamHyper {
                    id,
                    lr,
                    weight_decay,
                })
            })
            .collect()
    }
}

/// 校验`value <op> threshold`，不满足时返回`InvalidHyperParam`
pub(crate) fn check_hyper_param(
    name: &str,
    value: f32,
    operator: ComparisonOperator,
    threshold: f32,
) -> Result<(), OptimError> {
    if operator.holds(value, threshold) {
        Ok(())
    } else {
        Err(OptimError::InvalidHyperParam {
            name: name.to_string(),
            operator,
            threshold,
            value,
        })
    }
}

/// 按`maximize`取反梯度，并叠加 L2 权重衰减项`weight_decay * θ`
pub(crate) fn prepare_grad(
    grad: &ArrayD<f32>,
    value: &ArrayD<f32>,
    maximize: bool,
    weight_decay: f32,
) -> ArrayD<f32> {
    let mut grad = if maximize {
        grad.mapv(|g| -g)
    } else {
        grad.clone()
    };
    if weight_decay != 0.0 {
        grad.scaled_add(weight_decay, value);
    }
    grad
}
