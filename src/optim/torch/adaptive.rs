/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 按坐标自适应学习率的优化器：Adagrad、Adadelta、RMSprop
 */

use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::{
    Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param, prepare_grad,
};
use crate::param::{ParamId, ParamStore};

/// Adagrad：累计梯度平方和
///
/// - s = s + g²
/// - θ = θ - α_t * g / (√s + ε)，其中 α_t = α / (1 + (t - 1) * `lr_decay`)
#[derive(Debug, Clone)]
pub struct Adagrad {
    state: OptimizerState,
    lr_decay: f32,
    initial_accumulator_value: f32,
    epsilon: f32,
    maximize: bool,
    steps: HashMap<ParamId, i32>,
    sums: HashMap<ParamId, ArrayD<f32>>,
}

impl Adagrad {
    pub const CONFIG_KEYS: &'static [&'static str] = &[
        "lr",
        "lr_decay",
        "weight_decay",
        "initial_accumulator_value",
        "eps",
        "maximize",
    ];

    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        let lr_decay = cfg.get_f32("lr_decay", 0.0)?;
        let initial_accumulator_value = cfg.get_f32("initial_accumulator_value", 0.0)?;
        let epsilon = cfg.get_f32("eps", 1e-10)?;
        check_hyper_param("lr_decay", lr_decay, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param(
            "initial_accumulator_value",
            initial_accumulator_value,
            ComparisonOperator::GreaterOrEqual,
            0.0,
        )?;
        check_hyper_param("eps", epsilon, ComparisonOperator::GreaterOrEqual, 0.0)?;
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-2)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            lr_decay,
            initial_accumulator_value,
            epsilon,
            maximize: cfg.get_bool("maximize", false)?,
            steps: HashMap::new(),
            sums: HashMap::new(),
        })
    }

    /// 指定参数的梯度平方累计和
    pub fn sum(&self, id: ParamId) -> Option<&ArrayD<f32>> {
        self.sums.get(&id)
    }
}

impl Optimizer for Adagrad {
    fn name(&self) -> &str {
        "Adagrad"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let init = self.initial_accumulator_value;
        let eps = self.epsilon;
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, self.maximize, hyper.weight_decay);

            let step = self.steps.entry(hyper.id).or_insert(0);
            *step += 1;
            let clr = hyper.lr / (1.0 + (*step - 1) as f32 * self.lr_decay);

            let sum = self
                .sums
                .entry(hyper.id)
                .or_insert_with(|| ArrayD::from_elem(grad.shape(), init));
            Zip::from(&mut *sum).and(&grad).for_each(|s, &g| *s += g * g);

            Zip::from(value)
                .and(&grad)
                .and(&*sum)
                .for_each(|p, &g, &s| *p -= clr * g / (s.sqrt() + eps));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.steps.clear();
        self.sums.clear();
    }
}

#[derive(Debug, Clone)]
struct AdadeltaSlot {
    square_avg: ArrayD<f32>,
    acc_delta: ArrayD<f32>,
}

/// Adadelta：以更新量的滑动均方根自适应缩放步长
#[derive(Debug, Clone)]
pub struct Adadelta {
    state: OptimizerState,
    rho: f32,
    epsilon: f32,
    maximize: bool,
    slots: HashMap<ParamId, AdadeltaSlot>,
}

impl Adadelta {
    pub const CONFIG_KEYS: &'static [&'static str] =
        &["lr", "rho", "eps", "weight_decay", "maximize"];

    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        let rho = cfg.get_f32("rho", 0.9)?;
        let epsilon = cfg.get_f32("eps", 1e-6)?;
        check_hyper_param("rho", rho, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param("rho", rho, ComparisonOperator::LessOrEqual, 1.0)?;
        check_hyper_param("eps", epsilon, ComparisonOperator::GreaterOrEqual, 0.0)?;
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1.0)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            rho,
            epsilon,
            maximize: cfg.get_bool("maximize", false)?,
            slots: HashMap::new(),
        })
    }
}

impl Optimizer for Adadelta {
    fn name(&self) -> &str {
        "Adadelta"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (rho, eps) = (self.rho, self.epsilon);
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, self.maximize, hyper.weight_decay);
            let slot = self.slots.entry(hyper.id).or_insert_with(|| AdadeltaSlot {
                square_avg: ArrayD::zeros(grad.shape()),
                acc_delta: ArrayD::zeros(grad.shape()),
            });
            let lr = hyper.lr;

            Zip::from(value)
                .and(&grad)
                .and(&mut slot.square_avg)
                .and(&mut slot.acc_delta)
                .for_each(|p, &g, sq, acc| {
                    *sq = rho * *sq + (1.0 - rho) * g * g;
                    let delta = (*acc + eps).sqrt() / (*sq + eps).sqrt() * g;
                    *acc = rho * *acc + (1.0 - rho) * delta * delta;
                    *p -= lr * delta;
                });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

#[derive(Debug, Clone)]
struct RmspropSlot {
    square_avg: ArrayD<f32>,
    grad_avg: Option<ArrayD<f32>>,
    momentum_buffer: Option<ArrayD<f32>>,
}

/// RMSprop：以梯度平方的滑动平均归一化梯度
///
/// `centered` 时减去梯度均值的平方，即用方差而非二阶原点矩归一化。
#[derive(Debug, Clone)]
pub struct RMSprop {
    state: OptimizerState,
    alpha: f32,
    epsilon: f32,
    momentum: f32,
    centered: bool,
    maximize: bool,
    slots: HashMap<ParamId, RmspropSlot>,
}

impl RMSprop {
    pub const CONFIG_KEYS: &'static [&'static str] = &[
        "lr",
        "alpha",
        "eps",
        "weight_decay",
        "momentum",
        "centered",
        "maximize",
    ];

    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        let alpha = cfg.get_f32("alpha", 0.99)?;
        let epsilon = cfg.get_f32("eps", 1e-8)?;
        let momentum = cfg.get_f32("momentum", 0.0)?;
        check_hyper_param("alpha", alpha, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param("eps", epsilon, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param("momentum", momentum, ComparisonOperator::GreaterOrEqual, 0.0)?;
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-2)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            alpha,
            epsilon,
            momentum,
            centered: cfg.get_bool("centered", false)?,
            maximize: cfg.get_bool("maximize", false)?,
            slots: HashMap::new(),
        })
    }
}

impl Optimizer for RMSprop {
    fn name(&self) -> &str {
        "RMSprop"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (alpha, eps, momentum) = (self.alpha, self.epsilon, self.momentum);
        let (centered, maximize) = (self.centered, self.maximize);
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = prepare_grad(grad, value, maximize, hyper.weight_decay);
            let slot = self.slots.entry(hyper.id).or_insert_with(|| RmspropSlot {
                square_avg: ArrayD::zeros(grad.shape()),
                grad_avg: centered.then(|| ArrayD::zeros(grad.shape())),
                momentum_buffer: (momentum > 0.0).then(|| ArrayD::zeros(grad.shape())),
            });

            Zip::from(&mut slot.square_avg)
                .and(&grad)
                .for_each(|sq, &g| *sq = alpha * *sq + (1.0 - alpha) * g * g);

            let mut avg = match slot.grad_avg.as_mut() {
                Some(grad_avg) => {
                    Zip::from(&mut *grad_avg)
                        .and(&grad)
                        .for_each(|ga, &g| *ga = alpha * *ga + (1.0 - alpha) * g);
                    let mut var = slot.square_avg.clone();
                    Zip::from(&mut var)
                        .and(&*grad_avg)
                        .for_each(|v, &ga| *v = (*v - ga * ga).max(0.0));
                    var
                }
                None => slot.square_avg.clone(),
            };
            avg.mapv_inplace(|v| v.sqrt() + eps);

            let lr = hyper.lr;
            match slot.momentum_buffer.as_mut() {
                Some(buf) => {
                    Zip::from(&mut *buf)
                        .and(&grad)
                        .and(&avg)
                        .for_each(|b, &g, &a| *b = momentum * *b + g / a);
                    value.scaled_add(-lr, &*buf);
                }
                None => Zip::from(value)
                    .and(&grad)
                    .and(&avg)
                    .for_each(|p, &g, &a| *p -= lr * g / a),
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

pub(crate) fn build_adagrad(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adagrad::from_config(groups, cfg)?))
}

pub(crate) fn build_adadelta(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adadelta::from_config(groups, cfg)?))
}

pub(crate) fn build_rmsprop(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(RMSprop::from_config(groups, cfg)?))
}
