/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : Adafactor 优化器（注册名为 TorchAdafactor）
 *
 * 二维参数使用分解的二阶矩（行均值 × 列均值），只需 O(行 + 列) 的状态；
 * 其余维度的参数退化为完整的逐元素二阶矩。
 */

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayD, Axis, Ix2, Zip};

use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::{Optimizer, OptimizerConfig, OptimizerState, ParamGroup, check_hyper_param};
use crate::param::{ParamId, ParamStore};

#[derive(Debug, Clone)]
enum SecondMoment {
    Factored {
        row_var: Array1<f32>,
        col_var: Array1<f32>,
    },
    Full(ArrayD<f32>),
}

#[derive(Debug, Clone)]
struct AdafactorSlot {
    step: i32,
    moment: SecondMoment,
}

/// Adafactor
///
/// - `β2_t` = 1 - t^`beta2_decay`
/// - ρ_t = min(α, 1/√t)，实际步长 = max(ε2, RMS(θ)) * ρ_t
/// - u = g / √max(v̂, ε1²)，再按 max(1, RMS(u)/d) 裁剪
#[derive(Debug, Clone)]
pub struct Adafactor {
    state: OptimizerState,
    beta2_decay: f32,
    eps1: f32,
    eps2: f32,
    d: f32,
    maximize: bool,
    slots: HashMap<ParamId, AdafactorSlot>,
}

impl Adafactor {
    pub const CONFIG_KEYS: &'static [&'static str] =
        &["lr", "beta2_decay", "eps", "d", "weight_decay", "maximize"];

    pub fn from_config(groups: Vec<ParamGroup>, cfg: &OptimizerConfig) -> Result<Self, OptimError> {
        cfg.check_keys(Self::CONFIG_KEYS)?;
        let beta2_decay = cfg.get_f32("beta2_decay", -0.8)?;
        let (eps1, eps2) = cfg.get_opt_pair("eps")?;
        let eps1 = eps1.unwrap_or(f32::EPSILON);
        let eps2 = eps2.unwrap_or(1e-3);
        let d = cfg.get_f32("d", 1.0)?;
        check_hyper_param("beta2_decay", beta2_decay, ComparisonOperator::LessOrEqual, 0.0)?;
        check_hyper_param("eps[0]", eps1, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param("eps[1]", eps2, ComparisonOperator::GreaterOrEqual, 0.0)?;
        check_hyper_param("d", d, ComparisonOperator::GreaterOrEqual, 1.0)?;
        Ok(Self {
            state: OptimizerState::new(
                groups,
                cfg.get_f32("lr", 1e-2)?,
                cfg.get_f32("weight_decay", 0.0)?,
            )?,
            beta2_decay,
            eps1,
            eps2,
            d,
            maximize: cfg.get_bool("maximize", false)?,
            slots: HashMap::new(),
        })
    }

    /// 参数是否使用分解的二阶矩（仅在第一次 `step` 之后可知）
    pub fn is_factored(&self, id: ParamId) -> Option<bool> {
        self.slots
            .get(&id)
            .map(|s| matches!(s.moment, SecondMoment::Factored { .. }))
    }
}

fn rms(x: &ArrayD<f32>) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
}

impl Optimizer for Adafactor {
    fn name(&self) -> &str {
        "Adafactor"
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn step(&mut self, store: &mut ParamStore) -> Result<(), OptimError> {
        let (eps1, eps2, d) = (self.eps1, self.eps2, self.d);
        for hyper in self.state.hyper_per_param() {
            let Some((value, grad)) = store.value_and_grad_mut(hyper.id)? else {
                continue;
            };
            let grad = if self.maximize {
                grad.mapv(|g| -g)
            } else {
                grad.clone()
            };
            let slot = self.slots.entry(hyper.id).or_insert_with(|| {
                let moment = match grad.shape() {
                    &[rows, cols] => SecondMoment::Factored {
                        row_var: Array1::zeros(rows),
                        col_var: Array1::zeros(cols),
                    },
                    shape => SecondMoment::Full(ArrayD::zeros(shape)),
                };
                AdafactorSlot { step: 0, moment }
            });
            slot.step += 1;
            let t = slot.step as f32;
            let one_minus_beta2 = t.powf(self.beta2_decay);
            let rho = hyper.lr.min(1.0 / t.sqrt());
            let alpha = eps2.max(rms(value)) * rho;

            if hyper.weight_decay != 0.0 {
                value.mapv_inplace(|p| p * (1.0 - hyper.lr * hyper.weight_decay));
            }

            let mut update = match &mut slot.moment {
                SecondMoment::Factored { row_var, col_var } => {
                    let g2 = grad.view().into_dimensionality::<Ix2>().map_err(|_| {
                        OptimError::ShapeMismatch {
                            name: format!("{:?}", hyper.id),
                            expected: vec![row_var.len(), col_var.len()],
                            got: grad.shape().to_vec(),
                        }
                    })?;
                    let (rows, cols) = g2.dim();
                    let row_mean =
                        g2.map_axis(Axis(1), |r| r.iter().map(|x| x * x).sum::<f32>() / cols as f32);
                    let col_mean =
                        g2.map_axis(Axis(0), |c| c.iter().map(|x| x * x).sum::<f32>() / rows as f32);
                    Zip::from(&mut *row_var)
                        .and(&row_mean)
                        .for_each(|v, &m| *v += (m - *v) * one_minus_beta2);
                    Zip::from(&mut *col_var)
                        .and(&col_mean)
                        .for_each(|v, &m| *v += (m - *v) * one_minus_beta2);

                    let row_norm = row_var.mean().unwrap_or(0.0).max(eps1);
                    Array2::from_shape_fn((rows, cols), |(i, j)| {
                        row_var[i] * col_var[j] / row_norm
                    })
                    .into_dyn()
                }
                SecondMoment::Full(variance) => {
                    Zip::from(&mut *variance)
                        .and(&grad)
                        .for_each(|v, &g| *v += (g * g - *v) * one_minus_beta2);
                    variance.clone()
                }
            };

            Zip::from(&mut update)
                .and(&grad)
                .for_each(|u, &g| *u = g / u.max(eps1 * eps1).sqrt());
            let denom = (rms(&update) / d).max(1.0);
            value.scaled_add(-alpha / denom, &update);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.slots.clear();
    }
}

pub(crate) fn build(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(Adafactor::from_config(groups, cfg)?))
}
