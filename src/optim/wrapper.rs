/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器包装器：梯度累积 + 梯度裁剪
 */

use super::{ClipGradConfig, Optimizer};
use crate::errors::{ComparisonOperator, OptimError};
use crate::optim::check_hyper_param;
use crate::param::{ParamId, ParamStore};

/// 优化器包装器
///
/// 每调用一次 `update_params` 计数一次，累计满 `accumulative_counts` 次才真正更新：
/// 梯度先除以累积次数求平均，按需裁剪，再 `step`，最后清零梯度。
/// 梯度由训练循环通过 `ParamStore::accumulate_grad` 累加。
pub struct OptimWrapper {
    optimizer: Box<dyn Optimizer>,
    accumulative_counts: usize,
    clip_grad: Option<ClipGradConfig>,
    inner_count: usize,
    last_grad_norm: Option<f32>,
}

impl std::fmt::Debug for OptimWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimWrapper")
            .field("optimizer", &self.optimizer.name())
            .field("accumulative_counts", &self.accumulative_counts)
            .field("clip_grad", &self.clip_grad)
            .field("inner_count", &self.inner_count)
            .finish()
    }
}

impl OptimWrapper {
    pub fn new(
        optimizer: Box<dyn Optimizer>,
        accumulative_counts: usize,
        clip_grad: Option<ClipGradConfig>,
    ) -> Result<Self, OptimError> {
        if accumulative_counts == 0 {
            return Err(OptimError::InvalidConfig {
                key: "accumulative_counts".to_string(),
                message: "须≥1".to_string(),
            });
        }
        if let Some(clip) = &clip_grad {
            check_hyper_param("max_norm", clip.max_norm, ComparisonOperator::GreaterThan, 0.0)?;
            check_hyper_param("norm_type", clip.norm_type, ComparisonOperator::GreaterThan, 0.0)?;
        }
        Ok(Self {
            optimizer,
            accumulative_counts,
            clip_grad,
            inner_count: 0,
            last_grad_norm: None,
        })
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    pub fn optimizer_mut(&mut self) -> &mut dyn Optimizer {
        self.optimizer.as_mut()
    }

    /// 已调用`update_params`的次数
    pub const fn inner_count(&self) -> usize {
        self.inner_count
    }

    /// 最近一次裁剪前的梯度全局范数（未配置裁剪时为`None`）
    pub const fn last_grad_norm(&self) -> Option<f32> {
        self.last_grad_norm
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    pub fn set_learning_rate(&mut self, lr: f32) {
        self.optimizer.set_learning_rate(lr);
    }

    pub fn zero_grad(&self, store: &mut ParamStore) -> Result<(), OptimError> {
        self.optimizer.zero_grad(store)
    }

    /// 计数一次；累计满时执行更新并返回`true`
    pub fn update_params(&mut self, store: &mut ParamStore) -> Result<bool, OptimError> {
        self.inner_count += 1;
        if self.inner_count % self.accumulative_counts != 0 {
            return Ok(false);
        }

        let params = self.optimizer.state().params();
        if self.accumulative_counts > 1 {
            let scale = 1.0 / self.accumulative_counts as f32;
            for &id in &params {
                if let Some(grad) = store.grad_mut(id)? {
                    *grad *= scale;
                }
            }
        }
        if let Some(clip) = self.clip_grad {
            self.last_grad_norm = Some(clip_grad_norm(
                store,
                &params,
                clip.max_norm,
                clip.norm_type,
            )?);
        }

        self.optimizer.step(store)?;
        self.optimizer.zero_grad(store)?;
        Ok(true)
    }
}

/// 按全局范数裁剪`params`的梯度，返回裁剪前的范数
///
/// `norm_type`为无穷大时取所有梯度元素绝对值的最大值。
pub fn clip_grad_norm(
    store: &mut ParamStore,
    params: &[ParamId],
    max_norm: f32,
    norm_type: f32,
) -> Result<f32, OptimError> {
    let mut total = 0.0_f32;
    for &id in params {
        let Some(grad) = store.grad(id)? else {
            continue;
        };
        if norm_type.is_infinite() {
            total = grad.iter().fold(total, |acc, g| acc.max(g.abs()));
        } else {
            total += grad.iter().map(|g| g.abs().powf(norm_type)).sum::<f32>();
        }
    }
    if !norm_type.is_infinite() {
        total = total.powf(1.0 / norm_type);
    }

    if !total.is_finite() {
        log::warn!("梯度范数为{total}，跳过裁剪");
        return Ok(total);
    }

    let clip_coef = max_norm / (total + 1e-6);
    if clip_coef < 1.0 {
        for &id in params {
            if let Some(grad) = store.grad_mut(id)? {
                *grad *= clip_coef;
            }
        }
    }
    Ok(total)
}
