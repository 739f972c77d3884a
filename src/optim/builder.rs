/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 由配置构建优化器：参数分组（paramwise_cfg）+ 注册表查找 + 包装器
 *
 * 配置示例：
 * ```json
 * {
 *     "optimizer": {"type": "SGD", "lr": 0.1, "momentum": 0.9},
 *     "paramwise_cfg": {"custom_keys": {"head": {"lr_mult": 10.0}}, "bias_decay_mult": 0.0},
 *     "clip_grad": {"max_norm": 1.0, "norm_type": 2},
 *     "accumulative_counts": 1
 * }
 * ```
 */

use std::path::Path;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{OptimWrapper, Optimizer, OptimizerConfig, ParamGroup};
use crate::errors::OptimError;
use crate::param::ParamStore;
use crate::registry::OptimizerRegistry;

const fn one() -> f32 {
    1.0
}

/// 匹配到某个 custom key 的参数所用的倍率
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomKey {
    #[serde(default = "one")]
    pub lr_mult: f32,
    #[serde(default = "one")]
    pub decay_mult: f32,
}

impl Default for CustomKey {
    fn default() -> Self {
        Self {
            lr_mult: 1.0,
            decay_mult: 1.0,
        }
    }
}

/// 按参数名设置学习率/权重衰减倍率
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamwiseConfig {
    /// 参数名包含该键即匹配；多个键匹配时取最长的，等长按字典序
    #[serde(default)]
    pub custom_keys: IndexMap<String, CustomKey>,
    /// 名为`bias`或以`.bias`结尾且未匹配 custom key 的参数
    #[serde(default)]
    pub bias_lr_mult: Option<f32>,
    #[serde(default)]
    pub bias_decay_mult: Option<f32>,
}

impl ParamwiseConfig {
    /// 参数名对应的`(lr_mult, decay_mult)`
    pub fn multipliers(&self, name: &str) -> (f32, f32) {
        let mut keys: Vec<&String> = self.custom_keys.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        if let Some(key) = keys.into_iter().find(|k| name.contains(k.as_str())) {
            let custom = self.custom_keys[key];
            return (custom.lr_mult, custom.decay_mult);
        }
        if name == "bias" || name.ends_with(".bias") {
            return (
                self.bias_lr_mult.unwrap_or(1.0),
                self.bias_decay_mult.unwrap_or(1.0),
            );
        }
        (1.0, 1.0)
    }
}

/// 梯度裁剪（按全局范数）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClipGradConfig {
    pub max_norm: f32,
    /// 范数阶数，`"inf"`表示无穷范数
    #[serde(default = "default_norm_type", deserialize_with = "deserialize_norm_type")]
    pub norm_type: f32,
}

impl ClipGradConfig {
    pub const fn new(max_norm: f32) -> Self {
        Self {
            max_norm,
            norm_type: 2.0,
        }
    }
}

const fn default_norm_type() -> f32 {
    2.0
}

fn deserialize_norm_type<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .map(|v| v as f32)
            .ok_or_else(|| D::Error::custom("norm_type 不是有效数值")),
        Value::String(s) if s.eq_ignore_ascii_case("inf") => Ok(f32::INFINITY),
        other => Err(D::Error::custom(format!(
            "norm_type 应为数值或\"inf\"，实际为{other}"
        ))),
    }
}

const fn default_accumulative_counts() -> usize {
    1
}

/// 构建优化器（及其包装器）所需的完整配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub paramwise_cfg: Option<ParamwiseConfig>,
    #[serde(default)]
    pub clip_grad: Option<ClipGradConfig>,
    #[serde(default = "default_accumulative_counts")]
    pub accumulative_counts: usize,
}

impl BuildConfig {
    pub const fn new(optimizer: OptimizerConfig) -> Self {
        Self {
            optimizer,
            paramwise_cfg: None,
            clip_grad: None,
            accumulative_counts: 1,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, OptimError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptimError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// 按`paramwise`把可训练参数分组；倍率相同的参数归入同一组（按首次出现顺序）
///
/// 冻结的参数不参与分组。`paramwise`为`None`时所有可训练参数为一组。
pub fn param_groups(store: &ParamStore, paramwise: Option<&ParamwiseConfig>) -> Vec<ParamGroup> {
    let trainable = store.trainable_params();
    let Some(paramwise) = paramwise else {
        return vec![ParamGroup::new(trainable)];
    };

    let mut groups: Vec<ParamGroup> = Vec::new();
    for (id, param) in store.iter().filter(|(_, p)| p.is_trainable()) {
        let (lr_mult, decay_mult) = paramwise.multipliers(param.name());
        match groups
            .iter_mut()
            .find(|g| g.lr_mult == lr_mult && g.decay_mult == decay_mult)
        {
            Some(group) => group.params.push(id),
            None => groups.push(
                ParamGroup::new(vec![id])
                    .with_lr_mult(lr_mult)
                    .with_decay_mult(decay_mult),
            ),
        }
    }
    groups
}

/// 按配置从注册表构建优化器
pub fn build_optimizer(
    registry: &OptimizerRegistry,
    store: &ParamStore,
    cfg: &BuildConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    let groups = param_groups(store, cfg.paramwise_cfg.as_ref());
    registry.build(&cfg.optimizer, groups)
}

/// 按配置构建带梯度累积/裁剪的优化器包装器
pub fn build_optim_wrapper(
    registry: &OptimizerRegistry,
    store: &ParamStore,
    cfg: &BuildConfig,
) -> Result<OptimWrapper, OptimError> {
    let optimizer = build_optimizer(registry, store, cfg)?;
    OptimWrapper::new(optimizer, cfg.accumulative_counts, cfg.clip_grad)
}
