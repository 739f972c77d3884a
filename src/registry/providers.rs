/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器提供方：探测后端是否可用，并把其优化器批量注册进注册表
 */

use super::{OptimizerEntry, OptimizerRegistry, Registration};

/// 后端可用性探测结果
#[derive(Debug, Clone)]
pub enum Capability {
    Available(Vec<OptimizerEntry>),
    Unavailable,
}

/// 一组可批量注册的优化器（内置或可选后端）
pub trait OptimizerProvider {
    /// 用于日志的后端名
    fn name(&self) -> &str;

    /// 探测后端是否可用；不可用不是错误
    fn probe(&self) -> Capability;

    /// 与已注册名称冲突时的改名前缀；`None`表示直接跳过冲突项
    fn collision_prefix(&self) -> Option<&str> {
        None
    }
}

/// 内置优化器，总是可用
#[derive(Debug, Clone, Copy, Default)]
pub struct TorchOptimizers;

impl OptimizerProvider for TorchOptimizers {
    fn name(&self) -> &str {
        "torch"
    }

    fn probe(&self) -> Capability {
        Capability::Available(crate::optim::torch::builtin_entries())
    }
}

/// bitsandbytes 后端（`bitsandbytes` feature），冲突名加`bnb_`前缀
#[derive(Debug, Clone, Copy, Default)]
pub struct BitsAndBytesOptimizers;

impl OptimizerProvider for BitsAndBytesOptimizers {
    fn name(&self) -> &str {
        "bitsandbytes"
    }

    #[cfg(feature = "bitsandbytes")]
    fn probe(&self) -> Capability {
        Capability::Available(crate::optim::bnb::entries())
    }

    #[cfg(not(feature = "bitsandbytes"))]
    fn probe(&self) -> Capability {
        Capability::Unavailable
    }

    fn collision_prefix(&self) -> Option<&str> {
        Some("bnb_")
    }
}

/// Sophia 后端（`sophia` feature）
#[derive(Debug, Clone, Copy, Default)]
pub struct SophiaOptimizers;

impl OptimizerProvider for SophiaOptimizers {
    fn name(&self) -> &str {
        "sophia"
    }

    #[cfg(feature = "sophia")]
    fn probe(&self) -> Capability {
        Capability::Available(crate::optim::sophia::entries())
    }

    #[cfg(not(feature = "sophia"))]
    fn probe(&self) -> Capability {
        Capability::Unavailable
    }
}

/// 注册`provider`的全部优化器，返回本次新加入的名称（按提供顺序）
///
/// 后端不可用或全部已注册时返回空列表。名称已被其它来源占用时，若 provider
/// 给出前缀则改用`<前缀><名称>`，改名后仍冲突则跳过；名称已由同一 provider
/// 注册过则直接跳过。
pub fn register_provider<P>(registry: &mut OptimizerRegistry, provider: &P) -> Vec<String>
where
    P: OptimizerProvider + ?Sized,
{
    let entries = match provider.probe() {
        Capability::Available(entries) => entries,
        Capability::Unavailable => {
            log::debug!("优化器后端`{}`不可用，跳过注册", provider.name());
            return Vec::new();
        }
    };

    let source = provider.name();
    let mut registered = Vec::new();
    for entry in entries {
        let taken_by_other = registry
            .source(&entry.name)
            .is_some_and(|owner| owner != source);
        let canonical_name = match provider.collision_prefix() {
            Some(prefix) if taken_by_other => format!("{prefix}{}", entry.name),
            _ => entry.name,
        };
        if registry.register_from(source, canonical_name.as_str(), entry.constructor)
            == Registration::Added
        {
            registered.push(canonical_name);
        }
    }

    if !registered.is_empty() {
        log::info!(
            "已从`{}`注册{}个优化器：{:?}",
            provider.name(),
            registered.len(),
            registered
        );
    }
    registered
}

/// 注册内置优化器；已注册的名称跳过
pub fn register_torch_optimizers(registry: &mut OptimizerRegistry) -> Vec<String> {
    register_provider(registry, &TorchOptimizers)
}

/// 注册 bitsandbytes 优化器；未启用该后端时返回空列表
pub fn register_bitsandbytes_optimizers(registry: &mut OptimizerRegistry) -> Vec<String> {
    register_provider(registry, &BitsAndBytesOptimizers)
}

/// 注册 Sophia 优化器；未启用该后端时返回空列表
pub fn register_sophia_optimizers(registry: &mut OptimizerRegistry) -> Vec<String> {
    register_provider(registry, &SophiaOptimizers)
}
