/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器注册表：名称 → 构造函数
 *
 * 注册表是显式持有的对象（而非进程级全局变量），由配置加载方创建并持有。
 * 重复注册同名优化器不是错误，只会被忽略并返回 `Registration::AlreadyRegistered`。
 */

mod providers;

pub use providers::{
    BitsAndBytesOptimizers, Capability, OptimizerProvider, SophiaOptimizers, TorchOptimizers,
    register_bitsandbytes_optimizers, register_provider, register_sophia_optimizers,
    register_torch_optimizers,
};

use indexmap::IndexMap;

use crate::errors::OptimError;
use crate::optim::{Optimizer, OptimizerConfig, ParamGroup};

#[cfg(test)]
mod tests;

/// 优化器构造函数：由参数组和配置创建优化器
pub type OptimizerConstructor =
    fn(Vec<ParamGroup>, &OptimizerConfig) -> Result<Box<dyn Optimizer>, OptimError>;

/// 一条待注册的（名称，构造函数）
#[derive(Debug, Clone)]
pub struct OptimizerEntry {
    pub name: String,
    pub constructor: OptimizerConstructor,
}

impl OptimizerEntry {
    pub fn new(name: impl Into<String>, constructor: OptimizerConstructor) -> Self {
        Self {
            name: name.into(),
            constructor,
        }
    }
}

/// 注册结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    AlreadyRegistered,
}

/// 直接调用 `register` 时记录的来源
pub const USER_SOURCE: &str = "user";

#[derive(Debug, Clone)]
struct RegisteredOptimizer {
    constructor: OptimizerConstructor,
    /// 注册该条目的后端名
    source: String,
}

/// 优化器注册表，按注册顺序保存条目
#[derive(Debug, Clone)]
pub struct OptimizerRegistry {
    entries: IndexMap<String, RegisteredOptimizer>,
}

impl OptimizerRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// 创建注册表并注册所有内置优化器
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_torch_optimizers(&mut registry);
        registry
    }

    /// 名称不存在时插入；已存在时保持原条目不变
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: OptimizerConstructor,
    ) -> Registration {
        self.register_from(USER_SOURCE, name, constructor)
    }

    /// 同`register`，并记录条目来源（后端名）
    pub fn register_from(
        &mut self,
        source: &str,
        name: impl Into<String>,
        constructor: OptimizerConstructor,
    ) -> Registration {
        let name = name.into();
        if self.entries.contains_key(&name) {
            log::debug!("优化器`{name}`已注册，跳过");
            return Registration::AlreadyRegistered;
        }
        log::debug!("注册优化器`{name}`（来源：{source}）");
        self.entries.insert(
            name,
            RegisteredOptimizer {
                constructor,
                source: source.to_string(),
            },
        );
        Registration::Added
    }

    pub fn lookup(&self, name: &str) -> Result<OptimizerConstructor, OptimError> {
        self.entries
            .get(name)
            .map(|entry| entry.constructor)
            .ok_or_else(|| OptimError::NotFound(name.to_string()))
    }

    /// 条目的来源后端名
    pub fn source(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.source.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 按注册顺序列出所有名称
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按`cfg.kind`查找构造函数并创建优化器
    pub fn build(
        &self,
        cfg: &OptimizerConfig,
        groups: Vec<ParamGroup>,
    ) -> Result<Box<dyn Optimizer>, OptimError> {
        let constructor = self.lookup(&cfg.kind)?;
        constructor(groups, cfg)
    }
}

/// 默认注册表已包含内置优化器
impl Default for OptimizerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
