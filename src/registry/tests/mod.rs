/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 注册表单元测试
 *
 * - registry: 注册、查找与构建
 * - providers: 后端探测与批量注册
 */

use crate::errors::OptimError;
use crate::optim::torch::SGD;
use crate::optim::{Optimizer, OptimizerConfig, ParamGroup};


/// 测试用构造函数：以 SGD 实现任意名字的优化器
fn build_foo(
    groups: Vec<ParamGroup>,
    cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Ok(Box::new(SGD::from_config(groups, cfg)?))
}

fn build_failing(
    _groups: Vec<ParamGroup>,
    _cfg: &OptimizerConfig,
) -> Result<Box<dyn Optimizer>, OptimError> {
    Err(OptimError::EmptyParams)
}
