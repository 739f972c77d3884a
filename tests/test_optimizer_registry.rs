/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 注册表集成测试：内置与可选后端的注册行为
 */

use optim_registry::optim::OptimizerConfig;
use optim_registry::registry::OptimizerRegistry;
use optim_registry::{
    OptimError, ParamGroup, ParamStore, register_bitsandbytes_optimizers,
    register_sophia_optimizers, register_torch_optimizers,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_register_torch_optimizers() {
    init_logger();
    let mut registry = OptimizerRegistry::new();
    let torch_optimizers = register_torch_optimizers(&mut registry);
    assert!(!torch_optimizers.is_empty());
    assert!(torch_optimizers.iter().any(|n| n == "TorchAdafactor"));
    assert!(!torch_optimizers.iter().any(|n| n == "Adafactor"));
    for name in &torch_optimizers {
        assert!(registry.contains(name));
    }

    // 重复注册返回空列表
    assert!(register_torch_optimizers(&mut registry).is_empty());
}

#[test]
fn test_with_builtins_already_registered() {
    init_logger();
    let mut registry = OptimizerRegistry::with_builtins();
    assert!(register_torch_optimizers(&mut registry).is_empty());
}

#[test]
fn test_optional_registrations_are_idempotent() {
    init_logger();
    let mut registry = OptimizerRegistry::with_builtins();
    let bnb = register_bitsandbytes_optimizers(&mut registry);
    let sophia = register_sophia_optimizers(&mut registry);
    for name in bnb.iter().chain(&sophia) {
        assert!(registry.contains(name));
    }
    assert!(register_bitsandbytes_optimizers(&mut registry).is_empty());
    assert!(register_sophia_optimizers(&mut registry).is_empty());
    // 可选后端不会覆盖内置优化器
    assert_eq!(registry.source("Adam"), Some("torch"));
}

#[test]
fn test_every_builtin_is_constructible() {
    init_logger();
    let registry = OptimizerRegistry::with_builtins();
    let mut store = ParamStore::with_seed(1);
    let w = store.new_parameter(&[3, 2], Some("w")).unwrap();
    for name in registry.names() {
        let optimizer = registry
            .build(&OptimizerConfig::new(name), vec![ParamGroup::new(vec![w])])
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(!optimizer.name().is_empty());
    }
}

#[test]
fn test_unknown_optimizer() {
    init_logger();
    let registry = OptimizerRegistry::with_builtins();
    let err = registry.lookup("Adafactor").err();
    assert_eq!(err, Some(OptimError::NotFound("Adafactor".to_string())));
    assert_eq!(
        err.map(|e| e.to_string()),
        Some("优化器`Adafactor`未注册".to_string())
    );
}
