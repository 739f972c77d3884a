/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-19 15:30:00
 * @Description  : SGD 优化器测试
 */

use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn};

use super::{first_value, scalar_store, single_group};
use crate::assert_err;
use crate::errors::OptimError;
use crate::optim::torch::SGD;
use crate::optim::{Optimizer, OptimizerConfig, ParamGroup};
use crate::param::ParamStore;

#[test]
fn test_sgd_creation() {
    let (_, w) = scalar_store(1.0, 0.0);
    let sgd = SGD::new(single_group(w), 0.01).unwrap();
    assert_eq!(sgd.name(), "SGD");
    assert_eq!(sgd.learning_rate(), 0.01);
    assert_eq!(sgd.param_groups().len(), 1);

    // 没有任何参数
    assert_err!(SGD::new(vec![ParamGroup::new(vec![])], 0.01), OptimError::EmptyParams);
    // 负学习率
    assert_err!(
        SGD::new(single_group(w), -0.1),
        OptimError::InvalidHyperParam { name, .. } if name == "lr"
    );
}

#[test]
fn test_sgd_update() {
    // w=2, g=3, lr=0.1 → w = 2 - 0.1 * 3 = 1.7
    let (mut store, w) = scalar_store(2.0, 3.0);
    let mut sgd = SGD::new(single_group(w), 0.1).unwrap();
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, w), 1.7, epsilon = 1e-6);
}

#[test]
fn test_sgd_momentum() {
    // b1 = g = 1, w = 1 - 0.1 = 0.9
    // b2 = 0.9 * 1 + 1 = 1.9, w = 0.9 - 0.19 = 0.71
    let (mut store, w) = scalar_store(1.0, 1.0);
    let mut sgd =
        SGD::new_with_config(single_group(w), 0.1, 0.9, 0.0, 0.0, false, false).unwrap();
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, w), 0.9, epsilon = 1e-6);
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, w), 0.71, epsilon = 1e-6);
    assert_abs_diff_eq!(sgd.momentum_buffer(w).unwrap()[0], 1.9, epsilon = 1e-6);

    sgd.reset();
    assert!(sgd.momentum_buffer(w).is_none());
}

#[test]
fn test_sgd_nesterov() {
    // b1 = 1, g' = 1 + 0.9 * 1 = 1.9, w = 1 - 0.19 = 0.81
    let (mut store, w) = scalar_store(1.0, 1.0);
    let mut sgd =
        SGD::new_with_config(single_group(w), 0.1, 0.9, 0.0, 0.0, true, false).unwrap();
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, w), 0.81, epsilon = 1e-6);
}

#[test]
fn test_sgd_nesterov_requires_momentum() {
    let (_, w) = scalar_store(1.0, 1.0);
    assert_err!(
        SGD::new_with_config(single_group(w), 0.1, 0.0, 0.0, 0.0, true, false),
        OptimError::InvalidHyperParam { name, .. } if name == "momentum"
    );
    assert_err!(
        SGD::new_with_config(single_group(w), 0.1, 0.9, 0.1, 0.0, true, false),
        OptimError::InvalidHyperParam { name, .. } if name == "dampening"
    );
}

#[test]
fn test_sgd_weight_decay_and_maximize() {
    // g' = 0 + 0.1 * 1 = 0.1, w = 1 - 1.0 * 0.1 = 0.9
    let (mut store, w) = scalar_store(1.0, 0.0);
    let mut sgd =
        SGD::new_with_config(single_group(w), 1.0, 0.0, 0.0, 0.1, false, false).unwrap();
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, w), 0.9, epsilon = 1e-6);

    // maximize：沿梯度方向上升
    let (mut store, w) = scalar_store(1.0, 1.0);
    let mut sgd =
        SGD::new_with_config(single_group(w), 0.1, 0.0, 0.0, 0.0, false, true).unwrap();
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, w), 1.1, epsilon = 1e-6);
}

#[test]
fn test_sgd_lr_mult() {
    // 组内 lr = 0.01 * 10 = 0.1
    let (mut store, w) = scalar_store(1.0, 1.0);
    let groups = vec![ParamGroup::new(vec![w]).with_lr_mult(10.0)];
    let mut sgd = SGD::new(groups, 0.01).unwrap();
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, w), 0.9, epsilon = 1e-6);

    sgd.set_learning_rate(0.02);
    assert_eq!(sgd.learning_rate(), 0.02);
    assert_eq!(sgd.param_groups()[0].lr_mult, 10.0);
}

#[test]
fn test_sgd_skips_params_without_grad() {
    let mut store = ParamStore::new();
    let a = store
        .new_parameter_with_value(ArrayD::from_elem(IxDyn(&[2]), 1.0), Some("a"))
        .unwrap();
    let b = store
        .new_parameter_with_value(ArrayD::from_elem(IxDyn(&[2]), 1.0), Some("b"))
        .unwrap();
    store.set_grad(a, ArrayD::from_elem(IxDyn(&[2]), 1.0)).unwrap();

    let mut sgd = SGD::new(vec![ParamGroup::new(vec![a, b])], 0.5).unwrap();
    sgd.step(&mut store).unwrap();
    assert_abs_diff_eq!(first_value(&store, a), 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(first_value(&store, b), 1.0, epsilon = 1e-6);

    sgd.zero_grad(&mut store).unwrap();
    assert!(store.grad(a).unwrap().is_none());
}

#[test]
fn test_duplicate_param_across_groups() {
    let (_, w) = scalar_store(1.0, 1.0);
    assert_err!(
        SGD::new(vec![ParamGroup::new(vec![w]), ParamGroup::new(vec![w])], 0.1),
        OptimError::InvalidConfig { key, .. } if key == "params"
    );
    // 同组内重复同样拒绝
    assert_err!(
        SGD::new(vec![ParamGroup::new(vec![w, w])], 0.1),
        OptimError::InvalidConfig { key, .. } if key == "params"
    );
}

#[test]
fn test_sgd_from_config() {
    let (_, w) = scalar_store(1.0, 1.0);
    let cfg = OptimizerConfig::new("SGD").with("lr", 0.1).with("momentum", 0.9);
    let sgd = SGD::from_config(single_group(w), &cfg).unwrap();
    assert_abs_diff_eq!(sgd.learning_rate(), 0.1, epsilon = 1e-7);

    let cfg = OptimizerConfig::new("SGD").with("betas", serde_json::json!([0.9, 0.99]));
    assert_err!(
        SGD::from_config(single_group(w), &cfg),
        OptimError::InvalidConfig { key, .. } if key == "betas"
    );
}
