/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器包装器：梯度累积与裁剪
 */

use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn, array};

use super::{filled_store, first_value, scalar_store, single_group};
use crate::assert_err;
use crate::errors::OptimError;
use crate::optim::torch::SGD;
use crate::optim::{ClipGradConfig, OptimWrapper, ParamGroup, clip_grad_norm};
use crate::param::ParamStore;

#[test]
fn test_update_every_step() {
    let (mut store, w) = scalar_store(1.0, 1.0);
    let sgd = SGD::new(single_group(w), 0.1).unwrap();
    let mut wrapper = OptimWrapper::new(Box::new(sgd), 1, None).unwrap();

    assert!(wrapper.update_params(&mut store).unwrap());
    assert_abs_diff_eq!(first_value(&store, w), 0.9, epsilon = 1e-6);
    // 更新后梯度已清零
    assert!(store.grad(w).unwrap().is_none());
    assert_eq!(wrapper.inner_count(), 1);
    assert!(wrapper.last_grad_norm().is_none());
}

#[test]
fn test_gradient_accumulation() {
    let (mut store, w) = scalar_store(1.0, 0.0);
    store.clear_grad(w).unwrap();
    let sgd = SGD::new(single_group(w), 0.1).unwrap();
    let mut wrapper = OptimWrapper::new(Box::new(sgd), 2, None).unwrap();

    store.accumulate_grad(w, &array![1.0_f32].into_dyn()).unwrap();
    assert!(!wrapper.update_params(&mut store).unwrap());
    assert_abs_diff_eq!(first_value(&store, w), 1.0, epsilon = 1e-6);

    store.accumulate_grad(w, &array![3.0_f32].into_dyn()).unwrap();
    assert!(wrapper.update_params(&mut store).unwrap());
    // 平均梯度 2，w = 1 - 0.1 * 2
    assert_abs_diff_eq!(first_value(&store, w), 0.8, epsilon = 1e-6);
    assert!(store.grad(w).unwrap().is_none());
}

#[test]
fn test_clip_grad_norm_l2() {
    // g = [3, 4]，范数 5，裁剪到 1 → [0.6, 0.8]
    let mut store = ParamStore::new();
    let w = store
        .new_parameter_with_value(ArrayD::zeros(IxDyn(&[2])), Some("w"))
        .unwrap();
    store.set_grad(w, array![3.0_f32, 4.0].into_dyn()).unwrap();

    let norm = clip_grad_norm(&mut store, &[w], 1.0, 2.0).unwrap();
    assert_abs_diff_eq!(norm, 5.0, epsilon = 1e-5);
    let grad = store.grad(w).unwrap().unwrap();
    assert_abs_diff_eq!(grad[0], 0.6, epsilon = 1e-5);
    assert_abs_diff_eq!(grad[1], 0.8, epsilon = 1e-5);
}

#[test]
fn test_clip_grad_norm_inf_and_no_clip() {
    let (mut store, w) = filled_store(3, 0.0, -2.0);
    let norm = clip_grad_norm(&mut store, &[w], 10.0, f32::INFINITY).unwrap();
    assert_abs_diff_eq!(norm, 2.0, epsilon = 1e-6);
    // 范数未超过上限，梯度不变
    assert_abs_diff_eq!(store.grad(w).unwrap().unwrap()[0], -2.0, epsilon = 1e-6);
}

#[test]
fn test_clip_grad_norm_non_finite() {
    let (mut store, w) = filled_store(2, 0.0, f32::NAN);
    let norm = clip_grad_norm(&mut store, &[w], 1.0, 2.0).unwrap();
    assert!(norm.is_nan());
}

#[test]
fn test_wrapper_with_clipping() {
    let mut store = ParamStore::new();
    let a = store
        .new_parameter_with_value(ArrayD::zeros(IxDyn(&[1])), Some("a"))
        .unwrap();
    let b = store
        .new_parameter_with_value(ArrayD::zeros(IxDyn(&[1])), Some("b"))
        .unwrap();
    store.set_grad(a, array![3.0_f32].into_dyn()).unwrap();
    store.set_grad(b, array![4.0_f32].into_dyn()).unwrap();

    let sgd = SGD::new(vec![ParamGroup::new(vec![a, b])], 1.0).unwrap();
    let mut wrapper = OptimWrapper::new(Box::new(sgd), 1, Some(ClipGradConfig::new(1.0))).unwrap();
    wrapper.update_params(&mut store).unwrap();

    assert_abs_diff_eq!(wrapper.last_grad_norm().unwrap(), 5.0, epsilon = 1e-5);
    assert_abs_diff_eq!(first_value(&store, a), -0.6, epsilon = 1e-5);
    assert_abs_diff_eq!(first_value(&store, b), -0.8, epsilon = 1e-5);
}

#[test]
fn test_wrapper_invalid_options() {
    let (_, w) = scalar_store(1.0, 1.0);
    let sgd = SGD::new(single_group(w), 0.1).unwrap();
    assert_err!(
        OptimWrapper::new(Box::new(sgd.clone()), 0, None),
        OptimError::InvalidConfig { .. }
    );
    assert_err!(
        OptimWrapper::new(Box::new(sgd), 1, Some(ClipGradConfig::new(0.0))),
        OptimError::InvalidHyperParam { name, .. } if name == "max_norm"
    );
}

#[test]
fn test_wrapper_learning_rate_delegation() {
    let (mut store, w) = scalar_store(1.0, 1.0);
    let sgd = SGD::new(single_group(w), 0.1).unwrap();
    let mut wrapper = OptimWrapper::new(Box::new(sgd), 1, None).unwrap();
    wrapper.set_learning_rate(0.5);
    assert_eq!(wrapper.learning_rate(), 0.5);
    assert_eq!(wrapper.optimizer_mut().learning_rate(), 0.5);

    wrapper.zero_grad(&mut store).unwrap();
    assert!(store.grad(w).unwrap().is_none());
}
