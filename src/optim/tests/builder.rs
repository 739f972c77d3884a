/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 参数分组与按配置构建优化器
 */

use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn};

use crate::assert_err;
use crate::errors::OptimError;
use crate::optim::builder::{build_optim_wrapper, build_optimizer, param_groups};
use crate::optim::{BuildConfig, CustomKey, OptimizerConfig, ParamwiseConfig};
use crate::param::{ParamId, ParamStore};
use crate::registry::OptimizerRegistry;

/// backbone.weight, backbone.bias, head.weight, head.bias
fn model_store() -> (ParamStore, Vec<ParamId>) {
    let mut store = ParamStore::with_seed(0);
    let ids = ["backbone.weight", "backbone.bias", "head.weight", "head.bias"]
        .into_iter()
        .map(|name| {
            store
                .new_parameter_with_value(ArrayD::from_elem(IxDyn(&[2]), 1.0), Some(name))
                .unwrap()
        })
        .collect();
    (store, ids)
}

#[test]
fn test_multipliers_longest_key_wins() {
    let mut paramwise = ParamwiseConfig::default();
    paramwise.custom_keys.insert(
        "head".to_string(),
        CustomKey {
            lr_mult: 10.0,
            decay_mult: 1.0,
        },
    );
    paramwise.custom_keys.insert(
        "head.bias".to_string(),
        CustomKey {
            lr_mult: 5.0,
            decay_mult: 0.0,
        },
    );
    paramwise.bias_decay_mult = Some(0.5);

    assert_eq!(paramwise.multipliers("head.weight"), (10.0, 1.0));
    assert_eq!(paramwise.multipliers("head.bias"), (5.0, 0.0));
    // 未匹配 custom key 的 bias
    assert_eq!(paramwise.multipliers("backbone.bias"), (1.0, 0.5));
    assert_eq!(paramwise.multipliers("bias"), (1.0, 0.5));
    assert_eq!(paramwise.multipliers("backbone.weight"), (1.0, 1.0));
    // 只是包含 bias 字样
    assert_eq!(paramwise.multipliers("biased_weight"), (1.0, 1.0));
}

#[test]
fn test_multipliers_tie_breaks_alphabetically() {
    let mut paramwise = ParamwiseConfig::default();
    paramwise.custom_keys.insert(
        "wb".to_string(),
        CustomKey {
            lr_mult: 2.0,
            decay_mult: 1.0,
        },
    );
    paramwise.custom_keys.insert(
        "aw".to_string(),
        CustomKey {
            lr_mult: 3.0,
            decay_mult: 1.0,
        },
    );
    assert_eq!(paramwise.multipliers("xwb"), (2.0, 1.0));
    assert_eq!(paramwise.multipliers("awb"), (3.0, 1.0));
    assert_eq!(paramwise.multipliers("wbaw"), (3.0, 1.0));
}

#[test]
fn test_param_groups() {
    let (mut store, ids) = model_store();

    let groups = param_groups(&store, None);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].params, ids);

    let paramwise: ParamwiseConfig = serde_json::from_str(
        r#"{"custom_keys": {"head": {"lr_mult": 10.0}}, "bias_decay_mult": 0.0}"#,
    )
    .unwrap();
    let groups = param_groups(&store, Some(&paramwise));
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0].params, vec![ids[0]]);
    assert_eq!(groups[1].params, vec![ids[1]]);
    assert_eq!(groups[1].decay_mult, 0.0);
    assert_eq!(groups[2].params, vec![ids[2], ids[3]]);
    assert_eq!(groups[2].lr_mult, 10.0);

    // 冻结的参数不参与分组
    store.set_trainable(ids[0], false).unwrap();
    let groups = param_groups(&store, Some(&paramwise));
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].params, vec![ids[1]]);
}

#[test]
fn test_build_config_from_json() {
    let cfg = BuildConfig::from_json_str(
        r#"{
            "optimizer": {"type": "SGD", "lr": 0.1, "momentum": 0.9},
            "paramwise_cfg": {"custom_keys": {"head": {"lr_mult": 10.0}}},
            "clip_grad": {"max_norm": 1.0, "norm_type": "inf"},
            "accumulative_counts": 4
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.optimizer.kind, "SGD");
    assert_eq!(cfg.accumulative_counts, 4);
    let clip = cfg.clip_grad.unwrap();
    assert_eq!(clip.max_norm, 1.0);
    assert!(clip.norm_type.is_infinite());
    let custom = cfg.paramwise_cfg.unwrap().custom_keys["head"];
    assert_eq!(custom.lr_mult, 10.0);
    assert_eq!(custom.decay_mult, 1.0);

    let cfg = BuildConfig::from_json_str(r#"{"optimizer": {"type": "Adam"}}"#).unwrap();
    assert_eq!(cfg.accumulative_counts, 1);
    assert!(cfg.clip_grad.is_none());
    assert!(cfg.paramwise_cfg.is_none());

    assert_err!(
        BuildConfig::from_json_str(r#"{"optimizer": {"type": "Adam"}, "unknown": 1}"#),
        OptimError::Parse(_)
    );
    assert_err!(
        BuildConfig::from_json_str(
            r#"{"optimizer": {"type": "Adam"}, "clip_grad": {"max_norm": 1.0, "norm_type": "l3"}}"#
        ),
        OptimError::Parse(_)
    );
}

#[test]
fn test_build_optimizer_from_registry() {
    let (mut store, ids) = model_store();
    let registry = OptimizerRegistry::with_builtins();
    let cfg = BuildConfig::from_json_str(
        r#"{
            "optimizer": {"type": "SGD", "lr": 0.1},
            "paramwise_cfg": {"custom_keys": {"head": {"lr_mult": 2.0}}}
        }"#,
    )
    .unwrap();
    let mut optimizer = build_optimizer(&registry, &store, &cfg).unwrap();
    assert_eq!(optimizer.name(), "SGD");
    assert_eq!(optimizer.param_groups().len(), 2);

    for &id in &ids {
        store.set_grad(id, ArrayD::ones(IxDyn(&[2]))).unwrap();
    }
    optimizer.step(&mut store).unwrap();
    assert_abs_diff_eq!(store.value(ids[0]).unwrap()[0], 0.9, epsilon = 1e-6);
    assert_abs_diff_eq!(store.value(ids[2]).unwrap()[0], 0.8, epsilon = 1e-6);
}

#[test]
fn test_build_unknown_type() {
    let (store, _) = model_store();
    let registry = OptimizerRegistry::with_builtins();
    let cfg = BuildConfig::new(OptimizerConfig::new("Adafactor"));
    assert_err!(
        build_optimizer(&registry, &store, &cfg),
        OptimError::NotFound("Adafactor")
    );
}

#[test]
fn test_build_optim_wrapper() {
    let (store, _) = model_store();
    let registry = OptimizerRegistry::with_builtins();
    let mut cfg = BuildConfig::new(OptimizerConfig::new("AdamW").with("lr", 1e-3));
    cfg.accumulative_counts = 2;
    let wrapper = build_optim_wrapper(&registry, &store, &cfg).unwrap();
    assert_eq!(wrapper.optimizer().name(), "AdamW");
    assert_abs_diff_eq!(wrapper.learning_rate(), 1e-3, epsilon = 1e-9);

    cfg.accumulative_counts = 0;
    assert_err!(
        build_optim_wrapper(&registry, &store, &cfg),
        OptimError::InvalidConfig { key, .. } if key == "accumulative_counts"
    );
}
