/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器模块单元测试
 *
 * 测试按功能分组：
 * - config: 配置解析
 * - sgd / adam / adaptive / adafactor: 内置优化器的更新公式
 * - builder: 参数分组与按配置构建
 * - wrapper: 梯度累积与裁剪
 * - bnb / sophia: 可选后端（需启用对应 feature）
 */

use ndarray::{ArrayD, IxDyn};

use crate::optim::ParamGroup;
use crate::param::{ParamId, ParamStore};

mod builder;
mod sgd;
mod wrapper;


/// 单个参数（形状`[len]`，值全为`value`，梯度全为`grad`）
fn filled_store(len: usize, value: f32, grad: f32) -> (ParamStore, ParamId) {
    let mut store = ParamStore::new();
    let id = store
        .new_parameter_with_value(ArrayD::from_elem(IxDyn(&[len]), value), Some("w"))
        .unwrap();
    store.set_grad(id, ArrayD::from_elem(IxDyn(&[len]), grad)).unwrap();
    (store, id)
}

fn scalar_store(value: f32, grad: f32) -> (ParamStore, ParamId) {
    filled_store(1, value, grad)
}

fn first_value(store: &ParamStore, id: ParamId) -> f32 {
    store.value(id).unwrap()[0]
}

fn single_group(id: ParamId) -> Vec<ParamGroup> {
    vec![ParamGroup::new(vec![id])]
}
