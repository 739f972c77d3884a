/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 参数存储：优化器读写的具名参数（值 + 梯度）
 *
 * 本模块不做自动求导，梯度由调用方（训练循环）写入，
 * 优化器在 `step()` 时读取梯度并原地更新参数值。
 */

use ndarray::{ArrayD, IxDyn};
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

use crate::errors::OptimError;


/// 参数在 `ParamStore` 中的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub(crate) usize);

impl ParamId {
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// 单个可训练参数
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: ArrayD<f32>,
    grad: Option<ArrayD<f32>>,
    trainable: bool,
}

impl Parameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub const fn grad(&self) -> Option<&ArrayD<f32>> {
        self.grad.as_ref()
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub const fn is_trainable(&self) -> bool {
        self.trainable
    }

    /// 元素个数
    pub fn numel(&self) -> usize {
        self.value.len()
    }

    fn check_shape(&self, got: &[usize]) -> Result<(), OptimError> {
        if self.value.shape() != got {
            return Err(OptimError::ShapeMismatch {
                name: self.name.clone(),
                expected: self.value.shape().to_vec(),
                got: got.to_vec(),
            });
        }
        Ok(())
    }
}

/// 参数存储，按插入顺序保存所有参数
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    params: Vec<Parameter>,
    seed: Option<u64>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带随机种子的参数存储，使随机初始化可复现
    pub fn with_seed(seed: u64) -> Self {
        Self {
            params: Vec::new(),
            seed: Some(seed),
        }
    }

    /// 新建参数，值在`[-1/√fan_in, 1/√fan_in]`内均匀随机初始化
    ///
    /// `fan_in`取最后一维的大小（标量取1）。`name`为`None`时自动命名为`param_<序号>`。
    pub fn new_parameter(
        &mut self,
        shape: &[usize],
        name: Option<&str>,
    ) -> Result<ParamId, OptimError> {
        let fan_in = shape.last().copied().unwrap_or(1).max(1);
        let bound = 1.0 / (fan_in as f32).sqrt();
        let dist = Uniform::from(-bound..=bound);
        let len = shape.iter().product::<usize>();
        let data: Vec<f32> = match self.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(self.params.len() as u64));
                (0..len).map(|_| dist.sample(&mut rng)).collect()
            }
            None => {
                let mut rng = rand::thread_rng();
                (0..len).map(|_| dist.sample(&mut rng)).collect()
            }
        };
        let value = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| {
            OptimError::InvalidConfig {
                key: "shape".to_string(),
                message: e.to_string(),
            }
        })?;
        self.new_parameter_with_value(value, name)
    }

    /// 以给定初值新建参数
    pub fn new_parameter_with_value(
        &mut self,
        value: ArrayD<f32>,
        name: Option<&str>,
    ) -> Result<ParamId, OptimError> {
        let id = ParamId(self.params.len());
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("param_{}", id.0),
        };
        if self.find(&name).is_some() {
            return Err(OptimError::DuplicateName(name));
        }
        self.params.push(Parameter {
            name,
            value,
            grad: None,
            trainable: true,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// 按名称查找参数
    pub fn find(&self, name: &str) -> Option<ParamId> {
        self.params
            .iter()
            .position(|p| p.name == name)
            .map(ParamId)
    }

    pub fn get(&self, id: ParamId) -> Result<&Parameter, OptimError> {
        self.params.get(id.0).ok_or(OptimError::ParamNotFound(id))
    }

    fn get_mut(&mut self, id: ParamId) -> Result<&mut Parameter, OptimError> {
        self.params.get_mut(id.0).ok_or(OptimError::ParamNotFound(id))
    }

    pub fn value(&self, id: ParamId) -> Result<&ArrayD<f32>, OptimError> {
        Ok(&self.get(id)?.value)
    }

    pub fn set_value(&mut self, id: ParamId, value: ArrayD<f32>) -> Result<(), OptimError> {
        let param = self.get_mut(id)?;
        param.check_shape(value.shape())?;
        param.value = value;
        Ok(())
    }

    pub fn grad(&self, id: ParamId) -> Result<Option<&ArrayD<f32>>, OptimError> {
        Ok(self.get(id)?.grad.as_ref())
    }

    /// 覆盖写入梯度
    pub fn set_grad(&mut self, id: ParamId, grad: ArrayD<f32>) -> Result<(), OptimError> {
        let param = self.get_mut(id)?;
        param.check_shape(grad.shape())?;
        param.grad = Some(grad);
        Ok(())
    }

    /// 累加梯度（无梯度时等同于`set_grad`），用于梯度累积
    pub fn accumulate_grad(&mut self, id: ParamId, grad: &ArrayD<f32>) -> Result<(), OptimError> {
        let param = self.get_mut(id)?;
        param.check_shape(grad.shape())?;
        match param.grad.as_mut() {
            Some(existing) => *existing += grad,
            None => param.grad = Some(grad.clone()),
        }
        Ok(())
    }

    pub fn clear_grad(&mut self, id: ParamId) -> Result<(), OptimError> {
        self.get_mut(id)?.grad = None;
        Ok(())
    }

    /// 清空所有参数的梯度
    pub fn zero_grad(&mut self) {
        for param in &mut self.params {
            param.grad = None;
        }
    }

    /// 冻结/解冻参数；冻结的参数不会出现在`trainable_params()`中
    pub fn set_trainable(&mut self, id: ParamId, trainable: bool) -> Result<(), OptimError> {
        self.get_mut(id)?.trainable = trainable;
        Ok(())
    }

    /// 所有可训练参数的 ID（按插入顺序）
    pub fn trainable_params(&self) -> Vec<ParamId> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.trainable)
            .map(|(i, _)| ParamId(i))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Parameter)> {
        self.params.iter().enumerate().map(|(i, p)| (ParamId(i), p))
    }

    /// 同时取得参数值的可变引用与梯度；参数无梯度时返回`None`
    pub(crate) fn value_and_grad_mut(
        &mut self,
        id: ParamId,
    ) -> Result<Option<(&mut ArrayD<f32>, &ArrayD<f32>)>, OptimError> {
        let Parameter { value, grad, .. } = self.get_mut(id)?;
        Ok(grad.as_ref().map(|grad| (value, grad)))
    }

    /// 梯度的可变引用（用于梯度裁剪、缩放）
    pub(crate) fn grad_mut(&mut self, id: ParamId) -> Result<Option<&mut ArrayD<f32>>, OptimError> {
        Ok(self.get_mut(id)?.grad.as_mut())
    }
}
