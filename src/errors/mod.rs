use thiserror::Error;
mod ops;
pub use self::ops::*;

use crate::param::ParamId;

#[derive(Error, Debug, PartialEq)]
pub enum OptimError {
    // 注册表
    #[error("优化器`{0}`未注册")]
    NotFound(String),

    // 参数存储
    #[error("参数{0:?}不存在")]
    ParamNotFound(ParamId),
    #[error("参数名`{0}`重复")]
    DuplicateName(String),
    #[error("参数`{name}`的形状不一致：期望{expected:?}，实际为{got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("优化器的参数列表为空")]
    EmptyParams,

    // 超参数与配置
    #[error("超参数`{name}`须{operator}{threshold}，实际为{value}")]
    InvalidHyperParam {
        name: String,
        operator: ComparisonOperator,
        threshold: f32,
        value: f32,
    },
    #[error("配置缺少`type`字段")]
    MissingType,
    #[error("配置项`{key}`无效：{message}")]
    InvalidConfig { key: String, message: String },
    #[error("配置解析失败：{0}")]
    Parse(String),
    #[error("读取配置文件失败：{0}")]
    Io(String),
}

impl From<serde_json::Error> for OptimError {
    fn from(err: serde_json::Error) -> Self {
        OptimError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for OptimError {
    fn from(err: std::io::Error) -> Self {
        OptimError::Io(err.to_string())
    }
}
