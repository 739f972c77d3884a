/*
 * @Author       : 老董
 * @Date         : 2026-10-18 10:00:00
 * @LastEditors  : 老董
 * @LastEditTime : 2026-10-18 10:00:00
 * @Description  : 优化器配置：`{"type": "<注册名>", ...超参数}`
 */

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::OptimError;

/// 单个优化器的配置
///
/// ```ignore
/// let cfg = OptimizerConfig::from_json_str(r#"{"type": "SGD", "lr": 0.1, "momentum": 0.9}"#)?;
/// assert_eq!(cfg.kind, "SGD");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// 注册表中的优化器名
    #[serde(rename = "type")]
    pub kind: String,
    /// 其余超参数
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl OptimizerConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Map::new(),
        }
    }

    /// 链式设置超参数
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, OptimError> {
        Self::from_value(serde_json::from_str(s)?)
    }

    pub fn from_value(value: Value) -> Result<Self, OptimError> {
        match &value {
            Value::Object(obj) if !obj.contains_key("type") => Err(OptimError::MissingType),
            _ => Ok(serde_json::from_value(value)?),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptimError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 拒绝`allowed`之外的配置项（对应关键字参数不匹配）
    pub fn check_keys(&self, allowed: &[&str]) -> Result<(), OptimError> {
        match self.options.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(invalid(
                key,
                format!("`{}`不接受该配置项，可用项为{:?}", self.kind, allowed),
            )),
            None => Ok(()),
        }
    }

    pub fn get_f32(&self, key: &str, default: f32) -> Result<f32, OptimError> {
        Ok(self.get_opt_f32(key)?.unwrap_or(default))
    }

    /// 缺省或为`null`时返回`None`
    pub fn get_opt_f32(&self, key: &str) -> Result<Option<f32>, OptimError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => as_f32(key, value).map(Some),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, OptimError> {
        match self.options.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(invalid(key, format!("应为布尔值，实际为{other}"))),
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize, OptimError> {
        match self.options.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| invalid(key, format!("应为非负整数，实际为{value}"))),
        }
    }

    /// 读取二元组，如`betas: [0.9, 0.999]`
    pub fn get_pair(&self, key: &str, default: (f32, f32)) -> Result<(f32, f32), OptimError> {
        let (first, second) = self.get_opt_pair(key)?;
        Ok((first.unwrap_or(default.0), second.unwrap_or(default.1)))
    }

    /// 读取元素可为`null`的二元组，如`eps: [null, 1e-3]`
    pub fn get_opt_pair(&self, key: &str) -> Result<(Option<f32>, Option<f32>), OptimError> {
        match self.options.get(key) {
            None => Ok((None, None)),
            Some(Value::Array(items)) if items.len() == 2 => {
                let pick = |v: &Value| match v {
                    Value::Null => Ok(None),
                    v => as_f32(key, v).map(Some),
                };
                Ok((pick(&items[0])?, pick(&items[1])?))
            }
            Some(other) => Err(invalid(key, format!("应为长度为2的数组，实际为{other}"))),
        }
    }
}

fn as_f32(key: &str, value: &Value) -> Result<f32, OptimError> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| invalid(key, format!("应为数值，实际为{value}")))
}

fn invalid(key: &str, message: String) -> OptimError {
    OptimError::InvalidConfig {
        key: key.to_string(),
        message,
    }
}
