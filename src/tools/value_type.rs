//! 类型映射：插件参数的值类型 → JSON Schema 基本类型
//!
//! 纯函数，无状态；不支持的类型在构建函数目录时即失败，绝不会拖到调用期。

use schemars::schema::InstanceType;
use serde::{Deserialize, Serialize};

use crate::core::UnsupportedType;

/// 插件声明的参数值类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Text,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Boolean,
    /// 日期时间，以文本传递（如 RFC 3339）
    DateTime,
    /// 任意 JSON 对象
    Object,
    /// 任意可枚举序列，元素类型不参与映射
    Sequence,
    /// 其它类型（如二进制流、句柄），一律不支持
    Other(String),
}

/// JSON Schema 基本类型（函数描述中每个参数的 "type"）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::String => "string",
            SchemaKind::Integer => "integer",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Array => "array",
            SchemaKind::Object => "object",
        }
    }

    pub fn instance_type(&self) -> InstanceType {
        match self {
            SchemaKind::String => InstanceType::String,
            SchemaKind::Integer => InstanceType::Integer,
            SchemaKind::Number => InstanceType::Number,
            SchemaKind::Boolean => InstanceType::Boolean,
            SchemaKind::Array => InstanceType::Array,
            SchemaKind::Object => InstanceType::Object,
        }
    }
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 值类型 → Schema 类型；Other 返回 UnsupportedType
pub fn classify(value_type: &ValueType) -> Result<SchemaKind, UnsupportedType> {
    match value_type {
        ValueType::Text | ValueType::DateTime => Ok(SchemaKind::String),
        ValueType::Int16 | ValueType::Int32 | ValueType::Int64 => Ok(SchemaKind::Integer),
        ValueType::Float32 | ValueType::Float64 | ValueType::Decimal => Ok(SchemaKind::Number),
        ValueType::Boolean => Ok(SchemaKind::Boolean),
        ValueType::Object => Ok(SchemaKind::Object),
        ValueType::Sequence => Ok(SchemaKind::Array),
        ValueType::Other(name) => Err(UnsupportedType(name.clone())),
    }
}
