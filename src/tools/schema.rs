//! 函数描述生成（schemars 构建参数 JSON Schema）
//!
//! describe(plugin) 为插件的每个操作生成一个 FunctionDescriptor：名称 `<插件>-<操作>`，
//! 参数按声明顺序经类型映射得到 ParameterSpec。任一参数类型不支持则整个插件失败，不产出部分结果。

use schemars::schema::{InstanceType, Metadata, ObjectValidation, Schema, SchemaObject, SingleOrVec};
use serde::{ser::Error as _, Serialize, Serializer};
use serde_json::Value;

use crate::core::SchemaError;
use crate::tools::{classify, ChatPlugin, OperationSpec, SchemaKind};

/// 限定名中插件标识与操作名之间的分隔符
pub const NAME_SEPARATOR: char = '-';

/// 拼接限定函数名
pub fn qualified_name(plugin_id: &str, operation: &str) -> String {
    format!("{plugin_id}{NAME_SEPARATOR}{operation}")
}

/// 按第一个分隔符拆分限定名；任一部分为空时返回 None
pub fn split_qualified_name(name: &str) -> Option<(&str, &str)> {
    let (plugin, operation) = name.split_once(NAME_SEPARATOR)?;
    if plugin.is_empty() || operation.is_empty() {
        return None;
    }
    Some((plugin, operation))
}

/// 参数规格（构建后不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: SchemaKind,
    pub description: String,
    pub required: bool,
}

/// 函数描述：随每次请求发送给模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl FunctionDescriptor {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// 参数对象的 JSON Schema：`{"type": "object", "properties": {...}, "required": [...]}`
    pub fn parameters_schema(&self) -> SchemaObject {
        let mut object = ObjectValidation::default();
        for param in &self.parameters {
            let property = SchemaObject {
                metadata: description_metadata(&param.description),
                instance_type: Some(SingleOrVec::Single(Box::new(param.kind.instance_type()))),
                ..Default::default()
            };
            object
                .properties
                .insert(param.name.clone(), Schema::Object(property));
            if param.required {
                object.required.insert(param.name.clone());
            }
        }

        SchemaObject {
            metadata: description_metadata(&self.description),
            instance_type: Some(SingleOrVec::Single(Box::new(InstanceType::Object))),
            object: Some(Box::new(object)),
            ..Default::default()
        }
    }

    /// 参数 Schema 的 JSON 形式；required 按声明顺序输出（schemars 内部按字典序存放）
    pub fn parameters_json(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self.parameters_schema())?;
        if let Some(object) = value.as_object_mut() {
            if object.contains_key("required") {
                let ordered = self
                    .parameters
                    .iter()
                    .filter(|p| p.required)
                    .map(|p| Value::String(p.name.clone()))
                    .collect();
                object.insert("required".to_string(), Value::Array(ordered));
            }
        }
        Ok(value)
    }
}

fn description_metadata(description: &str) -> Option<Box<Metadata>> {
    if description.is_empty() {
        return None;
    }
    Some(Box::new(Metadata {
        description: Some(description.to_string()),
        ..Default::default()
    }))
}

#[derive(Serialize)]
struct WireDescriptor<'a> {
    name: &'a str,
    description: &'a str,
    parameters: Value,
}

impl Serialize for FunctionDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireDescriptor {
            name: &self.name,
            description: &self.description,
            parameters: self.parameters_json().map_err(S::Error::custom)?,
        }
        .serialize(serializer)
    }
}

/// 为插件的全部操作生成描述；任一参数类型不支持则返回 UnsupportedType
pub fn describe(plugin: &dyn ChatPlugin) -> Result<Vec<FunctionDescriptor>, SchemaError> {
    let plugin_id = plugin.id();
    plugin
        .operations()
        .iter()
        .map(|op| describe_operation(plugin_id, op))
        .collect()
}

fn describe_operation(
    plugin_id: &str,
    op: &OperationSpec,
) -> Result<FunctionDescriptor, SchemaError> {
    let parameters = op
        .parameters
        .iter()
        .map(|p| {
            let kind = classify(&p.value_type).map_err(|e| SchemaError::UnsupportedType {
                plugin: plugin_id.to_string(),
                operation: op.name.clone(),
                parameter: p.name.clone(),
                type_name: e.0,
            })?;
            Ok(ParameterSpec {
                name: p.name.clone(),
                kind,
                description: p.description.clone(),
                required: !p.optional,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    Ok(FunctionDescriptor {
        name: qualified_name(plugin_id, &op.name),
        description: op.description.clone(),
        parameters,
    })
}
