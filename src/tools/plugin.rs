//! 插件边界：每个插件声明一张静态操作表（名称 / 描述 / 参数），并提供统一的调用入口
//!
//! 插件在进程启动时一次性注册，运行期不增删；函数目录与分发表都由这里声明的操作表生成。

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::ValueType;

/// 单个参数声明
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub description: String,
    pub value_type: ValueType,
    pub optional: bool,
}

impl ParamDecl {
    pub fn required(
        name: impl Into<String>,
        value_type: ValueType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value_type,
            optional: false,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        value_type: ValueType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            optional: true,
            ..Self::required(name, value_type, description)
        }
    }
}

/// 单个可调用操作的声明
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamDecl>,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.parameters.push(param);
        self
    }
}

/// 已校验、已转换的调用参数，按声明顺序排列；缺省的可选参数不出现
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArguments {
    values: Vec<(String, Value)>,
}

impl CallArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: Value) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// 取字符串参数；缺失时返回错误文本（供插件直接 `?` 向上返回）
    pub fn str(&self, name: &str) -> Result<&str, String> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("missing string argument '{name}'"))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 插件 trait：标识、操作表、异步调用入口（operation 为未限定的操作名）
#[async_trait]
pub trait ChatPlugin: Send + Sync {
    /// 插件标识，作为限定函数名的前缀（`<id>-<operation>`）
    fn id(&self) -> &str;

    fn operations(&self) -> Vec<OperationSpec>;

    /// 执行操作；Err 为操作自身的失败（如文件不存在），会作为函数结果反馈给模型
    async fn invoke(&self, operation: &str, args: &CallArguments) -> Result<Value, String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_arguments_accessors() {
        let mut args = CallArguments::new();
        args.push("path", json!("a.txt"));
        args.push("append", json!(true));
        args.push("count", json!(3));

        assert_eq!(args.str("path"), Ok("a.txt"));
        assert_eq!(args.opt_bool("append"), Some(true));
        assert_eq!(args.get("count"), Some(&json!(3)));
        assert!(args.str("missing").is_err());
        assert_eq!(args.opt_str("missing"), None);
        let names: Vec<&str> = args.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["path", "append", "count"]);
    }

    #[test]
    fn test_param_decl_optional() {
        let p = ParamDecl::optional("append", ValueType::Boolean, "Append instead of overwrite");
        assert!(p.optional);
        let p = ParamDecl::required("path", ValueType::Text, "");
        assert!(!p.optional);
    }
}
