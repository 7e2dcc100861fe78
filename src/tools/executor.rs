//! 函数调用分发器
//!
//! invoke(限定名, 参数 JSON 文本)：解析参数 → 解析函数名 → 校验必填 → 按声明类型转换 → 调用插件；
//! 失败统一转为 InvocationError；每次调用输出结构化审计日志（JSON）。
//! 操作不具备事务性：先产生副作用后失败的操作，其副作用不会回滚。

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Number, Value};

use crate::core::InvocationError;
use crate::tools::{CallArguments, FunctionDescriptor, FunctionRegistry, SchemaKind};

/// 分发器：持有不可变注册表的共享引用
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// 调用函数并返回操作结果；输出 JSON 审计日志
    pub async fn invoke(&self, qualified_name: &str, arguments: &str) -> Result<Value, InvocationError> {
        let start = Instant::now();
        let result = self.invoke_inner(qualified_name, arguments).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(InvocationError::UnknownFunction(_)) => "unknown_function",
            Err(InvocationError::OperationFailed(_)) => "operation_failed",
            Err(_) => "invalid_arguments",
        };
        let audit = serde_json::json!({
            "event": "function_audit",
            "function": qualified_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(arguments),
        });
        tracing::info!(audit = %audit.to_string(), "function");

        result
    }

    async fn invoke_inner(&self, qualified_name: &str, arguments: &str) -> Result<Value, InvocationError> {
        let payload = parse_arguments(arguments)?;
        let resolved = self
            .registry
            .resolve(qualified_name)
            .map_err(|_| InvocationError::UnknownFunction(qualified_name.to_string()))?;
        let args = bind_arguments(resolved.descriptor, payload)?;

        resolved
            .plugin
            .invoke(resolved.operation, &args)
            .await
            .map_err(InvocationError::OperationFailed)
    }
}

/// 将参数文本解析为扁平 JSON 对象；空文本视为 {}
pub fn parse_arguments(arguments: &str) -> Result<Map<String, Value>, InvocationError> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(InvocationError::MalformedArguments(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(InvocationError::MalformedArguments(e.to_string())),
    }
}

/// 按描述校验并转换参数，结果按声明顺序排列；null 视为缺省，未声明的键忽略
pub fn bind_arguments(
    descriptor: &FunctionDescriptor,
    mut payload: Map<String, Value>,
) -> Result<CallArguments, InvocationError> {
    let mut args = CallArguments::new();
    for param in &descriptor.parameters {
        match payload.remove(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(InvocationError::MissingArgument(param.name.clone()));
                }
            }
            Some(value) => {
                let coerced = coerce(&param.name, param.kind, value)?;
                args.push(param.name.clone(), coerced);
            }
        }
    }
    if !payload.is_empty() {
        let ignored: Vec<&String> = payload.keys().collect();
        tracing::debug!(function = %descriptor.name, ?ignored, "ignoring undeclared arguments");
    }
    Ok(args)
}

/// 将单个值转换为声明类型；模型常把数字/布尔写成字符串，这里一并接受
pub fn coerce(name: &str, kind: SchemaKind, value: Value) -> Result<Value, InvocationError> {
    let mismatch = |value: &Value| InvocationError::ArgumentTypeMismatch {
        name: name.to_string(),
        expected: kind.to_string(),
        found: json_type_name(value).to_string(),
    };

    match (kind, value) {
        (SchemaKind::String, v @ Value::String(_)) => Ok(v),
        (SchemaKind::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Ok(Value::Number(n))
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Value::from(f as i64))
                    }
                    _ => Err(mismatch(&Value::Number(n))),
                }
            }
        }
        (SchemaKind::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(Value::from(i)),
            Err(_) => Err(mismatch(&Value::String(s))),
        },
        (SchemaKind::Number, v @ Value::Number(_)) => Ok(v),
        (SchemaKind::Number, Value::String(s)) => {
            match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(mismatch(&Value::String(s))),
            }
        }
        (SchemaKind::Boolean, v @ Value::Bool(_)) => Ok(v),
        (SchemaKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch(&Value::String(s))),
        },
        (SchemaKind::Array, v @ Value::Array(_)) => Ok(v),
        (SchemaKind::Object, v @ Value::Object(_)) => Ok(v),
        (_, other) => Err(mismatch(&other)),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

fn args_preview(args: &str) -> String {
    if args.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", args.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        args.to_string()
    }
}
