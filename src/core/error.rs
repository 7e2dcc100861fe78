//! 错误类型
//!
//! 按阶段划分：Schema 构建（启动期，致命）、注册表构建（启动期，致命）、函数调用（可恢复，反馈给模型）、
//! Token 预算、传输层（致命），以及编排器对外暴露的 ChatError。

use thiserror::Error;

/// 类型映射失败（不含上下文，由 Schema 生成器补全插件/操作/参数信息）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported type: {0}")]
pub struct UnsupportedType(pub String);

/// Schema 生成失败：参数类型无法映射到 JSON Schema 基本类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unsupported type '{type_name}' for parameter '{parameter}' of {plugin}-{operation}")]
    UnsupportedType {
        plugin: String,
        operation: String,
        parameter: String,
        type_name: String,
    },
}

/// 函数注册表构建 / 解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate plugin id: {0}")]
    DuplicatePlugin(String),

    #[error("Duplicate function name: {0}")]
    DuplicateFunction(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Function not found: {0}")]
    NotFound(String),
}

/// 单次函数调用失败（由模型发起，错误作为反馈交还给模型）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Malformed arguments: {0}")]
    MalformedArguments(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Argument '{name}' expected {expected}, got {found}")]
    ArgumentTypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Token 预算无法满足（即使只剩 system 消息也超限）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("Token budget exhausted: {required} tokens required, limit {limit}")]
    Exhausted { required: usize, limit: usize },
}

/// 传输层失败：status 为 None 表示请求未得到 HTTP 状态（连接失败、超时等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", display_transport(.status, .reason))]
pub struct TransportError {
    pub status: Option<u16>,
    pub reason: String,
}

fn display_transport(status: &Option<u16>, reason: &str) -> String {
    match status {
        Some(code) => format!("API call failed with status code {code}: {reason}"),
        None => format!("API call failed: {reason}"),
    }
}

impl TransportError {
    pub fn new(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// 编排器错误：除调用时序错误（NotAwaitingInput / NeedsUserInput）外均为终止性错误（循环停止）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("Not awaiting user input (phase: {0})")]
    NotAwaitingInput(String),

    #[error("Awaiting user input, no request pending")]
    NeedsUserInput,

    #[error("Request encoding failed: {0}")]
    Encode(String),

    #[error("Conversation halted: {0}")]
    Halted(String),
}

impl ChatError {
    /// 是否终止对话循环
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatError::NotAwaitingInput(_) | ChatError::NeedsUserInput)
    }
}
