//! 远端对话协议的请求 / 响应结构
//!
//! 请求：`{model, messages, max_tokens, functions}`；响应只消费首个 choice 的 finish_reason 与 message。

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::tools::FunctionDescriptor;

/// 发往远端的请求体
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub functions: &'a [FunctionDescriptor],
}

/// 远端响应（只保留用到的字段，其余忽略）
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionCallRequest>,
}

/// 模型发起的函数调用：arguments 为 JSON 编码的参数对象文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// 结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// 达到 max_tokens，回复被截断
    Length,
    FunctionCall,
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("function_call") => FinishReason::FunctionCall,
            Some(other) => FinishReason::Other(other.to_string()),
            None => FinishReason::Other(String::new()),
        }
    }
}
