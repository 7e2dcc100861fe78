//! 脚本化传输（用于测试，无需 API）
//!
//! 按顺序回放预置的响应，并记录每次收到的请求体；脚本耗尽时返回 TransportError。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::TransportError;
use crate::llm::ChatTransport;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, TransportError>>>,
    requests: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<Value, TransportError>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
        self
    }

    pub fn push_text(&self, content: &str, finish_reason: &str) -> &Self {
        self.push(Ok(text_response(content, finish_reason)))
    }

    pub fn push_function_call(&self, name: &str, arguments: &str) -> &Self {
        self.push(Ok(function_call_response(name, arguments)))
    }

    /// 已收到的请求体（按时间顺序）
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn post(&self, body: &Value) -> Result<Value, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(body.clone());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Err(TransportError::new(None, "no scripted response left")))
    }
}

/// 普通文本回复
pub fn text_response(content: &str, finish_reason: &str) -> Value {
    json!({
        "choices": [{
            "index": 0,
            "finish_reason": finish_reason,
            "message": {"role": "assistant", "content": content}
        }]
    })
}

/// 函数调用回复
pub fn function_call_response(name: &str, arguments: &str) -> Value {
    json!({
        "choices": [{
            "index": 0,
            "finish_reason": "function_call",
            "message": {
                "role": "assistant",
                "content": null,
                "function_call": {"name": name, "arguments": arguments}
            }
        }]
    })
}
