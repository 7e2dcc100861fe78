//! 传输层抽象
//!
//! 单次阻塞式请求 / 响应：post(JSON) -> JSON；失败即返回 TransportError，不重试、不流式。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::TransportError;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post(&self, body: &Value) -> Result<Value, TransportError>;
}
