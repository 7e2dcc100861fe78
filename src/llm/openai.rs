//! OpenAI 兼容端点的 HTTP 传输
//!
//! 通过 reqwest 以 Bearer 认证 POST JSON 到可配置的 endpoint；非 2xx 状态转为 TransportError（带状态码与原因）。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::TransportError;
use crate::llm::ChatTransport;

/// 错误响应体预览最大字符数
const ERROR_BODY_PREVIEW_CHARS: usize = 300;

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::new(None, format!("http client init failed: {e}")))?;
        Ok(Self::with_client(client, endpoint, api_key))
    }

    /// 使用外部构建的 client（代理、TLS 等由调用方配置）
    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post(&self, body: &Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::new(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            let phrase = status.canonical_reason().unwrap_or("Unknown");
            let reason = if preview.trim().is_empty() {
                phrase.to_string()
            } else {
                format!("{phrase} ({})", preview.trim())
            };
            tracing::error!(status = status.as_u16(), %reason, "chat endpoint returned error");
            return Err(TransportError::new(Some(status.as_u16()), reason));
        }

        response.json::<Value>().await.map_err(|e| {
            TransportError::new(Some(status.as_u16()), format!("invalid response body: {e}"))
        })
    }
}
