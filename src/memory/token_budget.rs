//! Token 估算
//!
//! 分词器可插拔（Tokenizer trait），默认用字符计数启发式近似；估算器在分词结果上叠加协议的固定开销：
//! 每条消息 +4、每个函数描述 +6、每批 +2。结果对文本长度单调、可加。

use std::sync::Arc;

use crate::memory::Message;
use crate::tools::FunctionDescriptor;

/// 每条消息的固定开销
pub const MESSAGE_OVERHEAD: usize = 4;
/// 每个函数描述的固定开销
pub const FUNCTION_OVERHEAD: usize = 6;
/// 每批（消息列表 / 函数目录）的固定开销
pub const BATCH_OVERHEAD: usize = 2;

/// 分词器：返回文本的 token 数
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// 启发式分词器：英文约 4 字符/token，中文约 1.5 字符/token
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn count(&self, text: &str) -> usize {
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;
        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }
        ascii_chars.div_ceil(4) + (non_ascii_chars as f64 / 1.5).ceil() as usize
    }
}

/// Token 估算器：分词器 + 协议固定开销
#[derive(Clone)]
pub struct TokenEstimator {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(HeuristicTokenizer)
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator").finish_non_exhaustive()
    }
}

impl TokenEstimator {
    pub fn new(tokenizer: impl Tokenizer + 'static) -> Self {
        Self {
            tokenizer: Arc::new(tokenizer),
        }
    }

    pub fn text(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// 单条消息：role + content（+ function 消息的 name）+ 固定开销
    pub fn message_cost(&self, message: &Message) -> usize {
        let name = message.name.as_deref().map_or(0, |n| self.text(n));
        self.text(message.role.as_str()) + self.text(&message.content) + name + MESSAGE_OVERHEAD
    }

    pub fn messages_cost(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.message_cost(m)).sum::<usize>() + BATCH_OVERHEAD
    }

    /// 单个函数描述：name + description + parameters(JSON) + 固定开销
    pub fn descriptor_cost(&self, descriptor: &FunctionDescriptor) -> usize {
        let parameters = descriptor
            .parameters_json()
            .map(|v| v.to_string())
            .unwrap_or_default();
        self.text(&descriptor.name)
            + self.text(&descriptor.description)
            + self.text(&parameters)
            + FUNCTION_OVERHEAD
    }

    /// 函数目录；空目录不随请求发送，计 0
    pub fn catalog_cost(&self, catalog: &[FunctionDescriptor]) -> usize {
        if catalog.is_empty() {
            return 0;
        }
        catalog.iter().map(|d| self.descriptor_cost(d)).sum::<usize>() + BATCH_OVERHEAD
    }
}
