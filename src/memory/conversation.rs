//! 短期记忆：对话缓冲区
//!
//! 位置 0 固定为 system 消息，创建后不再修改、不会被淘汰；之后的消息按追加顺序排列。
//! enforce_budget 按 FIFO 淘汰最旧的非 system 消息（位置 1），直到满足
//! `token_count + max_response_tokens <= token_limit`；只剩一条非 system 消息仍超限时截断其内容。

use serde::{Deserialize, Serialize};

use crate::core::BudgetError;
use crate::memory::TokenEstimator;

/// 截断内容后追加的标记
pub const TRUNCATION_MARKER: &str = "...\n[truncated due to token budget]";

/// 消息角色（与远端协议一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

/// 单条消息；function 消息额外携带函数名
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(Role::Function, content)
        }
    }
}

/// enforce_budget 的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetOutcome {
    pub evicted: usize,
    pub truncated: bool,
    pub token_count: usize,
}

/// 对话缓冲区：system 消息 + 有序消息序列 + 运行中的 token 计数
#[derive(Clone, Debug)]
pub struct ConversationBuffer {
    messages: Vec<Message>,
    /// 与 messages 一一对应的单条消息开销
    costs: Vec<usize>,
    /// costs 之和（不含批次开销）
    running: usize,
    estimator: TokenEstimator,
}

impl ConversationBuffer {
    pub fn new(system_prompt: impl Into<String>, estimator: TokenEstimator) -> Self {
        let system = Message::system(system_prompt);
        let cost = estimator.message_cost(&system);
        Self {
            messages: vec![system],
            costs: vec![cost],
            running: cost,
            estimator,
        }
    }

    pub fn append(&mut self, message: Message) {
        let cost = self.estimator.message_cost(&message);
        self.running += cost;
        self.costs.push(cost);
        self.messages.push(message);
    }

    /// 全部消息（含位置 0 的 system）
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.get(1..).and_then(<[Message]>::last)
    }

    /// 总条数（含 system）
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// system 始终存在，缓冲区从不为空
    pub fn is_empty(&self) -> bool {
        false
    }

    /// 当前全部消息的 token 数（含批次开销）
    pub fn token_count(&self) -> usize {
        self.running + crate::memory::token_budget::BATCH_OVERHEAD
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// 清空非 system 消息
    pub fn clear(&mut self) {
        self.messages.truncate(1);
        self.costs.truncate(1);
        self.running = self.costs[0];
    }

    /// FIFO 淘汰直至满足预算；只剩一条非 system 消息时改为截断其内容，仍无法满足则返回 Exhausted
    pub fn enforce_budget(
        &mut self,
        max_response_tokens: usize,
        token_limit: usize,
    ) -> Result<BudgetOutcome, BudgetError> {
        let fits = |count: usize| count.saturating_add(max_response_tokens) <= token_limit;
        let mut evicted = 0;

        while !fits(self.token_count()) && self.messages.len() > 2 {
            self.evict_oldest();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(evicted, tokens = self.token_count(), "evicted oldest messages");
        }

        let mut truncated = false;
        if !fits(self.token_count()) && self.messages.len() == 2 {
            truncated = self.truncate_last(max_response_tokens, token_limit);
        }

        let token_count = self.token_count();
        if !fits(token_count) {
            return Err(BudgetError::Exhausted {
                required: token_count.saturating_add(max_response_tokens),
                limit: token_limit,
            });
        }
        Ok(BudgetOutcome {
            evicted,
            truncated,
            token_count,
        })
    }

    fn evict_oldest(&mut self) {
        self.messages.remove(1);
        let cost = self.costs.remove(1);
        self.running -= cost;
    }

    /// 将位置 1 的消息截断为能放进预算的最长前缀（加截断标记）；成功返回 true
    fn truncate_last(&mut self, max_response_tokens: usize, token_limit: usize) -> bool {
        let original = self.messages[1].content.clone();
        let base = self.running - self.costs[1] + crate::memory::token_budget::BATCH_OVERHEAD;
        let Some(available) = token_limit.checked_sub(base.saturating_add(max_response_tokens)) else {
            return false;
        };

        let boundaries: Vec<usize> = original
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(original.len()))
            .collect();
        let candidate = |chars: usize| {
            let mut m = self.messages[1].clone();
            m.content = format!("{}{}", &original[..boundaries[chars]], TRUNCATION_MARKER);
            m
        };

        if self.estimator.message_cost(&candidate(0)) > available {
            return false;
        }
        // 二分查找能放下的最长前缀（估算对长度单调）
        let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if self.estimator.message_cost(&candidate(mid)) <= available {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let replacement = candidate(lo);
        let cost = self.estimator.message_cost(&replacement);
        tracing::warn!(
            role = replacement.role.as_str(),
            kept_chars = lo,
            original_chars = boundaries.len() - 1,
            "message truncated to fit token budget"
        );
        self.running = self.running - self.costs[1] + cost;
        self.costs[1] = cost;
        self.messages[1] = replacement;
        true
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::memory::token_budget::{Tokenizer, BATCH_OVERHEAD, MESSAGE_OVERHEAD};

    /// 只计固定开销的分词器：每条消息恰好 MESSAGE_OVERHEAD
    struct Flat;

    impl Tokenizer for Flat {
        fn count(&self, _text: &str) -> usize {
            0
        }
    }

    /// 按字符计数
    struct PerChar;

    impl Tokenizer for PerChar {
        fn count(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    fn contents(buf: &ConversationBuffer) -> Vec<&str> {
        buf.messages().iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_fifo_eviction_keeps_system() {
        let mut buf = ConversationBuffer::new("sys", TokenEstimator::new(Flat));
        for m in ["m1", "m2", "m3"] {
            buf.append(Message::user(m));
        }
        let unit = MESSAGE_OVERHEAD;
        assert_eq!(buf.token_count(), 4 * unit + BATCH_OVERHEAD);

        // 超出预算两条消息的量
        let max_response = 10;
        let limit = buf.token_count() - 2 * unit + max_response;
        let outcome = buf.enforce_budget(max_response, limit).unwrap();

        assert_eq!(contents(&buf), vec!["sys", "m3"]);
        assert_eq!(outcome.evicted, 2);
        assert!(!outcome.truncated);
        assert_eq!(buf.system().role, Role::System);
    }

    #[test]
    fn test_within_budget_is_noop() {
        let mut buf = ConversationBuffer::new("sys", TokenEstimator::default());
        buf.append(Message::user("hello"));
        let outcome = buf.enforce_budget(100, 10_000).unwrap();
        assert_eq!(outcome.evicted, 0);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_single_oversized_message_is_truncated() {
        let mut buf = ConversationBuffer::new("sys", TokenEstimator::new(PerChar));
        buf.append(Message::user("a".repeat(500)));
        buf.append(Message::user("b".repeat(500)));

        let outcome = buf.enforce_budget(50, 200).unwrap();
        assert_eq!(outcome.evicted, 1);
        assert!(outcome.truncated);
        assert!(buf.token_count() + 50 <= 200);

        let last = buf.last().unwrap();
        assert!(last.content.starts_with("bbb"));
        assert!(last.content.ends_with(TRUNCATION_MARKER));
        // 最长前缀：再多一个字符就超限
        let mut longer = last.clone();
        longer.content.insert(0, 'b');
        let est = buf.estimator().clone();
        assert!(buf.token_count() - est.message_cost(last) + est.message_cost(&longer) + 50 > 200);
    }

    #[test]
    fn test_system_alone_over_budget_is_exhausted() {
        let mut buf = ConversationBuffer::new("x".repeat(100), TokenEstimator::new(PerChar));
        buf.append(Message::user("hi"));
        let err = buf.enforce_budget(10, 50).unwrap_err();
        assert!(matches!(err, BudgetError::Exhausted { limit: 50, .. }));
        // system 不被淘汰
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.system().content.len(), 100);
    }

    #[test]
    fn test_huge_response_reservation_does_not_overflow() {
        let mut buf = ConversationBuffer::new("sys", TokenEstimator::default());
        buf.append(Message::user("one"));
        buf.append(Message::user("two"));
        let err = buf.enforce_budget(usize::MAX, 1000).unwrap_err();
        assert_eq!(
            err,
            BudgetError::Exhausted {
                required: usize::MAX,
                limit: 1000
            }
        );
        assert_eq!(buf.system().content, "sys");
    }

    #[test]
    fn test_running_count_matches_recount() {
        let mut buf = ConversationBuffer::new("sys", TokenEstimator::default());
        buf.append(Message::user("what is in a.txt?"));
        buf.append(Message::function("FileOps-ReadTextFile", "\"hello\""));
        buf.append(Message::assistant("It says hello."));
        buf.enforce_budget(0, buf.token_count() - 1).unwrap();
        let est = buf.estimator().clone();
        assert_eq!(buf.token_count(), est.messages_cost(buf.messages()));
    }

    #[test]
    fn test_clear_keeps_system() {
        let mut buf = ConversationBuffer::new("sys", TokenEstimator::default());
        buf.append(Message::user("a"));
        buf.clear();
        assert_eq!(buf.len(), 1);
        assert!(buf.last().is_none());
        assert_eq!(
            buf.token_count(),
            buf.estimator().messages_cost(buf.messages())
        );
    }

    #[test]
    fn test_function_message_wire_format() {
        let m = Message::function("FileOps-ReadTextFile", "\"hi\"");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"role": "function", "content": "\"hi\"", "name": "FileOps-ReadTextFile"})
        );
        let u = serde_json::to_value(Message::user("x")).unwrap();
        assert!(u.get("name").is_none());
    }

    proptest! {
        #[test]
        fn budget_invariant_holds(
            lengths in prop::collection::vec(0usize..400, 0..20),
            max_response in 0usize..200,
            limit in 0usize..1500,
        ) {
            let mut buf = ConversationBuffer::new("You are a helpful assistant.", TokenEstimator::default());
            let appended: Vec<String> = lengths
                .iter()
                .enumerate()
                .map(|(i, n)| format!("{i}:{}", "w".repeat(*n)))
                .collect();
            for text in &appended {
                buf.append(Message::user(text.clone()));
            }

            let result = buf.enforce_budget(max_response, limit);
            let holds = buf.token_count() + max_response <= limit;
            prop_assert!(holds || buf.len() <= 2);
            prop_assert_eq!(result.is_ok(), holds);
            prop_assert_eq!(buf.system().content.as_str(), "You are a helpful assistant.");

            // 剩余消息是追加序列的后缀（最后一条可能被截断）
            let kept = &buf.messages()[1..];
            let suffix = &appended[appended.len() - kept.len()..];
            for (m, original) in kept.iter().zip(suffix) {
                if m.content.ends_with(TRUNCATION_MARKER) && m.content != *original {
                    let prefix = m.content.trim_end_matches(TRUNCATION_MARKER);
                    prop_assert!(original.starts_with(prefix));
                } else {
                    prop_assert_eq!(&m.content, original);
                }
            }
        }
    }
}
