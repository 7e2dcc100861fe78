//! 记忆层：对话缓冲区（短期记忆）与 Token 估算；不做跨进程持久化

pub mod conversation;
pub mod token_budget;

pub use conversation::{BudgetOutcome, ConversationBuffer, Message, Role, TRUNCATION_MARKER};
pub use token_budget::{HeuristicTokenizer, TokenEstimator, Tokenizer};
