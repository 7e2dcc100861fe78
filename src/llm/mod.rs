//! 传输层：协议结构、传输抽象与实现（HTTP / 脚本化 Mock）

pub mod mock;
pub mod openai;
pub mod protocol;
pub mod traits;

pub use mock::{function_call_response, text_response, ScriptedTransport};
pub use openai::HttpTransport;
pub use protocol::{ChatRequest, ChatResponse, FinishReason, FunctionCallRequest, Usage};
pub use traits::ChatTransport;
