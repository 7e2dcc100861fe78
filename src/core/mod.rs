//! 核心编排层：错误类型、状态定义、对话编排器

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::{
    BudgetError, ChatError, InvocationError, RegistryError, SchemaError, TransportError,
    UnsupportedType,
};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use state::{CallOutcome, FunctionCallRecord, Phase, StepOutput, TurnOutput};
