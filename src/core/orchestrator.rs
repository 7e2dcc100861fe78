//! 对话编排器：状态机驱动「用户输入 → 请求 → (函数调用 → 请求)* → 回复」
//!
//! 单一控制流，一次只有一个请求在途。每次发请求前先执行 token 预算（预算上限已扣除函数目录开销）；
//! 模型要求函数调用时经 Dispatcher 执行，结果作为 function 消息追加后直接回到 RequestPending，
//! 不等待用户输入。传输失败 / 响应无效 / 预算耗尽为终止性错误，之后所有调用都返回 Halted。

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::state::{CallOutcome, FunctionCallRecord, Phase, StepOutput, TurnOutput};
use crate::core::{BudgetError, ChatError, InvocationError};
use crate::llm::{ChatRequest, ChatResponse, ChatTransport, FinishReason, FunctionCallRequest, Usage};
use crate::memory::{ConversationBuffer, Message, TokenEstimator};
use crate::tools::{Dispatcher, FunctionRegistry};

/// 编排器参数
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub model: String,
    pub system_prompt: String,
    /// 为回复预留的 token 数（同时作为请求的 max_tokens）
    pub max_response_tokens: usize,
    /// 模型上下文上限（未扣除函数目录）
    pub token_limit: usize,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            system_prompt: cfg.conversation.system_prompt.clone(),
            max_response_tokens: cfg.conversation.max_response_tokens,
            token_limit: cfg.conversation.token_limit,
        }
    }
}

pub struct Orchestrator {
    id: Uuid,
    settings: OrchestratorSettings,
    transport: Arc<dyn ChatTransport>,
    dispatcher: Dispatcher,
    buffer: ConversationBuffer,
    effective_limit: usize,
    phase: Phase,
    halted: Option<ChatError>,
    usage: Usage,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        registry: Arc<FunctionRegistry>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, BudgetError> {
        Self::with_estimator(settings, registry, transport, TokenEstimator::default())
    }

    /// 指定估算器；函数目录开销从 token_limit 中扣除，连 system 消息加回复预留都放不下时失败
    pub fn with_estimator(
        settings: OrchestratorSettings,
        registry: Arc<FunctionRegistry>,
        transport: Arc<dyn ChatTransport>,
        estimator: TokenEstimator,
    ) -> Result<Self, BudgetError> {
        let catalog_cost = estimator.catalog_cost(registry.catalog());
        let buffer = ConversationBuffer::new(settings.system_prompt.clone(), estimator);
        let required = buffer
            .token_count()
            .saturating_add(settings.max_response_tokens)
            .saturating_add(catalog_cost);
        if required > settings.token_limit {
            return Err(BudgetError::Exhausted {
                required,
                limit: settings.token_limit,
            });
        }
        let effective_limit = settings.token_limit - catalog_cost;

        let id = Uuid::new_v4();
        tracing::info!(
            conversation = %id,
            model = %settings.model,
            functions = registry.len(),
            catalog_tokens = catalog_cost,
            effective_limit,
            "orchestrator ready"
        );

        Ok(Self {
            id,
            settings,
            transport,
            dispatcher: Dispatcher::new(registry),
            buffer,
            effective_limit,
            phase: Phase::AwaitingUserInput,
            halted: None,
            usage: Usage::default(),
        })
    }

    pub fn conversation_id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        self.buffer.messages()
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    /// 扣除函数目录后的 token 上限
    pub fn effective_token_limit(&self) -> usize {
        self.effective_limit
    }

    /// 远端报告的累计用量
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// 清空历史，只保留 system 消息；终止状态不可清除
    pub fn clear(&mut self) -> Result<(), ChatError> {
        self.ensure_live()?;
        self.buffer.clear();
        self.phase = Phase::AwaitingUserInput;
        tracing::info!(conversation = %self.id, "conversation cleared");
        Ok(())
    }

    /// 追加用户消息并进入 RequestPending（预算在下一次 step 发请求前执行）
    pub fn submit_user_message(&mut self, text: impl Into<String>) -> Result<(), ChatError> {
        self.ensure_live()?;
        if self.phase != Phase::AwaitingUserInput {
            return Err(ChatError::NotAwaitingInput(self.phase.to_string()));
        }
        self.buffer.append(Message::user(text));
        self.phase = Phase::RequestPending;
        Ok(())
    }

    /// 执行一次请求并处理响应
    pub async fn step(&mut self) -> Result<StepOutput, ChatError> {
        self.ensure_live()?;
        match self.phase {
            Phase::AwaitingUserInput => return Err(ChatError::NeedsUserInput),
            Phase::RequestPending => {}
            // 上一步在函数执行中被取消，按重新请求处理
            Phase::HandlingFunctionCall => self.phase = Phase::RequestPending,
        }

        let outcome = match self
            .buffer
            .enforce_budget(self.settings.max_response_tokens, self.effective_limit)
        {
            Ok(o) => o,
            Err(e) => return Err(self.halt(e.into())),
        };
        if outcome.evicted > 0 || outcome.truncated {
            tracing::info!(
                conversation = %self.id,
                evicted = outcome.evicted,
                truncated = outcome.truncated,
                tokens = outcome.token_count,
                "history trimmed to fit token budget"
            );
        }

        let body = match serde_json::to_value(ChatRequest {
            model: &self.settings.model,
            messages: self.buffer.messages(),
            max_tokens: self.settings.max_response_tokens,
            functions: self.dispatcher.registry().catalog(),
        }) {
            Ok(b) => b,
            Err(e) => return Err(self.halt(ChatError::Encode(e.to_string()))),
        };

        tracing::debug!(
            conversation = %self.id,
            messages = self.buffer.len(),
            tokens = outcome.token_count,
            "sending chat request"
        );
        let raw = match self.transport.post(&body).await {
            Ok(v) => v,
            Err(e) => return Err(self.halt(e.into())),
        };

        let response: ChatResponse = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => return Err(self.halt(ChatError::InvalidResponse(e.to_string()))),
        };
        if let Some(u) = response.usage {
            self.usage.prompt_tokens += u.prompt_tokens;
            self.usage.completion_tokens += u.completion_tokens;
            self.usage.total_tokens += u.total_tokens;
        }
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(self.halt(ChatError::InvalidResponse("response has no choices".into())));
        };

        let finish = FinishReason::parse(choice.finish_reason.as_deref());
        let text = choice.message.content.filter(|c| !c.is_empty());

        match (finish, choice.message.function_call) {
            (FinishReason::FunctionCall, Some(call)) => Ok(self.handle_function_call(call, text).await),
            (finish, call) => {
                if finish == FinishReason::FunctionCall {
                    tracing::warn!(conversation = %self.id, "function_call finish without call payload");
                }
                let record = call.map(|c| FunctionCallRecord {
                    name: c.name,
                    outcome: CallOutcome::Unknown,
                });
                Ok(self.finish_with_reply(text, finish == FinishReason::Length, record))
            }
        }
    }

    /// 提交一条用户消息并持续 step 直到再次等待用户输入
    pub async fn run_turn(&mut self, text: impl Into<String>) -> Result<TurnOutput, ChatError> {
        self.submit_user_message(text)?;
        let mut turn = TurnOutput::default();
        loop {
            let step = self.step().await?;
            let done = step.awaits_user();
            turn.steps.push(step);
            if done {
                return Ok(turn);
            }
        }
    }

    async fn handle_function_call(
        &mut self,
        call: FunctionCallRequest,
        text: Option<String>,
    ) -> StepOutput {
        self.phase = Phase::HandlingFunctionCall;
        tracing::info!(conversation = %self.id, function = %call.name, "model requested function call");

        let result = self.dispatcher.invoke(&call.name, &call.arguments).await;
        let content = match result {
            Ok(value) => Ok(serde_json::to_string(&value).unwrap_or_else(|_| "null".into())),
            Err(InvocationError::UnknownFunction(name)) => {
                tracing::warn!(conversation = %self.id, function = %name, "unknown function, treating as reply");
                let record = FunctionCallRecord {
                    name: call.name,
                    outcome: CallOutcome::Unknown,
                };
                return self.finish_with_reply(text, false, Some(record));
            }
            Err(e) => Err(e),
        };

        let (message, outcome) = match content {
            Ok(body) => (Message::function(&call.name, body), CallOutcome::Succeeded),
            Err(e) => {
                let body = json!({ "error": e.to_string() }).to_string();
                (Message::function(&call.name, body), CallOutcome::Failed(e))
            }
        };
        self.buffer.append(message);
        self.phase = Phase::RequestPending;

        StepOutput {
            assistant_text: text,
            truncated: false,
            function_call: Some(FunctionCallRecord {
                name: call.name,
                outcome,
            }),
            phase: self.phase,
        }
    }

    fn finish_with_reply(
        &mut self,
        text: Option<String>,
        truncated: bool,
        function_call: Option<FunctionCallRecord>,
    ) -> StepOutput {
        self.buffer
            .append(Message::assistant(text.clone().unwrap_or_default()));
        self.phase = Phase::AwaitingUserInput;
        if truncated {
            tracing::warn!(conversation = %self.id, "reply truncated at max_tokens");
        }
        StepOutput {
            assistant_text: text,
            truncated,
            function_call,
            phase: self.phase,
        }
    }

    fn ensure_live(&self) -> Result<(), ChatError> {
        match &self.halted {
            Some(reason) => Err(ChatError::Halted(reason.to_string())),
            None => Ok(()),
        }
    }

    fn halt(&mut self, err: ChatError) -> ChatError {
        tracing::error!(conversation = %self.id, error = %err, "conversation halted");
        self.halted = Some(err.clone());
        err
    }
}
