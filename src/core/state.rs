//! 状态定义：编排器阶段与单步输出
//!
//! 阶段只有三个：等待用户输入 / 请求进行中 / 处理函数调用；终止（halted）由编排器单独记录。

use serde::Serialize;

use crate::core::InvocationError;

/// 编排器阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    AwaitingUserInput,
    RequestPending,
    HandlingFunctionCall,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::AwaitingUserInput => "AwaitingUserInput",
            Phase::RequestPending => "RequestPending",
            Phase::HandlingFunctionCall => "HandlingFunctionCall",
        };
        f.write_str(s)
    }
}

/// 函数调用结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// 已执行，结果作为 function 消息追加
    Succeeded,
    /// 参数错误或操作失败，错误作为 function 消息追加
    Failed(InvocationError),
    /// 函数不存在，按普通 assistant 回复处理
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallRecord {
    pub name: String,
    pub outcome: CallOutcome,
}

/// 单步输出
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutput {
    /// 助手文本（函数调用回合中可能为空）
    pub assistant_text: Option<String>,
    /// finish_reason 为 length 时为 true
    pub truncated: bool,
    pub function_call: Option<FunctionCallRecord>,
    /// 本步结束后的阶段
    pub phase: Phase,
}

impl StepOutput {
    /// 本步之后是否需要新的用户输入
    pub fn awaits_user(&self) -> bool {
        self.phase == Phase::AwaitingUserInput
    }
}

/// 一轮完整对话（一条用户消息到下一次等待输入）中的全部单步输出
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnOutput {
    pub steps: Vec<StepOutput>,
}

impl TurnOutput {
    /// 最终回复文本（最后一步的助手文本）
    pub fn final_text(&self) -> Option<&str> {
        self.steps.last().and_then(|s| s.assistant_text.as_deref())
    }

    pub fn truncated(&self) -> bool {
        self.steps.last().is_some_and(|s| s.truncated)
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCallRecord> {
        self.steps.iter().filter_map(|s| s.function_call.as_ref())
    }
}
