//! 控制台输出格式（crossterm 着色）

use std::path::Path;

use crossterm::style::Stylize;

use crate::core::{CallOutcome, ChatError, FunctionCallRecord};

/// 回复被 max_tokens 截断时追加的标记
pub const TRUNCATED_MARK: &str = "[...]";

/// 输入提示：当前目录 + "> "
pub fn prompt(cwd: &Path) -> String {
    format!("{}> ", cwd.display().to_string().cyan())
}

pub fn assistant(text: &str) -> String {
    text.green().to_string()
}

/// 函数调用提示行
pub fn function_notice(record: &FunctionCallRecord) -> String {
    let status = match &record.outcome {
        CallOutcome::Succeeded => "ok".to_string(),
        CallOutcome::Failed(e) => format!("failed: {e}"),
        CallOutcome::Unknown => "unknown function".to_string(),
    };
    format!("[function {}: {}]", record.name, status).dark_grey().to_string()
}

pub fn error(err: &ChatError) -> String {
    err.to_string().red().to_string()
}

pub fn info(text: &str) -> String {
    text.dark_grey().to_string()
}
