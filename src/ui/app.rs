//! 控制台主循环
//!
//! 打印提示符，读取多行输入（空行或 EOF 结束），交给编排器逐步执行直到再次等待输入，
//! 期间把助手文本与函数调用提示写到输出。`/quit` 或无内容的 EOF 退出，`/clear` 清空对话。
//! 遇到终止性错误时打印原因并返回 `ConsoleExit::Halted`。

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::core::{ChatError, Orchestrator};
use crate::ui::render;

pub const QUIT_COMMAND: &str = "/quit";
pub const CLEAR_COMMAND: &str = "/clear";

/// 主循环退出原因
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    EndOfInput,
    Halted(ChatError),
}

/// 读取一条多行输入：遇到空行或 EOF 结束；EOF 且没有任何内容时返回 None
pub async fn read_user_input<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines: Vec<String> = Vec::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(Some(lines.join("\n")));
        }
        lines.push(line.to_string());
    }
    if lines.is_empty() {
        Ok(None)
    } else {
        Ok(Some(lines.join("\n")))
    }
}

pub async fn run_app<R, W>(
    orchestrator: &mut Orchestrator,
    mut reader: R,
    writer: &mut W,
    cwd: &Path,
) -> anyhow::Result<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        write!(writer, "{}", render::prompt(cwd))?;
        writer.flush()?;

        let Some(input) = read_user_input(&mut reader).await? else {
            writeln!(writer)?;
            return Ok(ConsoleExit::EndOfInput);
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == QUIT_COMMAND {
            return Ok(ConsoleExit::Quit);
        }
        if input == CLEAR_COMMAND {
            match orchestrator.clear() {
                Ok(()) => writeln!(writer, "{}", render::info("(conversation cleared)"))?,
                Err(e) => return halted(writer, e),
            }
            continue;
        }

        if let Err(e) = orchestrator.submit_user_message(input) {
            if e.is_terminal() {
                return halted(writer, e);
            }
            writeln!(writer, "{}", render::error(&e))?;
            continue;
        }

        loop {
            match orchestrator.step().await {
                Ok(step) => {
                    if let Some(record) = &step.function_call {
                        writeln!(writer, "{}", render::function_notice(record))?;
                    }
                    if let Some(text) = &step.assistant_text {
                        writeln!(writer, "{}", render::assistant(text))?;
                    }
                    if step.truncated {
                        writeln!(writer, "{}", render::TRUNCATED_MARK)?;
                    }
                    if step.awaits_user() {
                        break;
                    }
                }
                Err(e) if e.is_terminal() => return halted(writer, e),
                Err(e) => {
                    writeln!(writer, "{}", render::error(&e))?;
                    break;
                }
            }
        }
        writeln!(writer)?;
    }
}

fn halted<W: Write>(writer: &mut W, err: ChatError) -> anyhow::Result<ConsoleExit> {
    writeln!(writer, "{}", render::error(&err))?;
    Ok(ConsoleExit::Halted(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OrchestratorSettings, TransportError};
    use crate::llm::ScriptedTransport;
    use crate::memory::Role;
    use crate::tools::FunctionRegistry;
    use std::sync::Arc;
    use tokio::io::BufReader;

    fn orchestrator(transport: Arc<ScriptedTransport>) -> Orchestrator {
        let registry = Arc::new(FunctionRegistry::builder().build().unwrap());
        let settings = OrchestratorSettings {
            model: "m".into(),
            system_prompt: "sys".into(),
            max_response_tokens: 32,
            token_limit: 1024,
        };
        Orchestrator::new(settings, registry, transport).unwrap()
    }

    #[tokio::test]
    async fn test_read_user_input_multiline() {
        let mut r = BufReader::new(&b"line one\nline two\n\nnext\n"[..]);
        assert_eq!(
            read_user_input(&mut r).await.unwrap().as_deref(),
            Some("line one\nline two")
        );
        // EOF 前的内容也算一条输入
        assert_eq!(read_user_input(&mut r).await.unwrap().as_deref(), Some("next"));
        assert_eq!(read_user_input(&mut r).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conversation_until_quit() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_text("Hello!", "stop").push_text("cut off", "length");
        let mut orch = orchestrator(t.clone());
        let mut out = Vec::new();

        let input = BufReader::new(&b"hi\n\nmore\n\n/quit\n"[..]);
        let exit = run_app(&mut orch, input, &mut out, Path::new("/w")).await.unwrap();

        assert_eq!(exit, ConsoleExit::Quit);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Hello!"));
        assert!(text.contains("cut off"));
        assert!(text.contains(render::TRUNCATED_MARK));
        let roles: Vec<Role> = orch.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles.len(), 5);
    }

    #[tokio::test]
    async fn test_clear_resets_conversation() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_text("first", "stop").push_text("second", "stop");
        let mut orch = orchestrator(t.clone());
        let mut out = Vec::new();

        let input = BufReader::new(&b"hi\n\n/clear\n\nagain\n\n/quit\n"[..]);
        let exit = run_app(&mut orch, input, &mut out, Path::new(".")).await.unwrap();

        assert_eq!(exit, ConsoleExit::Quit);
        assert!(String::from_utf8(out).unwrap().contains("(conversation cleared)"));
        let contents: Vec<&str> = orch.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "again", "second"]);
        // 清空后的请求不再带旧消息
        let requests = t.requests();
        assert_eq!(requests[1]["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_eof_exits() {
        let mut orch = orchestrator(Arc::new(ScriptedTransport::new()));
        let mut out = Vec::new();
        let exit = run_app(&mut orch, BufReader::new(&b""[..]), &mut out, Path::new("."))
            .await
            .unwrap();
        assert_eq!(exit, ConsoleExit::EndOfInput);
    }

    #[tokio::test]
    async fn test_transport_failure_halts_console() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(Err(TransportError::new(Some(401), "Unauthorized")));
        let mut orch = orchestrator(t);
        let mut out = Vec::new();

        let input = BufReader::new(&b"hi\n\nnever read\n\n"[..]);
        let exit = run_app(&mut orch, input, &mut out, Path::new(".")).await.unwrap();

        assert!(matches!(exit, ConsoleExit::Halted(ChatError::Transport(_))));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("API call failed with status code 401: Unauthorized"));
    }
}
