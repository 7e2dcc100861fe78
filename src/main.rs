//! ChatCmd - 命令行对话客户端
//!
//! 入口：初始化日志、加载配置、注册插件、创建编排器，并运行控制台主循环。
//! 对话因传输失败等原因终止时以非零状态退出。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chatcmd::config::{load_config, API_KEY_ENV};
use chatcmd::core::{Orchestrator, OrchestratorSettings};
use chatcmd::llm::HttpTransport;
use chatcmd::tools::{FileOps, FunctionRegistry};
use chatcmd::ui::{run_app, ConsoleExit};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 warn，可通过 RUST_LOG 覆盖
    chatcmd::observability::init("warn");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let fs_root = cfg.tools.filesystem_root.clone().unwrap_or_else(|| cwd.clone());
    let registry = FunctionRegistry::builder()
        .register(FileOps::new(&fs_root))
        .build()
        .context("Failed to build function registry")?;

    let api_key = cfg
        .llm
        .resolve_api_key()
        .with_context(|| format!("No API key: set llm.api_key or {API_KEY_ENV}"))?;
    let transport = HttpTransport::new(
        cfg.llm.endpoint.clone(),
        api_key,
        Duration::from_secs(cfg.llm.timeout_secs),
    )
    .context("Failed to create HTTP transport")?;
    tracing::info!(endpoint = transport.endpoint(), model = %cfg.llm.model, "chat endpoint configured");

    let mut orchestrator = Orchestrator::new(
        OrchestratorSettings::from_config(&cfg),
        Arc::new(registry),
        Arc::new(transport),
    )
    .context("Failed to create orchestrator")?;
    let conversation = orchestrator.conversation_id();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let exit = run_app(&mut orchestrator, stdin, &mut stdout, &cwd)
        .await
        .context("Console run failed")?;

    if let ConsoleExit::Halted(reason) = &exit {
        tracing::error!(%conversation, error = %reason, "conversation halted, exiting");
        std::process::exit(1);
    }
    tracing::info!(%conversation, ?exit, "console closed");
    Ok(())
}
