//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CHATCMD__*` 覆盖（双下划线表示嵌套，如 `CHATCMD__LLM__MODEL=gpt-4-0613`）。
//! API Key 未在配置中给出时回退到 `OPENAI_API_KEY`。

use std::path::PathBuf;

use serde::Deserialize;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHATCMD";
/// API Key 回退环境变量
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub conversation: ConversationSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [llm] 段：端点、模型、认证与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmSection {
    /// 配置中的 api_key，否则读 OPENAI_API_KEY；两者皆空返回 None
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo-0613".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// [conversation] 段：system prompt 与 token 预算
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSection {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// 为回复预留的 token 数
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,
    /// 模型上下文上限
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_response_tokens: default_max_response_tokens(),
            token_limit: default_token_limit(),
        }
    }
}

fn default_system_prompt() -> String {
    "Assistant is a large language model trained by OpenAI.".to_string()
}

fn default_max_response_tokens() -> usize {
    1024
}

fn default_token_limit() -> usize {
    16384
}

/// [tools] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsSection {
    /// FileOps 插件的根目录，未设置时用当前工作目录
    pub filesystem_root: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 CHATCMD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CHATCMD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignored");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
