//! ChatCmd - 带本地函数调用的命令行 LLM 对话客户端
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、编排器状态、对话编排器
//! - **llm**: 请求/响应协议、传输抽象与实现（HTTP / 脚本化 Mock）
//! - **memory**: 对话缓冲与 token 估算
//! - **observability**: tracing 初始化
//! - **tools**: 类型映射、Schema 生成、函数注册表、调用分发、FileOps 插件
//! - **ui**: 控制台主循环

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
pub mod ui;
