//! 可观测性：tracing 订阅器初始化
//!
//! 日志写 stderr，避免与对话输出混在一起；`RUST_LOG` 优先，否则用传入的默认过滤指令。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
