//! 控制台层：主循环（app）与输出格式（render）

pub mod app;
pub mod render;

pub use app::{read_user_input, run_app, ConsoleExit};
