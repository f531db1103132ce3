//! 命令定义和实现

pub mod blink;
pub mod config;
pub mod demo;

pub use blink::BlinkCommand;
pub use config::{CliConfig, ConfigCommand};
pub use demo::DemoCommand;
