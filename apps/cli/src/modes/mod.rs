//! 运行模式
//!
//! 子命令之外的交互式 Shell（REPL 模式）

pub mod repl;
