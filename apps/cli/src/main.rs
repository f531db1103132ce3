//! # Sphero CLI
//!
//! 基于模拟外设的连接会话命令行工具。
//!
//! ### One-shot 模式
//!
//! ```bash
//! # 完整演示：拒绝 → 连接 → 上线 → 点亮 LED → 断开
//! sphero-cli demo
//!
//! # 连接后闪烁 LED
//! sphero-cli blink --count 10 --interval-ms 200
//! ```
//!
//! ### REPL 模式
//!
//! ```bash
//! $ sphero-cli shell
//! sphero> connect
//! 🔔 Disconnected -> Connecting (SetupRequested)
//! 🔔 Connecting -> Connected (RobotOnline)
//! sphero> led
//! sphero> exit
//! ```
//!
//! 日志输出到 stderr，通过 `RUST_LOG` 调整级别。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod modes;
mod utils;

use commands::{BlinkCommand, CliConfig, ConfigCommand, DemoCommand};
use modes::repl::run_repl;

/// Sphero CLI - 机器人连接会话命令行工具
#[derive(Parser, Debug)]
#[command(name = "sphero-cli")]
#[command(about = "Command-line interface for Sphero connection sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/sphero/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行连接演示
    Demo {
        #[command(flatten)]
        args: DemoCommand,
    },

    /// 连接后闪烁 LED
    Blink {
        #[command(flatten)]
        args: BlinkCommand,
    },

    /// 启动交互式 Shell（REPL 模式）
    Shell,

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 初始化日志
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sphero_cli=info,sphero_session=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let explicit = cli.config.as_deref();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(explicit),
        Commands::Demo { args } => args.execute(CliConfig::load(explicit)?),
        Commands::Blink { args } => args.execute(CliConfig::load(explicit)?),
        Commands::Shell => run_repl(&CliConfig::load(explicit)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_config() {
        let cli = Cli::parse_from(["sphero-cli", "demo", "--config", "/tmp/s.toml", "--fail"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
        match cli.command {
            Commands::Demo { args } => assert!(args.fail),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_config_subcommand() {
        let cli = Cli::parse_from(["sphero-cli", "config", "init", "--force"]);
        assert!(matches!(cli.command, Commands::Config(ConfigCommand::Init { force: true })));
    }
}
