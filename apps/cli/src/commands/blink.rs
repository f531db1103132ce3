//! LED 闪烁命令
//!
//! 连接模拟外设后按固定间隔切换 LED，Ctrl+C 提前结束。

use crate::commands::config::CliConfig;
use crate::utils::describe_notification;
use anyhow::{Context, Result};
use clap::Args;
use sphero_link::SimulatedLink;
use sphero_session::{SessionBuilder, SessionError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 闪烁命令参数
#[derive(Args, Debug)]
pub struct BlinkCommand {
    /// 切换次数
    #[arg(short, long, default_value_t = 6)]
    pub count: u32,

    /// 切换间隔（毫秒）
    #[arg(short, long, default_value_t = 250)]
    pub interval_ms: u64,
}

impl BlinkCommand {
    pub fn execute(&self, config: CliConfig) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        {
            let stop = stop.clone();
            ctrlc::set_handler(move || {
                eprintln!("\nReceived interrupt signal. Stopping...");
                stop.store(true, Ordering::SeqCst);
            })
            .context("注册 Ctrl+C 处理失败")?;
        }

        let link = SimulatedLink::new(config.name.clone(), config.simulated.clone());
        let session = SessionBuilder::new().config(config.session.clone()).build(link)?;
        let notifications = session.subscribe_channel(64);

        println!("🔌 连接到 {}...", config.name);
        session.setup_connection()?;
        let wait = config.session.connect_timeout() + config.session.event_poll_interval() * 2;
        session.wait_until_connected(wait)?;

        let mut toggled = 0;
        while toggled < self.count && !stop.load(Ordering::SeqCst) {
            match session.toggle_led() {
                Ok(_) => toggled += 1,
                // 外设掉线：停止闪烁而不是报错
                Err(SessionError::NotConnected { state }) => {
                    println!("⚠️  连接已断开 ({})", state);
                    break;
                },
                Err(e) => return Err(e.into()),
            }
            for notification in notifications.try_iter() {
                println!("  {}", describe_notification(&notification));
            }
            std::thread::sleep(Duration::from_millis(self.interval_ms));
        }

        session.teardown();
        for notification in notifications.try_iter() {
            println!("  {}", describe_notification(&notification));
        }
        println!("✅ 切换 {} 次", toggled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        blink: BlinkCommand,
    }

    #[test]
    fn test_blink_defaults() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.blink.count, 6);
        assert_eq!(cli.blink.interval_ms, 250);
    }

    #[test]
    fn test_blink_args() {
        let cli = TestCli::parse_from(["test", "--count", "3", "--interval-ms", "10"]);
        assert_eq!(cli.blink.count, 3);
        assert_eq!(cli.blink.interval_ms, 10);
    }
}
