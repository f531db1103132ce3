//! 演示命令
//!
//! 对模拟外设走一遍完整流程：
//! 未连接时切换 LED（被拒绝）→ 发起连接 → 等待上线 → 切换 LED → 释放连接。

use crate::commands::config::CliConfig;
use crate::utils::describe_snapshot;
use anyhow::{Context, Result};
use clap::Args;
use sphero_link::SimulatedLink;
use sphero_session::{SessionBuilder, SessionError};
use std::time::Duration;

/// 演示命令参数
#[derive(Args, Debug)]
pub struct DemoCommand {
    /// 模拟握手耗时（毫秒），覆盖配置文件
    #[arg(long)]
    pub handshake_ms: Option<u64>,

    /// 模拟握手失败
    #[arg(long)]
    pub fail: bool,
}

impl DemoCommand {
    pub fn execute(&self, mut config: CliConfig) -> Result<()> {
        if let Some(ms) = self.handshake_ms {
            config.simulated.handshake_delay_ms = ms;
            config.simulated.jitter_ms = 0;
        }
        if self.fail {
            config.simulated.fail_handshake = true;
        }

        let link = SimulatedLink::new(config.name.clone(), config.simulated.clone());
        let peripheral = link.handle();
        let session = SessionBuilder::new()
            .config(config.session.clone())
            .build(link)
            .context("创建会话失败")?;

        println!("1. {}", describe_snapshot(&session.snapshot()));

        match session.toggle_led() {
            Err(SessionError::NotConnected { state }) => {
                println!("2. toggle_led rejected: not connected ({})", state);
            },
            other => anyhow::bail!("unexpected toggle result while disconnected: {:?}", other),
        }

        session.setup_connection()?;
        println!("3. {}", describe_snapshot(&session.snapshot()));

        // 多等一个轮询周期，保证超时判定先于这里的等待上限
        let wait = config.session.connect_timeout() + config.session.event_poll_interval() * 2;
        session
            .wait_until_connected(wait)
            .with_context(|| format!("{} 未能上线", config.name))?;
        println!("4. {}", describe_snapshot(&session.snapshot()));

        let led = session.toggle_led()?;
        println!(
            "5. LED {} (peripheral reports {})",
            if led { "on" } else { "off" },
            if peripheral.peripheral().led_on { "on" } else { "off" }
        );

        session.teardown();
        println!("6. {}", describe_snapshot(&session.snapshot()));

        let metrics = session.metrics();
        println!(
            "   commands sent={} rejected={} online events={}",
            metrics.commands_sent, metrics.commands_rejected, metrics.online_events
        );

        // 给握手线程的日志一点时间输出
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    }
}
