//! REPL 模式（交互式 Shell）
//!
//! 专用输入线程 + crossbeam 通道：主线程同时等待用户输入与会话通知，
//! 外设上线/掉线可以在用户未输入时立即显示。

use crate::commands::config::CliConfig;
use crate::utils::{describe_notification, describe_snapshot};
use anyhow::Result;
use crossbeam_channel::{Receiver, bounded, select};
use rustyline::Editor;
use sphero_link::{SimulatedHandle, SimulatedLink};
use sphero_session::{ConnectionSession, SessionBuilder, SessionNotification};
use std::thread;

/// 输入线程发给主线程的中断标记
const INTERRUPT: &str = "\u{3}";

/// Shell 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Connect,
    Led,
    CalibrateBegin,
    CalibrateFinish,
    Status,
    Metrics,
    /// 模拟外设掉线
    Offline,
    Teardown,
    Help,
    Exit,
}

impl ReplCommand {
    /// 解析一行输入
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let command = match parts.as_slice() {
            ["connect"] => Self::Connect,
            ["led"] | ["toggle"] => Self::Led,
            ["calibrate", "begin"] => Self::CalibrateBegin,
            ["calibrate", "finish"] => Self::CalibrateFinish,
            ["calibrate", ..] => anyhow::bail!("用法: calibrate begin|finish"),
            ["status"] => Self::Status,
            ["metrics"] => Self::Metrics,
            ["offline"] => Self::Offline,
            ["teardown"] | ["disconnect"] => Self::Teardown,
            ["help"] => Self::Help,
            ["exit"] | ["quit"] => Self::Exit,
            [] => anyhow::bail!("空命令"),
            [other, ..] => anyhow::bail!("未知命令: {}", other),
        };
        Ok(command)
    }
}

/// REPL 会话（保持与外设的连接会话）
pub struct ReplSession {
    session: ConnectionSession,
    peripheral: SimulatedHandle,
}

impl ReplSession {
    pub fn new(config: &CliConfig) -> Result<Self> {
        let link = SimulatedLink::new(config.name.clone(), config.simulated.clone());
        let peripheral = link.handle();
        let session = SessionBuilder::new().config(config.session.clone()).build(link)?;
        Ok(Self {
            session,
            peripheral,
        })
    }

    pub fn notifications(&self, capacity: usize) -> Receiver<SessionNotification> {
        self.session.subscribe_channel(capacity)
    }

    /// 执行命令，返回 false 表示退出
    pub fn execute(&self, command: ReplCommand) -> Result<bool> {
        match command {
            ReplCommand::Connect => {
                self.session.setup_connection()?;
                println!("⏳ {}", describe_snapshot(&self.session.snapshot()));
            },
            ReplCommand::Led => {
                let on = self.session.toggle_led()?;
                println!("💡 LED {}", if on { "on" } else { "off" });
            },
            ReplCommand::CalibrateBegin => {
                self.session.begin_calibration()?;
                println!("🧭 校准中（尾灯已点亮）");
            },
            ReplCommand::CalibrateFinish => {
                self.session.finish_calibration()?;
                println!("✅ 校准完成");
            },
            ReplCommand::Status => {
                println!("📊 {}", describe_snapshot(&self.session.snapshot()));
                let peripheral = self.peripheral.peripheral();
                println!(
                    "   peripheral: online={} led={} back_led={} heading={}",
                    peripheral.online, peripheral.led_on, peripheral.back_led, peripheral.heading
                );
            },
            ReplCommand::Metrics => {
                let m = self.session.metrics();
                println!(
                    "📈 sent={} rejected={} failed={} online={} attempts={} failures={} timeouts={} stale={} dropped={}",
                    m.commands_sent,
                    m.commands_rejected,
                    m.commands_failed,
                    m.online_events,
                    m.connect_attempts,
                    m.connect_failures,
                    m.connect_timeouts,
                    m.stale_events,
                    m.events_dropped
                );
            },
            ReplCommand::Offline => {
                self.peripheral.drop_link()?;
            },
            ReplCommand::Teardown => {
                self.session.teardown();
                println!("🔌 已断开");
            },
            ReplCommand::Help => print_help(),
            ReplCommand::Exit => return Ok(false),
        }
        Ok(true)
    }
}

/// 启动专用输入线程，Editor 生命周期与 REPL 会话相同（保留历史）
fn spawn_input(prompt: String) -> Receiver<String> {
    let (command_tx, command_rx) = bounded::<String>(10);

    let spawned = thread::Builder::new().name("sphero-repl-input".into()).spawn(move || {
        use rustyline::history::DefaultHistory;

        let mut rl = match Editor::<(), DefaultHistory>::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            },
        };
        let history_path = ".sphero_history";
        rl.load_history(history_path).ok();

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.clone());
                    if command_tx.send(line).is_err() {
                        break;
                    }
                },
                Err(rustyline::error::ReadlineError::Interrupted) => {
                    println!("^C");
                    let _ = command_tx.send(INTERRUPT.to_string());
                },
                Err(rustyline::error::ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                },
            }
        }
        rl.save_history(history_path).ok();
    });

    if let Err(e) = spawned {
        eprintln!("Failed to spawn input thread: {}", e);
    }
    command_rx
}

/// 运行 REPL 模式
pub fn run_repl(config: &CliConfig) -> Result<()> {
    let repl = ReplSession::new(config)?;
    let notifications = repl.notifications(64);

    println!("Sphero CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
    println!("输入 'help' 查看帮助，'exit' 退出");
    println!();
    println!("💡 提示: 使用 'connect' 连接到 {}，上线后 'led' 切换 LED", config.name);
    println!();

    let input = spawn_input(format!("{}> ", config.name));

    loop {
        select! {
            recv(input) -> line => {
                // 输入线程退出（Ctrl+D）
                let Ok(line) = line else { break };

                if line == INTERRUPT {
                    // Ctrl+C：立即释放连接
                    repl.execute(ReplCommand::Teardown)?;
                    continue;
                }

                let command = match ReplCommand::parse(&line) {
                    Ok(command) => command,
                    Err(err) => {
                        eprintln!("❌ {}", err);
                        eprintln!("💡 提示: 输入 'help' 查看所有命令");
                        continue;
                    },
                };

                match repl.execute(command) {
                    Ok(true) => {},
                    Ok(false) => break,
                    Err(err) => {
                        eprintln!("❌ Error: {}", err);
                        print_help_hint(command);
                    },
                }
            }
            recv(notifications) -> notification => {
                if let Ok(notification) = notification {
                    println!("🔔 {}", describe_notification(&notification));
                }
            }
        }
    }

    repl.execute(ReplCommand::Teardown)?;
    println!("👋 再见！");
    Ok(())
}

/// 打印帮助信息
fn print_help() {
    println!("可用命令:");
    println!("  connect                       发起连接");
    println!("  led                           切换 LED（需已连接）");
    println!("  calibrate begin|finish        开始/结束航向校准");
    println!("  status                        显示会话与外设状态");
    println!("  metrics                       显示计数器");
    println!("  offline                       模拟外设掉线");
    println!("  teardown                      断开连接");
    println!("  help                          显示帮助");
    println!("  exit / quit                   退出");
    println!();
    println!("快捷键:");
    println!("  Ctrl+C                        断开连接");
    println!("  Ctrl+D                        退出");
    println!();
}

/// 提供基于错误的帮助提示
fn print_help_hint(command: ReplCommand) {
    match command {
        ReplCommand::Led | ReplCommand::CalibrateBegin | ReplCommand::CalibrateFinish => {
            eprintln!("💡 提示: 需要先使用 'connect' 并等待外设上线");
        },
        ReplCommand::Connect => {
            eprintln!("💡 提示: 连接中或已连接时 'connect' 不会重复发起");
        },
        _ => eprintln!("💡 提示: 输入 'help' 查看所有命令"),
    }
}
