//! # Sphero Peripheral Link Layer
//!
//! 外设链路抽象层，为会话层提供统一的能力接口（capability interface）。
//!
//! 真实的厂商 SDK / 蓝牙栈不在本 crate 范围内：这里只定义会话层所依赖的最小契约，
//! 即 "发起连接"、"发送命令"、"断开连接" 以及 "异步事件投递"。
//!
//! # 后端
//!
//! - [`simulated::SimulatedLink`]：带握手延迟的模拟外设（CLI 与演示使用）
//! - `mock::MockLink`（`mock` feature）：可脚本化的测试替身

use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[cfg(feature = "mock")]
pub mod mock;

pub mod simulated;

#[cfg(feature = "mock")]
pub use mock::{MockLink, MockLinkHandle};

pub use simulated::{SimulatedConfig, SimulatedHandle, SimulatedLink, SimulatedPeripheral};

/// 外设链路统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] LinkDeviceError),
    #[error("Peripheral not connected")]
    NotConnected,
    #[error("Link busy")]
    Busy,
    #[error("Event channel closed")]
    ChannelClosed,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDeviceErrorKind {
    Unknown,
    NotFound,
    NotPaired,
    AccessDenied,
    Busy,
    InvalidResponse,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct LinkDeviceError {
    pub kind: LinkDeviceErrorKind,
    pub message: String,
}

impl LinkDeviceError {
    pub fn new(kind: LinkDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 致命错误：重试 `connect()` 也无法恢复（需要用户介入，例如重新配对）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            LinkDeviceErrorKind::NotFound
                | LinkDeviceErrorKind::NotPaired
                | LinkDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for LinkDeviceError {
    fn from(message: String) -> Self {
        Self::new(LinkDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for LinkDeviceError {
    fn from(message: &str) -> Self {
        Self::new(LinkDeviceErrorKind::Unknown, message)
    }
}

/// 外设异步事件
///
/// 由链路层在任意线程上投递，会话层通过单消费者通道消费。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// 外设完成握手，可以接收命令
    Online,
    /// 外设断开（掉电、超出范围等）
    Offline,
    /// 连接尝试失败
    ConnectionFailed { reason: String },
}

/// 外设命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralCommand {
    /// 主 LED 开关
    SetLed { on: bool },
    /// 尾灯亮度（校准时用于指示机器人朝向）
    SetBackLed { brightness: u8 },
    /// 将当前朝向设为指定航向（校准完成时置 0）
    SetHeading { degrees: u16 },
}

impl PeripheralCommand {
    /// 命令名称（用于日志）
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetLed { .. } => "set_led",
            Self::SetBackLed { .. } => "set_back_led",
            Self::SetHeading { .. } => "set_heading",
        }
    }
}

/// 事件投递端
///
/// 对 `crossbeam_channel::Sender` 的薄封装。通道满时最多等待 `full_wait`
/// 让事件线程追赶，仍然满才丢弃事件；丢弃次数可通过 [`EventSink::dropped_counter`] 读取。
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<LinkEvent>,
    full_wait: Duration,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// 通道满时的默认等待时长
    pub const DEFAULT_FULL_WAIT: Duration = Duration::from_millis(100);

    pub fn new(tx: Sender<LinkEvent>) -> Self {
        Self {
            tx,
            full_wait: Self::DEFAULT_FULL_WAIT,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 设置通道满时的等待时长
    pub fn with_full_wait(mut self, full_wait: Duration) -> Self {
        self.full_wait = full_wait;
        self
    }

    /// 丢弃计数器（所有克隆共享）
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }

    /// 已丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 投递事件
    ///
    /// 通道满且等待 `full_wait` 后仍满时返回 `LinkError::Busy` 并计数，
    /// 会话已销毁时返回 `LinkError::ChannelClosed`。
    pub fn post(&self, event: LinkEvent) -> Result<(), LinkError> {
        let event = match self.tx.try_send(event) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Disconnected(_)) => return Err(LinkError::ChannelClosed),
            Err(TrySendError::Full(event)) => event,
        };

        match self.tx.send_timeout(event, self.full_wait) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Event channel full for {:?}, dropped {:?}", self.full_wait, event);
                Err(LinkError::Busy)
            },
            Err(SendTimeoutError::Disconnected(_)) => Err(LinkError::ChannelClosed),
        }
    }
}

/// 外设链路能力接口
///
/// 所有方法都是 "发出即返回"（fire-and-forget）：`connect()` 只负责发起连接，
/// 结果通过 [`EventSink`] 以 [`LinkEvent`] 的形式异步送达。
pub trait PeripheralLink: Send {
    /// 注册事件投递端（会话创建时调用一次）
    fn subscribe(&mut self, sink: EventSink);

    /// 发起连接
    fn connect(&mut self) -> Result<(), LinkError>;

    /// 发送命令
    fn send_command(&mut self, command: PeripheralCommand) -> Result<(), LinkError>;

    /// 释放连接（包括取消进行中的连接尝试）
    fn disconnect(&mut self) -> Result<(), LinkError>;

    /// 外设名称（用于日志）
    fn name(&self) -> &str {
        "peripheral"
    }
}

impl<L: PeripheralLink + ?Sized> PeripheralLink for Box<L> {
    fn subscribe(&mut self, sink: EventSink) {
        (**self).subscribe(sink)
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        (**self).connect()
    }

    fn send_command(&mut self, command: PeripheralCommand) -> Result<(), LinkError> {
        (**self).send_command(command)
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        (**self).disconnect()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
