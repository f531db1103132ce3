//! 会话层模块
//!
//! 本模块管理单个 Sphero 机器人的连接生命周期，包括：
//! - 连接状态机（Disconnected / Connecting / Connected / Error）
//! - 按连接就绪状态门控命令下发（LED、校准）
//! - 事件线程：消费外设异步事件、检测连接超时
//! - 观察者（钩子）：向 UI 层推送状态变化
//!
//! 外设本身通过 [`sphero_link::PeripheralLink`] 抽象，可以是真实 SDK 适配、
//! 模拟外设或测试替身。

mod builder;
mod config;
mod error;
pub mod hooks;
pub mod metrics;
mod pipeline;
mod session;
pub mod state;

pub use builder::SessionBuilder;
pub use config::SessionConfig;
pub use error::SessionError;
pub use hooks::{ChannelObserver, ObserverManager, SessionNotification, StateObserver};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use session::ConnectionSession;
pub use state::{SessionSnapshot, SessionState, StateChange, TransitionReason};
