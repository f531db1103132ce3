//! 会话指标模块
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 会话实时指标
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// 成功发出的命令数
    pub commands_sent: AtomicU64,
    /// 因未连接被拒绝的命令数
    pub commands_rejected: AtomicU64,
    /// 链路发送失败的命令数
    pub commands_failed: AtomicU64,
    /// 收到的 Online 事件数（包括重复投递）
    pub online_events: AtomicU64,
    /// 发起的连接尝试数
    pub connect_attempts: AtomicU64,
    /// 连接失败次数（同步拒绝 + 异步失败事件）
    pub connect_failures: AtomicU64,
    /// 连接超时次数
    pub connect_timeouts: AtomicU64,
    /// 被忽略的过期事件数（例如 teardown 之后迟到的 Online）
    pub stale_events: AtomicU64,
    /// 链路侧因事件通道满而丢弃的事件数（与 `EventSink` 共享）
    pub events_dropped: Arc<AtomicU64>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用链路投递端的丢弃计数器
    pub(crate) fn with_events_dropped(events_dropped: Arc<AtomicU64>) -> Self {
        Self {
            events_dropped,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            online_events: self.online_events.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            connect_timeouts: self.connect_timeouts.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.commands_sent.store(0, Ordering::Relaxed);
        self.commands_rejected.store(0, Ordering::Relaxed);
        self.commands_failed.store(0, Ordering::Relaxed);
        self.online_events.store(0, Ordering::Relaxed);
        self.connect_attempts.store(0, Ordering::Relaxed);
        self.connect_failures.store(0, Ordering::Relaxed);
        self.connect_timeouts.store(0, Ordering::Relaxed);
        self.stale_events.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub commands_sent: u64,
    pub commands_rejected: u64,
    pub commands_failed: u64,
    pub online_events: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub connect_timeouts: u64,
    pub stale_events: u64,
    pub events_dropped: u64,
}
