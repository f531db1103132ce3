//! 钩子系统（Observer）
//!
//! UI 层通过观察者接收状态变化和 LED 变化通知。
//!
//! # 调用约定
//!
//! - 通知在会话锁内按转换顺序入队，释放锁后统一投递：所有观察者看到的顺序与状态转换顺序一致
//! - 投递时不持有任何会话锁，回调内部可以再次调用会话方法（包括注册观察者）
//! - 同一时刻只有一个线程在投递；其他线程产生的通知由正在投递的线程接手，
//!   因此回调可能在调用方线程或事件线程上执行，实现必须是 `Send + Sync`
//! - 回调应尽快返回；需要跨线程处理时使用 [`ChannelObserver`]
//!
//! ```rust
//! use sphero_session::hooks::{ChannelObserver, ObserverManager, SessionNotification, StateObserver};
//! use sphero_session::{SessionState, StateChange, TransitionReason};
//! use std::sync::Arc;
//!
//! let mut observers = ObserverManager::new();
//! let (observer, rx) = ChannelObserver::new(16);
//! observers.add_observer(Arc::new(observer));
//!
//! observers.notify_state(&StateChange {
//!     from: SessionState::Disconnected,
//!     to: SessionState::Connecting,
//!     reason: TransitionReason::SetupRequested,
//! });
//! assert!(matches!(rx.try_recv(), Ok(SessionNotification::StateChanged(_))));
//! ```

use crate::state::StateChange;
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 会话观察者
pub trait StateObserver: Send + Sync {
    /// 状态发生真实转换时调用（幂等空操作不触发）
    fn on_state_changed(&self, change: &StateChange);

    /// LED 状态在成功下发后变化时调用
    fn on_led_changed(&self, on: bool) {
        let _ = on;
    }
}

/// 观察者管理器
///
/// 列表本身不是线程安全的，由会话通过 `RwLock` 保护。
/// 克隆只复制 `Arc`，会话投递前先克隆列表再释放锁。
#[derive(Default, Clone)]
pub struct ObserverManager {
    observers: Vec<Arc<dyn StateObserver>>,
}

impl ObserverManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StateObserver>) {
        self.observers.push(observer);
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn notify_state(&self, change: &StateChange) {
        for observer in self.observers.iter() {
            observer.on_state_changed(change);
        }
    }

    pub fn notify_led(&self, on: bool) {
        for observer in self.observers.iter() {
            observer.on_led_changed(on);
        }
    }

    pub fn deliver(&self, notification: &SessionNotification) {
        match notification {
            SessionNotification::StateChanged(change) => self.notify_state(change),
            SessionNotification::LedChanged(on) => self.notify_led(*on),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// 有序通知分发器
///
/// `enqueue` 必须在会话锁内调用，入队顺序即转换顺序；`dispatch` 在释放会话锁后调用。
pub(crate) struct NotificationDispatcher {
    observers: RwLock<ObserverManager>,
    queue: Mutex<VecDeque<SessionNotification>>,
    /// 投递权（同一时刻只有一个线程投递）
    delivering: Mutex<()>,
}

impl NotificationDispatcher {
    pub(crate) fn new() -> Self {
        Self {
            observers: RwLock::new(ObserverManager::new()),
            queue: Mutex::new(VecDeque::new()),
            delivering: Mutex::new(()),
        }
    }

    pub(crate) fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        self.observers.write().add_observer(observer);
    }

    pub(crate) fn enqueue(&self, notification: SessionNotification) {
        self.queue.lock().push_back(notification);
    }

    /// 投递队列中的全部通知
    ///
    /// 已有线程在投递时立即返回，由该线程接手新入队的通知。
    pub(crate) fn dispatch(&self) {
        loop {
            let Some(guard) = self.delivering.try_lock() else {
                return;
            };
            loop {
                let Some(notification) = self.queue.lock().pop_front() else {
                    break;
                };
                let observers = self.observers.read().clone();
                observers.deliver(&notification);
            }
            drop(guard);

            // 释放投递权之前入队、但 try_lock 失败的通知
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }
}

/// 通过通道转发的通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotification {
    StateChanged(StateChange),
    LedChanged(bool),
}

/// 基于有界通道的观察者
///
/// 使用 `try_send`，队列满时丢弃通知并计数，不会阻塞会话。
pub struct ChannelObserver {
    tx: Sender<SessionNotification>,
    dropped: Arc<AtomicU64>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, Receiver<SessionNotification>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 丢弃的通知数
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }

    fn forward(&self, notification: SessionNotification) {
        if self.tx.try_send(notification).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl StateObserver for ChannelObserver {
    fn on_state_changed(&self, change: &StateChange) {
        self.forward(SessionNotification::StateChanged(*change));
    }

    fn on_led_changed(&self, on: bool) {
        self.forward(SessionNotification::LedChanged(on));
    }
}
