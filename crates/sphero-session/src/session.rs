//! 会话 API 模块
//!
//! 提供对外的 [`ConnectionSession`]，封装事件线程和状态同步细节。
//!
//! # 同步模型
//!
//! `state` / `led_on` / `calibrating` 以及外设链路本身都放在同一把互斥锁内：
//! 用户发起的 `toggle_led()` 与异步到达的 Online/Offline 事件因此是全序的。
//! 快照（`ArcSwap`）与通知入队都在持锁期间完成，观察者回调在释放锁之后按入队顺序执行。

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::hooks::{ChannelObserver, NotificationDispatcher, SessionNotification, StateObserver};
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::pipeline::event_loop;
use crate::state::{SessionSnapshot, SessionState, StateChange, TransitionReason};
use arc_swap::ArcSwap;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use sphero_link::{EventSink, LinkEvent, PeripheralCommand, PeripheralLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 尾灯亮度：校准期间点亮，指示机器人背面
const CALIBRATION_BACK_LED: u8 = 255;

/// 互斥保护的会话内部状态
struct SessionInner {
    state: SessionState,
    led_on: bool,
    calibrating: bool,
    last_error: Option<String>,
    connect_deadline: Option<Instant>,
    connect_attempts: u64,
    link: Box<dyn PeripheralLink>,
}

/// 会话共享上下文（调用方与事件线程共享）
pub(crate) struct SessionCore {
    inner: Mutex<SessionInner>,
    snapshot: ArcSwap<SessionSnapshot>,
    notifier: NotificationDispatcher,
    metrics: SessionMetrics,
    config: SessionConfig,
}

impl SessionCore {
    fn new(link: Box<dyn PeripheralLink>, config: SessionConfig, events_dropped: Arc<AtomicU64>) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                led_on: false,
                calibrating: false,
                last_error: None,
                connect_deadline: None,
                connect_attempts: 0,
                link,
            }),
            snapshot: ArcSwap::from_pointee(SessionSnapshot::default()),
            notifier: NotificationDispatcher::new(),
            metrics: SessionMetrics::with_events_dropped(events_dropped),
            config,
        }
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 发布快照（必须持锁调用）
    fn publish(&self, inner: &SessionInner) {
        self.snapshot.store(Arc::new(SessionSnapshot {
            state: inner.state,
            led_on: inner.led_on,
            calibrating: inner.calibrating,
            last_error: inner.last_error.clone(),
            connect_attempts: inner.connect_attempts,
        }));
    }

    /// 执行状态转换并入队通知（必须持锁调用）
    ///
    /// 目标状态与当前状态相同时为空操作。
    fn transition(&self, inner: &mut SessionInner, to: SessionState, reason: TransitionReason) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if to != SessionState::Connected {
            inner.calibrating = false;
        }
        if to != SessionState::Connecting {
            inner.connect_deadline = None;
        }
        self.publish(inner);
        info!("Session {} -> {} ({:?})", from, to, reason);
        self.notifier
            .enqueue(SessionNotification::StateChanged(StateChange { from, to, reason }));
    }

    fn ensure_connected(&self, inner: &SessionInner) -> Result<(), SessionError> {
        if inner.state.accepts_commands() {
            Ok(())
        } else {
            SessionMetrics::incr(&self.metrics.commands_rejected);
            debug!("Command rejected in state {}", inner.state);
            Err(SessionError::NotConnected { state: inner.state })
        }
    }

    /// 持锁下发命令并更新指标
    fn dispatch(&self, inner: &mut SessionInner, command: PeripheralCommand) -> Result<(), SessionError> {
        match inner.link.send_command(command) {
            Ok(()) => {
                SessionMetrics::incr(&self.metrics.commands_sent);
                debug!("Dispatched {:?}", command);
                Ok(())
            },
            Err(e) => {
                SessionMetrics::incr(&self.metrics.commands_failed);
                warn!("Failed to dispatch {}: {}", command.name(), e);
                Err(e.into())
            },
        }
    }

    fn release_link(inner: &mut SessionInner) {
        if let Err(e) = inner.link.disconnect() {
            warn!("Failed to release {}: {}", inner.link.name(), e);
        }
    }

    pub(crate) fn setup_connection(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if !inner.state.can_start_connect() {
            debug!("setup_connection ignored in state {}", inner.state);
            return Ok(());
        }

        inner.connect_attempts += 1;
        SessionMetrics::incr(&self.metrics.connect_attempts);

        if let Err(e) = inner.link.connect() {
            SessionMetrics::incr(&self.metrics.connect_failures);
            let reason = e.to_string();
            error!("{} rejected connect: {}", inner.link.name(), reason);
            inner.last_error = Some(reason.clone());
            // 即使状态未变（Error -> Error），也要发布新的 last_error
            self.publish(&inner);
            self.transition(&mut inner, SessionState::Error, TransitionReason::ConnectFailed);
            drop(inner);
            self.notifier.dispatch();
            return Err(SessionError::ConnectionFailed { reason });
        }

        inner.last_error = None;
        // 超出 Instant 可表示范围时视为永不超时
        inner.connect_deadline = Instant::now().checked_add(self.config.connect_timeout());
        self.transition(&mut inner, SessionState::Connecting, TransitionReason::SetupRequested);
        drop(inner);
        self.notifier.dispatch();
        Ok(())
    }

    pub(crate) fn on_robot_online(&self) {
        SessionMetrics::incr(&self.metrics.online_events);
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Connecting => {
                self.transition(&mut inner, SessionState::Connected, TransitionReason::RobotOnline);
            },
            SessionState::Connected => {
                debug!("Duplicate online event ignored");
            },
            SessionState::Disconnected | SessionState::Error => {
                SessionMetrics::incr(&self.metrics.stale_events);
                debug!("Stale online event ignored in state {}", inner.state);
            },
        }
        drop(inner);
        self.notifier.dispatch();
    }

    pub(crate) fn on_connection_failed(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Connecting {
            SessionMetrics::incr(&self.metrics.stale_events);
            debug!("Stale connection failure ignored in state {}: {}", inner.state, reason);
            return;
        }
        SessionMetrics::incr(&self.metrics.connect_failures);
        warn!("Connection failed: {}", reason);
        inner.last_error = Some(reason.to_string());
        self.transition(&mut inner, SessionState::Error, TransitionReason::ConnectFailed);
        drop(inner);
        self.notifier.dispatch();
    }

    pub(crate) fn on_robot_offline(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Connected | SessionState::Connecting => {
                warn!("{} went offline", inner.link.name());
                Self::release_link(&mut inner);
                self.transition(&mut inner, SessionState::Disconnected, TransitionReason::LinkLost);
                drop(inner);
                self.notifier.dispatch();
            },
            SessionState::Disconnected | SessionState::Error => {
                SessionMetrics::incr(&self.metrics.stale_events);
                debug!("Stale offline event ignored in state {}", inner.state);
            },
        }
    }

    /// 检查连接超时（由事件线程周期性调用）
    pub(crate) fn check_connect_timeout(&self, now: Instant) {
        let mut inner = self.inner.lock();
        let expired = inner.state == SessionState::Connecting
            && inner.connect_deadline.is_some_and(|deadline| now >= deadline);
        if !expired {
            return;
        }

        let timeout = self.config.connect_timeout();
        warn!("Connect timeout after {:?}, cancelling attempt", timeout);
        SessionMetrics::incr(&self.metrics.connect_timeouts);
        Self::release_link(&mut inner);
        inner.last_error = Some(SessionError::ConnectTimeout(timeout).to_string());
        self.transition(&mut inner, SessionState::Error, TransitionReason::ConnectTimeout);
        drop(inner);
        self.notifier.dispatch();
    }

    pub(crate) fn handle_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Online => self.on_robot_online(),
            LinkEvent::Offline => self.on_robot_offline(),
            LinkEvent::ConnectionFailed { reason } => self.on_connection_failed(&reason),
        }
    }

    pub(crate) fn toggle_led(&self) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock();
        self.ensure_connected(&inner)?;

        let target = !inner.led_on;
        self.dispatch(&mut inner, PeripheralCommand::SetLed { on: target })?;
        // 仅在成功下发后翻转
        inner.led_on = target;
        self.publish(&inner);
        self.notifier.enqueue(SessionNotification::LedChanged(target));
        drop(inner);

        self.notifier.dispatch();
        Ok(target)
    }

    pub(crate) fn begin_calibration(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        self.ensure_connected(&inner)?;
        if inner.calibrating {
            return Ok(());
        }

        self.dispatch(
            &mut inner,
            PeripheralCommand::SetBackLed {
                brightness: CALIBRATION_BACK_LED,
            },
        )?;
        inner.calibrating = true;
        self.publish(&inner);
        info!("Calibration started");
        Ok(())
    }

    pub(crate) fn finish_calibration(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        self.ensure_connected(&inner)?;
        if !inner.calibrating {
            return Err(SessionError::NotCalibrating);
        }

        // 任一命令失败都保持 calibrating，重试时重新下发两条命令
        self.dispatch(&mut inner, PeripheralCommand::SetHeading { degrees: 0 })?;
        self.dispatch(&mut inner, PeripheralCommand::SetBackLed { brightness: 0 })?;
        inner.calibrating = false;
        self.publish(&inner);
        info!("Calibration finished, heading reset to 0");
        Ok(())
    }

    pub(crate) fn teardown(&self) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Disconnected {
            Self::release_link(&mut inner);
        }
        self.transition(&mut inner, SessionState::Disconnected, TransitionReason::Teardown);
        drop(inner);
        self.notifier.dispatch();
    }
}

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 机器人连接会话（对外 API）
///
/// 管理单个外设的连接生命周期，并按连接就绪状态门控命令下发。
///
/// - 所有操作都不阻塞在外设上：连接和命令都是 "发出即返回"，结果通过事件送达
/// - 外设事件由后台事件线程消费，和直接调用 `on_robot_online()` 等方法等价
/// - Drop 时执行 `teardown()` 并停止事件线程
///
/// # Example
///
/// ```rust
/// use sphero_link::{SimulatedConfig, SimulatedLink};
/// use sphero_session::{ConnectionSession, SessionError, SessionState};
/// use std::time::Duration;
///
/// let link = SimulatedLink::new("sphero", SimulatedConfig { handshake_delay_ms: 10, jitter_ms: 0, fail_handshake: false });
/// let session = ConnectionSession::builder().build(link).unwrap();
///
/// assert!(matches!(session.toggle_led(), Err(SessionError::NotConnected { .. })));
///
/// session.setup_connection().unwrap();
/// session.wait_until_connected(Duration::from_secs(2)).unwrap();
/// assert_eq!(session.state(), SessionState::Connected);
/// assert!(session.toggle_led().unwrap());
/// ```
pub struct ConnectionSession {
    core: Arc<SessionCore>,
    /// 运行标志（事件线程退出条件）
    is_running: Arc<AtomicBool>,
    /// 事件线程句柄（Drop 时 join）
    event_thread: Option<JoinHandle<()>>,
}

impl ConnectionSession {
    /// 事件线程 join 的最长等待时间
    const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn builder() -> crate::builder::SessionBuilder {
        crate::builder::SessionBuilder::new()
    }

    /// 创建会话
    ///
    /// 向链路注册事件投递端，并启动事件线程。会话初始状态为 Disconnected。
    pub fn new(link: impl PeripheralLink + 'static, config: SessionConfig) -> Result<Self, SessionError> {
        Self::with_observers(Box::new(link), config, Vec::new())
    }

    pub(crate) fn with_observers(
        mut link: Box<dyn PeripheralLink>,
        config: SessionConfig,
        observers: Vec<Arc<dyn StateObserver>>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let (event_tx, event_rx) = crossbeam_channel::bounded(config.event_channel_capacity);
        let sink = EventSink::new(event_tx);
        let events_dropped = sink.dropped_counter();
        link.subscribe(sink);

        let core = Arc::new(SessionCore::new(link, config, events_dropped));
        for observer in observers {
            core.notifier.add_observer(observer);
        }

        let is_running = Arc::new(AtomicBool::new(true));
        let core_clone = core.clone();
        let is_running_clone = is_running.clone();
        let event_thread = thread::Builder::new()
            .name("sphero-session-events".to_string())
            .spawn(move || event_loop(core_clone, event_rx, is_running_clone))
            .map_err(|e| SessionError::EventLoop(e.to_string()))?;

        Ok(Self {
            core,
            is_running,
            event_thread: Some(event_thread),
        })
    }

    /// 发起连接
    ///
    /// Disconnected/Error → Connecting；已在 Connecting/Connected 时为幂等空操作。
    ///
    /// # 错误
    /// - `SessionError::ConnectionFailed`: 链路同步拒绝了连接请求（会话进入 Error）
    pub fn setup_connection(&self) -> Result<(), SessionError> {
        self.core.setup_connection()
    }

    /// 外设上线通知
    ///
    /// Connecting → Connected；重复投递和过期投递都被忽略。
    pub fn on_robot_online(&self) {
        self.core.on_robot_online()
    }

    /// 外设连接失败通知（Connecting → Error）
    pub fn on_connection_failed(&self, reason: &str) {
        self.core.on_connection_failed(reason)
    }

    /// 外设掉线通知（Connected/Connecting → Disconnected）
    pub fn on_robot_offline(&self) {
        self.core.on_robot_offline()
    }

    /// 切换 LED
    ///
    /// 返回切换后的 LED 状态。
    ///
    /// # 错误
    /// - `SessionError::NotConnected`: 未连接，`led_on` 不变
    /// - `SessionError::Link`: 下发失败，`led_on` 不变
    pub fn toggle_led(&self) -> Result<bool, SessionError> {
        self.core.toggle_led()
    }

    /// 开始校准：点亮尾灯，用户旋转机器人使尾灯朝向自己
    pub fn begin_calibration(&self) -> Result<(), SessionError> {
        self.core.begin_calibration()
    }

    /// 结束校准：把当前朝向设为航向 0 并熄灭尾灯
    ///
    /// 依次下发 `SetHeading{0}` 与 `SetBackLed{0}`。
    ///
    /// # 错误
    /// - `SessionError::NotConnected`: 未连接
    /// - `SessionError::NotCalibrating`: 没有进行中的校准
    /// - `SessionError::Link`: 下发失败。此时会话仍处于校准中，外设航向可能已被重置，
    ///   尾灯可能仍亮着；再次调用 `finish_calibration()` 即可完成
    pub fn finish_calibration(&self) -> Result<(), SessionError> {
        self.core.finish_calibration()
    }

    /// 释放连接并回到 Disconnected（任意状态下都成功）
    pub fn teardown(&self) {
        self.core.teardown()
    }

    /// 当前状态（无锁）
    pub fn state(&self) -> SessionState {
        self.core.snapshot.load().state
    }

    /// 当前 LED 状态（无锁）
    pub fn is_led_on(&self) -> bool {
        self.core.snapshot.load().led_on
    }

    /// 获取会话快照（无锁）
    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.snapshot.load().as_ref().clone()
    }

    /// 获取指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// 注册观察者
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        self.core.notifier.add_observer(observer);
    }

    /// 以通道形式订阅通知（容量满时丢弃）
    pub fn subscribe_channel(&self, capacity: usize) -> Receiver<SessionNotification> {
        let (observer, rx) = ChannelObserver::new(capacity);
        self.add_observer(Arc::new(observer));
        rx
    }

    /// 等待进入 Connected
    ///
    /// # 返回值
    /// - `Ok(())`: 已连接
    /// - `Err(SessionError::ConnectionFailed)`: 连接尝试失败或超时（会话处于 Error）
    /// - `Err(SessionError::NotConnected)`: 会话处于 Disconnected（没有进行中的连接）
    /// - `Err(SessionError::ConnectTimeout)`: 等待超时（会话仍在 Connecting）
    pub fn wait_until_connected(&self, timeout: Duration) -> Result<(), SessionError> {
        let start = Instant::now();
        let poll = self.core.config().event_poll_interval();

        loop {
            let snapshot = self.core.snapshot.load();
            match snapshot.state {
                SessionState::Connected => return Ok(()),
                SessionState::Error => {
                    return Err(SessionError::ConnectionFailed {
                        reason: snapshot
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "unknown".to_string()),
                    });
                },
                SessionState::Disconnected => {
                    return Err(SessionError::NotConnected {
                        state: SessionState::Disconnected,
                    });
                },
                SessionState::Connecting => {},
            }

            if start.elapsed() >= timeout {
                return Err(SessionError::ConnectTimeout(timeout));
            }
            thread::sleep(poll);
        }
    }

    /// 事件线程是否存活
    pub fn is_healthy(&self) -> bool {
        self.event_thread.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.core.teardown();
        self.is_running.store(false, Ordering::Release);

        if let Some(handle) = self.event_thread.take()
            && let Err(e) = handle.join_timeout(Self::JOIN_TIMEOUT)
        {
            error!("Event thread did not stop cleanly: {:?}", e);
        }
    }
}
