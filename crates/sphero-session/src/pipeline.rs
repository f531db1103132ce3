//! 事件线程循环
//!
//! 外设事件的唯一消费者：按到达顺序把 [`LinkEvent`] 交给会话处理，
//! 并在每次唤醒时检查连接超时。

use crate::session::SessionCore;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use sphero_link::LinkEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

/// 事件线程循环
///
/// # 参数
/// - `core`: 会话共享上下文
/// - `events`: 外设事件接收端（单消费者）
/// - `is_running`: 运行标志，置 false 后在一个轮询周期内退出
pub(crate) fn event_loop(core: Arc<SessionCore>, events: Receiver<LinkEvent>, is_running: Arc<AtomicBool>) {
    let poll_interval = core.config().event_poll_interval();
    debug!("Event loop started (poll interval {:?})", poll_interval);

    while is_running.load(Ordering::Acquire) {
        match events.recv_timeout(poll_interval) {
            Ok(event) => {
                trace!("Link event: {:?}", event);
                core.handle_event(event);
            },
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Event channel disconnected, exiting event loop");
                break;
            },
        }

        // 超时检查放在每次唤醒之后：事件密集时也不会被饿死
        core.check_connect_timeout(Instant::now());
    }

    debug!("Event loop stopped");
}
