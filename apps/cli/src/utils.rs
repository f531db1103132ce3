//! 输出格式化工具

use sphero_session::{SessionNotification, SessionSnapshot};

/// 单行描述会话快照
pub fn describe_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "state={} led={}",
        snapshot.state,
        if snapshot.led_on { "on" } else { "off" }
    );
    if snapshot.calibrating {
        line.push_str(" calibrating");
    }
    if let Some(err) = &snapshot.last_error {
        line.push_str(&format!(" last_error=\"{}\"", err));
    }
    line
}

/// 描述一条会话通知
pub fn describe_notification(notification: &SessionNotification) -> String {
    match notification {
        SessionNotification::StateChanged(change) => {
            format!("{} -> {} ({:?})", change.from, change.to, change.reason)
        },
        SessionNotification::LedChanged(on) => {
            format!("LED {}", if *on { "on" } else { "off" })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphero_session::{SessionState, StateChange, TransitionReason};

    #[test]
    fn test_describe_snapshot() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(describe_snapshot(&snapshot), "state=Disconnected led=off");

        let snapshot = SessionSnapshot {
            state: SessionState::Error,
            last_error: Some("timeout".to_string()),
            ..SessionSnapshot::default()
        };
        assert_eq!(
            describe_snapshot(&snapshot),
            "state=Error led=off last_error=\"timeout\""
        );
    }

    #[test]
    fn test_describe_notification() {
        let change = StateChange {
            from: SessionState::Connecting,
            to: SessionState::Connected,
            reason: TransitionReason::RobotOnline,
        };
        assert_eq!(
            describe_notification(&SessionNotification::StateChanged(change)),
            "Connecting -> Connected (RobotOnline)"
        );
        assert_eq!(
            describe_notification(&SessionNotification::LedChanged(true)),
            "LED on"
        );
    }
}
