//! 会话状态机属性测试

use proptest::prelude::*;
use sphero_link::mock::MockLink;
use sphero_session::{ConnectionSession, SessionConfig, SessionError, SessionState};

#[derive(Debug, Clone, Copy)]
enum Op {
    Setup,
    Online,
    Offline,
    Failed,
    Teardown,
    Toggle,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Setup),
        Just(Op::Online),
        Just(Op::Offline),
        Just(Op::Failed),
        Just(Op::Teardown),
        Just(Op::Toggle),
    ]
}

fn apply(session: &ConnectionSession, op: Op) {
    match op {
        Op::Setup => {
            let _ = session.setup_connection();
        },
        Op::Online => session.on_robot_online(),
        Op::Offline => session.on_robot_offline(),
        Op::Failed => session.on_connection_failed("injected"),
        Op::Teardown => session.teardown(),
        Op::Toggle => {
            let _ = session.toggle_led();
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 非 Connected 状态下的任意次切换都被拒绝，且 led_on 不变
    #[test]
    fn toggle_outside_connected_never_changes_led(
        prefix in prop::collection::vec(op_strategy(), 0..12),
        toggles in 1usize..8,
    ) {
        let link = MockLink::new();
        let handle = link.handle();
        let session = ConnectionSession::new(link, SessionConfig::default()).unwrap();

        for op in prefix {
            apply(&session, op);
        }
        if session.state() == SessionState::Connected {
            session.teardown();
        }

        let led_before = session.is_led_on();
        let sent_before = handle.sent().len();
        for _ in 0..toggles {
            let is_not_connected = matches!(session.toggle_led(), Err(SessionError::NotConnected { .. }));
            prop_assert!(is_not_connected);
        }
        prop_assert_eq!(session.is_led_on(), led_before);
        prop_assert_eq!(handle.sent().len(), sent_before);
    }

    /// 任意操作序列之后 teardown 都回到 Disconnected
    #[test]
    fn teardown_always_disconnects(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let link = MockLink::new();
        let session = ConnectionSession::new(link, SessionConfig::default()).unwrap();

        for op in ops {
            apply(&session, op);
        }
        session.teardown();
        prop_assert_eq!(session.state(), SessionState::Disconnected);
        prop_assert!(!session.snapshot().calibrating);
    }

    /// Connected 状态下偶数次切换还原 LED
    #[test]
    fn even_toggles_restore_led(pairs in 1usize..6) {
        let link = MockLink::new();
        let handle = link.handle();
        let session = ConnectionSession::new(link, SessionConfig::default()).unwrap();
        session.setup_connection().unwrap();
        session.on_robot_online();

        let before = session.is_led_on();
        for _ in 0..pairs * 2 {
            session.toggle_led().unwrap();
        }
        prop_assert_eq!(session.is_led_on(), before);
        prop_assert_eq!(handle.sent().len(), pairs * 2);
    }
}
