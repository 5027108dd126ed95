// tests/registry_transitions.rs

use proptest::prelude::*;
use serde_json::json;

use taskpoll::registry::{StatusUpdate, TaskRegistry};
use taskpoll::types::{ErrorKind, TaskState};

fn update_strategy() -> impl Strategy<Value = StatusUpdate> {
    prop_oneof![
        Just(StatusUpdate::InProgress),
        Just(StatusUpdate::Completed(json!([{"symbol": "TEST"}]))),
        Just(StatusUpdate::Failed {
            error: "boom".to_string(),
            kind: ErrorKind::Crash,
        }),
        Just(StatusUpdate::Cancelled {
            reason: "cancelled".to_string(),
        }),
    ]
}

fn rank(state: TaskState) -> u8 {
    match state {
        TaskState::Pending => 0,
        TaskState::InProgress => 1,
        _ => 2,
    }
}

proptest! {
    // Whatever order updates arrive in, state never moves backwards and
    // the first terminal update wins for good.
    #[test]
    fn transitions_are_monotonic_and_terminal_once(
        updates in proptest::collection::vec(update_strategy(), 1..12)
    ) {
        let registry = TaskRegistry::new();
        let id = registry.create("scan");

        let mut first_terminal: Option<TaskState> = None;
        let mut last_rank = 0;

        for update in updates {
            let requested = update.state();
            let applied = registry.set_status(&id, update);
            let status = registry.get(&id);

            prop_assert!(rank(status.state) >= last_rank);
            last_rank = rank(status.state);

            match first_terminal {
                Some(terminal) => {
                    prop_assert!(!applied);
                    prop_assert_eq!(status.state, terminal);
                }
                None if requested.is_terminal() => {
                    prop_assert!(applied);
                    first_terminal = Some(requested);
                }
                None => {}
            }

            prop_assert_eq!(status.result.is_some(), status.state == TaskState::Completed);
            prop_assert_eq!(
                status.error.is_some(),
                matches!(status.state, TaskState::Failed | TaskState::Cancelled)
            );
        }
    }
}
