//! Property-based tests for queue item status transitions
//! **Feature: kubeshift-domain, Property 1: Monotonic Item Lifecycle**

#[cfg(test)]
mod tests {
    use crate::models::{MigrationConfig, QueueItem, RepositoryRef};
    use crate::status::QueueItemStatus;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = QueueItemStatus> {
        prop_oneof![
            Just(QueueItemStatus::Pending),
            Just(QueueItemStatus::Processing),
            Just(QueueItemStatus::Completed),
            Just(QueueItemStatus::Failed),
            Just(QueueItemStatus::Cancelled),
        ]
    }

    fn rank(status: QueueItemStatus) -> u8 {
        match status {
            QueueItemStatus::Pending => 0,
            QueueItemStatus::Processing => 1,
            _ => 2,
        }
    }

    proptest! {
        /// For any sequence of requested transitions, the statuses actually
        /// observed on an item never move backwards and never leave a finished state.
        #[test]
        fn prop_observed_statuses_are_monotonic(
            requests in prop::collection::vec(arb_status(), 0..20)
        ) {
            let mut item = QueueItem::new(
                RepositoryRef::from_url("https://github.com/acme/api"),
                MigrationConfig::default(),
                0,
                0,
            );
            let mut observed = vec![item.status];

            for next in requests {
                if item.transition(next).is_ok() {
                    observed.push(item.status);
                }
            }

            for pair in observed.windows(2) {
                prop_assert!(rank(pair[0]) < rank(pair[1]));
                prop_assert!(!pair[0].is_finished());
            }
        }

        /// Every accepted transition is one `can_transition_to` allows.
        #[test]
        fn prop_transition_agrees_with_table(from in arb_status(), to in arb_status()) {
            let mut item = QueueItem::new(
                RepositoryRef::from_url("https://github.com/acme/api"),
                MigrationConfig::default(),
                0,
                0,
            );
            item.status = from;
            let accepted = item.transition(to).is_ok();
            prop_assert_eq!(accepted, from.can_transition_to(to));
        }
    }
}
