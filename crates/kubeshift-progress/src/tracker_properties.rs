//! Property-based tests for progress accounting
//!
//! **Feature: kubeshift-progress, Property 1: Step completion has set semantics**
//! **Feature: kubeshift-progress, Property 2: Operation percentage counts finished repositories**
//! **Feature: kubeshift-progress, Property 3: Terminal repositories are frozen**

use crate::store::ProgressStore;
use crate::tracker::ProgressTracker;
use kubeshift_config::PersistFormat;
use kubeshift_domain::{MigrationStatus, MigrationStep};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn tracker() -> ProgressTracker {
    ProgressTracker::new(ProgressStore::new(
        std::env::temp_dir().join("kubeshift-progress-properties"),
        PersistFormat::Json,
    ))
    .with_persist_on_complete(false)
}

fn step_strategy() -> impl Strategy<Value = MigrationStep> {
    prop::sample::select(MigrationStep::ALL.to_vec())
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Running,
    Complete,
    Fail,
}

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Running), Just(Outcome::Complete), Just(Outcome::Fail)]
}

proptest! {
    #[test]
    fn prop_completed_steps_match_distinct_reports(steps in prop::collection::vec(step_strategy(), 0..30)) {
        let tracker = tracker();
        tracker.start_operation("op", ["repo"]);
        for step in &steps {
            prop_assert!(tracker.complete_repository_step("op", "repo", *step));
        }

        let repo = tracker.get_repository_progress("op", "repo").unwrap();
        let distinct: BTreeSet<MigrationStep> = steps.iter().copied().collect();
        prop_assert_eq!(&repo.completed_steps, &distinct);
        prop_assert_eq!(repo.logs.len(), distinct.len());

        let expected = distinct.len() as f64 / MigrationStep::total_steps() as f64 * 100.0;
        prop_assert!((repo.percentage() - expected).abs() < 1e-9);
        prop_assert!(repo.percentage() <= 100.0);
    }

    #[test]
    fn prop_overall_percentage_counts_finished(outcomes in prop::collection::vec(outcome_strategy(), 0..12)) {
        let tracker = tracker();
        let ids: Vec<String> = (0..outcomes.len()).map(|i| format!("repo-{}", i)).collect();
        tracker.start_operation("op", ids.clone());

        for (id, outcome) in ids.iter().zip(&outcomes) {
            match outcome {
                Outcome::Running => {
                    tracker.update_repository_progress("op", id, MigrationStep::Analyzing);
                }
                Outcome::Complete => {
                    tracker.complete_repository("op", id);
                }
                Outcome::Fail => {
                    tracker.fail_repository("op", id, "boom");
                }
            }
        }

        let progress = tracker.get_progress("op").unwrap();
        let finished = outcomes.iter().filter(|o| !matches!(o, Outcome::Running)).count();
        let expected = if outcomes.is_empty() {
            0.0
        } else {
            finished as f64 / outcomes.len() as f64 * 100.0
        };
        prop_assert!((progress.overall_percentage() - expected).abs() < 1e-9);
        prop_assert!(progress.validate().is_ok());
    }

    #[test]
    fn prop_terminal_repository_is_frozen(
        fail in any::<bool>(),
        later in prop::collection::vec(step_strategy(), 1..10),
    ) {
        let tracker = tracker();
        tracker.start_operation("op", ["repo"]);
        if fail {
            tracker.fail_repository("op", "repo", "boom");
        } else {
            tracker.complete_repository("op", "repo");
        }
        let before = tracker.get_repository_progress("op", "repo").unwrap();

        for step in later {
            prop_assert!(!tracker.update_repository_progress("op", "repo", step));
            prop_assert!(!tracker.complete_repository_step("op", "repo", step));
        }

        let after = tracker.get_repository_progress("op", "repo").unwrap();
        prop_assert_eq!(after, before.clone());
        let expected = if fail { MigrationStatus::Failed } else { MigrationStatus::Completed };
        prop_assert_eq!(before.status, expected);
    }
}
