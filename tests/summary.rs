//! Summary Integration Tests
//!
//! The digest depends only on recorded results, never on the order in which
//! steps happened to finish.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use daybreak::adapters::{Adapter, AdapterSet, StepContext};
use daybreak::core::{render, AdapterKind, Orchestrator, StepRegistry};
use daybreak::domain::{Payload, RoutineRun, StepError, StepResult};
use uuid::Uuid;

/// Replies after a fixed delay
struct Delayed(Duration, &'static str);

#[async_trait]
impl Adapter for Delayed {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn invoke(&self, _ctx: StepContext) -> Result<Payload> {
        tokio::time::sleep(self.0).await;
        Ok(Payload::text(self.1))
    }
}

fn delayed_set(delays_ms: [u64; 6]) -> AdapterSet {
    AdapterKind::ALL
        .iter()
        .zip(delays_ms)
        .fold(AdapterSet::new(), |set, (&kind, ms)| {
            set.with(kind, Arc::new(Delayed(Duration::from_millis(ms), kind.as_str())))
        })
}

#[tokio::test(start_paused = true)]
async fn test_digest_independent_of_completion_order() {
    let registry = StepRegistry::canonical().unwrap();

    let fast_first = Orchestrator::new(delayed_set([10, 20, 30, 40, 50, 60]))
        .execute(&registry)
        .await;
    let slow_first = Orchestrator::new(delayed_set([60, 50, 40, 30, 20, 10]))
        .execute(&registry)
        .await;

    // Completion order differs...
    let finished: Vec<&str> = fast_first.results.iter().map(|r| r.step_name.as_str()).collect();
    let reversed: Vec<&str> = slow_first.results.iter().map(|r| r.step_name.as_str()).collect();
    assert_ne!(finished, reversed);

    // ...the digest does not, even though run ids and trigger times do
    assert_ne!(fast_first.id, slow_first.id);
    assert_eq!(render(&fast_first), render(&slow_first));
}

#[test]
fn test_render_is_idempotent_and_shuffle_proof() {
    let at = Utc.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap();
    let results = vec![
        StepResult::success("alarm", 0, Payload::text("ok"), at, at),
        StepResult::failure(
            "tasks",
            4,
            StepError::Timeout { after_ms: 5000 },
            at,
            at,
        ),
        StepResult::skipped(
            "summarize",
            2,
            StepError::DependencyNotSatisfied {
                dependency: "news_fetch".to_string(),
                status: daybreak::StepStatus::Failed,
            },
        ),
    ];

    let build = |order: &[usize]| {
        let mut run = RoutineRun::new(Uuid::nil(), at);
        for &i in order {
            run.record(results[i].clone());
        }
        run.finalize()
    };

    let a = build(&[0, 1, 2]);
    let b = build(&[2, 1, 0]);

    assert_eq!(render(&a), render(&a));
    assert_eq!(render(&a), render(&b));

    let digest = render(&a);
    assert!(digest.contains("timed_out  error: timed out after 5000ms"));
    assert!(digest.contains("skipped    error: dependency 'news_fetch' did not succeed (failed)"));
}
