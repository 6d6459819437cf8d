//! Behaviour of the standard command middleware chain.

use std::sync::Arc;
use std::time::Duration;

use syllabus_executor::testing::TestAdapters;
use syllabus_executor::{Outcome, Retry, ScopedUsage};
use syllabus_interceptors::Context;
use syllabus_logic::{Command, CommandKind, EffectOutput};
use syllabus_utils::error::EffectError;
use syllabus_utils::types::FaultKind;

fn inference(purpose: &str) -> Command {
    Command::InvokeInference {
        purpose: purpose.to_string(),
        prompt: "Explain borrowing".to_string(),
        max_tokens: 64,
    }
}

#[tokio::test]
async fn panics_become_internal_faults() {
    let adapters = TestAdapters::new();
    let executor = adapters.builder().build().unwrap();
    adapters.inference.panic_next();

    let fault = executor.run(&inference("chat")).await.unwrap_err();

    assert_eq!(fault.kind, FaultKind::Internal);
    assert!(fault.message.contains("panicked"));
    assert_eq!(fault.origin.as_deref(), Some("invoke_inference"));

    // The executor keeps working after a panic.
    assert!(executor.run(&inference("chat")).await.is_ok());
}

#[tokio::test]
async fn panicked_command_is_recorded_once_as_a_failure() {
    let adapters = TestAdapters::new();
    let executor = adapters.builder().build().unwrap();
    adapters.inference.panic_next();

    executor.run(&inference("chat")).await.unwrap_err();

    let records = adapters.observer.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, CommandKind::InvokeInference);
    assert!(records[0].usage.is_none());
    match &records[0].outcome {
        Outcome::Failure { kind, message } => {
            assert_eq!(*kind, FaultKind::Internal);
            assert!(message.contains("scripted inference panic"));
        }
        other => panic!("expected a failure record, got {other:?}"),
    }
}

#[tokio::test]
async fn observer_sees_every_execution_with_usage() {
    let adapters = TestAdapters::new();
    let executor = adapters.builder().build().unwrap();
    adapters.inference.reply_next("hello");
    adapters
        .inference
        .fail_next(EffectError::InvalidInput("bad prompt".into()));

    executor.run(&inference("chat")).await.unwrap();
    executor.run(&inference("chat")).await.unwrap_err();

    let records = adapters.observer.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, CommandKind::InvokeInference);
    assert_eq!(records[0].outcome, Outcome::Success);
    assert!(records[0].usage.is_some());
    assert!(matches!(
        records[1].outcome,
        Outcome::Failure {
            kind: FaultKind::Permanent,
            ..
        }
    ));
    assert_eq!(adapters.observer.total_usage(), records[0].usage.unwrap());
}

#[tokio::test]
async fn budget_counts_attempts_including_retries() {
    let adapters = TestAdapters::new();
    let executor = adapters
        .builder()
        .inference_budget(2)
        .retry(Retry::new(3, Duration::ZERO))
        .build()
        .unwrap();
    adapters
        .inference
        .fail_purpose("chat", EffectError::Transport("reset".into()));

    let fault = executor.run(&inference("chat")).await.unwrap_err();

    // Two transport failures consumed the budget; the third attempt was refused.
    assert_eq!(fault.kind, FaultKind::Permanent);
    assert!(fault.message.contains("Budget exceeded"));
    assert_eq!(adapters.inference.calls_for("chat"), 2);
    assert_eq!(executor.meter().calls(), 3);
}

#[tokio::test]
async fn retry_recovers_from_transient_fault() {
    let adapters = TestAdapters::new();
    let executor = adapters
        .builder()
        .retry(Retry::new(2, Duration::from_millis(1)).for_kinds([CommandKind::Search]))
        .build()
        .unwrap();
    adapters
        .retrieval
        .fail_next(EffectError::Unavailable("503".into()));

    let out = executor
        .run(&Command::Search {
            query: "lifetimes".into(),
            limit: 2,
        })
        .await
        .unwrap();

    assert!(matches!(out, EffectOutput::Search { ref hits } if hits.len() == 2));
    assert_eq!(adapters.retrieval.queries().len(), 2);
    // One record per command, not per attempt.
    assert_eq!(adapters.observer.records().len(), 1);
}

#[tokio::test]
async fn retry_skips_permanent_faults_and_other_kinds() {
    let adapters = TestAdapters::new();
    let executor = adapters
        .builder()
        .retry(Retry::new(2, Duration::ZERO).for_kinds([CommandKind::Search]))
        .build()
        .unwrap();
    adapters
        .inference
        .fail_next(EffectError::Throttled("429".into()));

    let fault = executor.run(&inference("chat")).await.unwrap_err();

    assert_eq!(fault.kind, FaultKind::Transient);
    assert_eq!(adapters.inference.requests().len(), 1);
}

#[tokio::test]
async fn scoped_usage_accumulates_per_context() {
    let adapters = TestAdapters::new();
    let executor = Arc::new(adapters.builder().build().unwrap());

    let mut ctx = Context::new();
    ctx.provide(ScopedUsage::default());
    adapters.inference.reply_next("one");
    adapters.inference.reply_next("two");
    executor.execute(&inference("a"), &mut ctx).await.unwrap();
    executor.execute(&inference("b"), &mut ctx).await.unwrap();
    executor
        .execute(
            &Command::Notify {
                channel: "learner".into(),
                message: "ready".into(),
            },
            &mut ctx,
        )
        .await
        .unwrap();

    let scoped = ctx.resource::<ScopedUsage>().copied().unwrap();
    assert_eq!(scoped.calls, 2);
    assert_eq!(scoped.usage.total(), 30);
    assert_eq!(executor.meter().usage().total(), 30);
}
