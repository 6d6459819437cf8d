//! Interactive session loop against scripted adapters.

use std::sync::Arc;

use syllabus::{Command, SessionEvent, SessionRuntime};
use syllabus_executor::NoticeLevel;
use syllabus_executor::testing::TestAdapters;
use syllabus_logic::{Message, SessionStatus};
use syllabus_utils::error::EffectError;
use syllabus_utils::types::FaultKind;

fn runtime(adapters: &TestAdapters) -> SessionRuntime {
    SessionRuntime::new(Arc::new(adapters.builder().build().unwrap()))
}

#[tokio::test]
async fn test_submit_runs_inference_and_records_reply() {
    let adapters = TestAdapters::new();
    adapters.inference.reply_next("hi there");
    let mut session = runtime(&adapters);

    let executed = session.submit("hello").await;

    assert_eq!(executed.len(), 1);
    assert!(matches!(
        &executed[0],
        Command::InvokeInference { purpose, prompt, .. }
            if purpose == "chat" && prompt.contains("hello")
    ));

    let state = session.state();
    assert_eq!(
        state.messages,
        vec![Message::user("hello"), Message::assistant("hi there")]
    );
    assert_eq!(state.status, SessionStatus::Idle);
    assert_eq!(state.usage.total(), 15);
    assert_eq!(adapters.inference.calls_for("chat"), 1);
}

#[tokio::test]
async fn test_failed_inference_surfaces_error() {
    let adapters = TestAdapters::new();
    adapters
        .inference
        .fail_next(EffectError::InvalidInput("prompt too long".into()));
    let mut session = runtime(&adapters);

    let executed = session.submit("hello").await;

    assert_eq!(executed.len(), 2);
    assert!(matches!(executed[1], Command::ShowError { .. }));

    let state = session.state();
    assert_eq!(state.status, SessionStatus::Failed);
    assert_eq!(state.messages, vec![Message::user("hello")]);
    let fault = state.last_error.as_ref().unwrap();
    assert_eq!(fault.kind, FaultKind::Permanent);

    let notices = adapters.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(notices[0].message.contains("prompt too long"));
}

#[tokio::test]
async fn test_empty_submit_only_shows_error() {
    let adapters = TestAdapters::new();
    let mut session = runtime(&adapters);

    let executed = session.submit("   ").await;

    assert!(matches!(executed.as_slice(), [Command::ShowError { .. }]));
    assert!(session.state().messages.is_empty());
    assert!(adapters.inference.requests().is_empty());
}

#[tokio::test]
async fn test_conversation_accumulates_and_resets() {
    let adapters = TestAdapters::new();
    adapters.inference.reply_next("first");
    adapters.inference.reply_next("second");
    let mut session = runtime(&adapters);

    session.submit("one").await;
    session.submit("two").await;

    assert_eq!(session.state().messages.len(), 4);
    assert_eq!(session.state().usage.total(), 30);
    let last_prompt = &adapters.inference.requests()[1].prompt;
    assert!(last_prompt.contains("one"));
    assert!(last_prompt.contains("first"));

    let executed = session.dispatch(SessionEvent::Reset).await;
    assert!(executed.is_empty());
    assert_eq!(session.state(), &Default::default());
}
