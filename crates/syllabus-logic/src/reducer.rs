//! Pure state transitions.

use crate::command::Command;
use crate::state::{Message, Role, SessionEvent, SessionState, SessionStatus};

/// A pure transition function.
///
/// Implementations must be referentially transparent: no I/O, no clock, no
/// randomness. Taking `&State` and returning a fresh value means the caller's
/// snapshot is never modified.
pub trait Reducer {
    type State;
    type Event;
    type Command;

    fn reduce(&self, state: &Self::State, event: Self::Event) -> (Self::State, Vec<Self::Command>);
}

/// Reducer for interactive chat sessions.
#[derive(Debug, Clone)]
pub struct SessionReducer {
    max_tokens: u32,
}

impl SessionReducer {
    pub const DEFAULT_MAX_TOKENS: u32 = 1024;
    pub const PURPOSE: &'static str = "chat";

    #[must_use]
    pub const fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }

    /// Render the transcript as the inference prompt.
    fn prompt(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                format!("{role}: {}", m.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn show_error(message: impl Into<String>) -> Command {
        Command::ShowError {
            message: message.into(),
        }
    }
}

impl Default for SessionReducer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_TOKENS)
    }
}

impl Reducer for SessionReducer {
    type State = SessionState;
    type Event = SessionEvent;
    type Command = Command;

    fn reduce(&self, state: &SessionState, event: SessionEvent) -> (SessionState, Vec<Command>) {
        match event {
            SessionEvent::Submit { text } => {
                if state.status == SessionStatus::Awaiting {
                    return (
                        state.clone(),
                        vec![Self::show_error("a response is still pending")],
                    );
                }
                if text.trim().is_empty() {
                    return (state.clone(), vec![Self::show_error("message is empty")]);
                }

                let mut messages = state.messages.clone();
                messages.push(Message::user(text));
                let prompt = Self::prompt(&messages);

                let next = SessionState {
                    messages,
                    status: SessionStatus::Awaiting,
                    last_error: None,
                    usage: state.usage,
                };
                let commands = vec![Command::InvokeInference {
                    purpose: Self::PURPOSE.to_string(),
                    prompt,
                    max_tokens: self.max_tokens,
                }];
                (next, commands)
            }

            SessionEvent::InferenceSucceeded { text, usage } => {
                // A late reply for a request the session no longer waits on.
                if state.status != SessionStatus::Awaiting {
                    return (state.clone(), Vec::new());
                }
                let mut messages = state.messages.clone();
                messages.push(Message::assistant(text));
                let mut total = state.usage;
                total.add(usage);

                let next = SessionState {
                    messages,
                    status: SessionStatus::Idle,
                    last_error: None,
                    usage: total,
                };
                (next, Vec::new())
            }

            SessionEvent::InferenceFailed { fault } => {
                if state.status != SessionStatus::Awaiting {
                    return (state.clone(), Vec::new());
                }
                let message = format!("inference failed: {}", fault.message);
                let next = SessionState {
                    messages: state.messages.clone(),
                    status: SessionStatus::Failed,
                    last_error: Some(fault),
                    usage: state.usage,
                };
                (next, vec![Self::show_error(message)])
            }

            SessionEvent::Reset => (SessionState::default(), Vec::new()),
        }
    }
}
