//! Interactive session loop: reducer decisions in, effects out.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use syllabus_executor::CommandExecutor;
use syllabus_logic::{Command, EffectOutput, Reducer, SessionEvent, SessionReducer, SessionState};
use syllabus_utils::types::Fault;

/// Owns the current [`SessionState`] and runs the reducer/executor loop.
///
/// Each command the reducer produces is executed exactly once. Inference
/// results come back as `InferenceSucceeded`/`InferenceFailed` events and
/// are reduced in turn, until no commands remain.
pub struct SessionRuntime {
    reducer: SessionReducer,
    state: SessionState,
    executor: Arc<CommandExecutor>,
}

impl SessionRuntime {
    #[must_use]
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self::with_reducer(executor, SessionReducer::default())
    }

    #[must_use]
    pub fn with_reducer(executor: Arc<CommandExecutor>, reducer: SessionReducer) -> Self {
        Self {
            reducer,
            state: SessionState::default(),
            executor,
        }
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Feed `event` through the reducer and run every resulting command.
    ///
    /// Returns the commands that were executed, in order.
    pub async fn dispatch(&mut self, event: SessionEvent) -> Vec<Command> {
        let mut events = VecDeque::from([event]);
        let mut executed = Vec::new();

        while let Some(event) = events.pop_front() {
            let (next, commands) = self.reducer.reduce(&self.state, event);
            self.state = next;

            for command in commands {
                let result = self.executor.run(&command).await;
                if let Some(feedback) = Self::feedback(&command, result) {
                    events.push_back(feedback);
                }
                executed.push(command);
            }
        }
        debug!(
            messages = self.state.messages.len(),
            status = ?self.state.status,
            "Session settled"
        );
        executed
    }

    /// Convenience for `dispatch(SessionEvent::Submit { .. })`.
    pub async fn submit(&mut self, text: impl Into<String>) -> Vec<Command> {
        self.dispatch(SessionEvent::Submit { text: text.into() })
            .await
    }

    fn feedback(command: &Command, result: Result<EffectOutput, Fault>) -> Option<SessionEvent> {
        match (command, result) {
            (Command::InvokeInference { .. }, Ok(EffectOutput::Inference { text, usage })) => {
                Some(SessionEvent::InferenceSucceeded { text, usage })
            }
            (Command::InvokeInference { .. }, Ok(other)) => Some(SessionEvent::InferenceFailed {
                fault: Fault::internal(format!("inference returned {other:?}")),
            }),
            (Command::InvokeInference { .. }, Err(fault)) => {
                Some(SessionEvent::InferenceFailed { fault })
            }
            (_, Ok(_)) => None,
            (command, Err(fault)) => {
                warn!(command = %command.kind(), fault = %fault, "Session command failed");
                None
            }
        }
    }
}
