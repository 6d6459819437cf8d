//! `chat`: one turn of an interactive session against the offline adapters.

use anyhow::Result;

use syllabus_logic::{Role, SessionStatus};

use crate::services::Services;
use crate::session::SessionRuntime;
use crate::Config;

pub async fn execute_chat_command(text: &str, config: &Config) -> Result<()> {
    let services = Services::offline(config)?;
    let mut session = SessionRuntime::new(services.executor.clone());
    session.submit(text).await;

    let state = session.state();
    if state.status == SessionStatus::Failed {
        if let Some(fault) = &state.last_error {
            return Err(anyhow::Error::new(fault.clone()).context("Chat inference failed"));
        }
    }

    for message in state.messages.iter().filter(|m| m.role == Role::Assistant) {
        println!("{}", message.text);
    }
    tracing::debug!(tokens = state.usage.total(), "Chat turn finished");
    Ok(())
}
