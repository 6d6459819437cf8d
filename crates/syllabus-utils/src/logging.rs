//! Tracing setup and structured log helpers.
//!
//! Every phase run, command execution and workflow transition logs through
//! these helpers so field names stay consistent (`workflow_id`, `phase`,
//! `command`, `duration_ms`).

use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects debug output for the
/// syllabus crates. `json` switches to newline-delimited JSON events.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("syllabus=debug,info")
            } else {
                EnvFilter::try_new("syllabus=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?;
    } else if verbose {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one phase handler run.
pub fn phase_span(workflow_id: &str, phase: &str, attempt: u32) -> tracing::Span {
    span!(
        Level::INFO,
        "phase_execution",
        workflow_id = %workflow_id,
        phase = %phase,
        attempt = attempt,
    )
}

/// Span wrapping one command execution.
pub fn command_span(command: &str) -> tracing::Span {
    span!(Level::DEBUG, "command", command = %command)
}

pub fn log_phase_start(workflow_id: &str, phase: &str, attempt: u32) {
    info!(
        workflow_id = %workflow_id,
        phase = %phase,
        attempt = attempt,
        "Starting phase execution"
    );
}

pub fn log_phase_complete(workflow_id: &str, phase: &str, next: &str, duration_ms: u128) {
    info!(
        workflow_id = %workflow_id,
        phase = %phase,
        next = %next,
        duration_ms = %duration_ms,
        "Phase execution completed"
    );
}

pub fn log_phase_error(workflow_id: &str, phase: &str, error: &str, duration_ms: u128) {
    error!(
        workflow_id = %workflow_id,
        phase = %phase,
        duration_ms = %duration_ms,
        error = %error,
        "Phase execution failed"
    );
}

/// Log a signal that was dropped without touching the record.
pub fn log_signal_discarded(workflow_id: &str, phase: &str, reason: &str) {
    warn!(
        workflow_id = %workflow_id,
        phase = %phase,
        reason = %reason,
        "Discarding phase signal"
    );
}
