//! In-process signal delivery.
//!
//! [`ChannelSignalBus`] is the executor's signal adapter: every
//! `EmitPhaseSignal` command lands on a tokio channel, after its delay.
//! [`SignalBus::drain`] feeds the channel into a [`Coordinator`] until
//! nothing is pending, which stands in for a hosting platform's
//! at-least-once delivery.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use syllabus_executor::SignalSink;
use syllabus_logic::PhaseSignal;
use syllabus_utils::error::EffectError;

use crate::coordinator::{Coordinator, SignalDisposition};

/// Sending half of a [`SignalBus`]. Cheap to clone.
#[derive(Clone)]
pub struct ChannelSignalBus {
    tx: mpsc::UnboundedSender<PhaseSignal>,
    pending: Arc<AtomicUsize>,
}

#[async_trait]
impl SignalSink for ChannelSignalBus {
    async fn emit(&self, signal: PhaseSignal, delay: Duration) -> Result<(), EffectError> {
        if self.tx.is_closed() {
            return Err(EffectError::Unavailable("signal bus is closed".to_string()));
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        debug!(signal = %signal, delay_ms = delay.as_millis() as u64, "Queued phase signal");

        if delay.is_zero() {
            return self.tx.send(signal).map_err(|_| {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                EffectError::Unavailable("signal bus is closed".to_string())
            });
        }

        let tx = self.tx.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(signal).is_err() {
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        });
        Ok(())
    }
}

/// What a drain run saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub advanced: usize,
    pub completed: usize,
    pub discarded: usize,
    pub retries: usize,
    pub failed: usize,
    pub errors: usize,
}

impl DrainReport {
    fn count(&mut self, disposition: &SignalDisposition) {
        match disposition {
            SignalDisposition::Advanced { .. } => self.advanced += 1,
            SignalDisposition::Completed => self.completed += 1,
            SignalDisposition::Discarded(_) => self.discarded += 1,
            SignalDisposition::RetryScheduled { .. } => self.retries += 1,
            SignalDisposition::Failed(_) => self.failed += 1,
        }
    }
}

/// Receiving half plus the pending counter.
pub struct SignalBus {
    sink: ChannelSignalBus,
    rx: mpsc::UnboundedReceiver<PhaseSignal>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sink: ChannelSignalBus {
                tx,
                pending: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        }
    }

    /// A sender to hand to the executor builder.
    #[must_use]
    pub fn sink(&self) -> ChannelSignalBus {
        self.sink.clone()
    }

    /// Signals emitted but not yet handled, including delayed ones.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sink.pending.load(Ordering::SeqCst)
    }

    /// Deliver signals to `coordinator` one at a time until none are pending.
    ///
    /// Handler errors are logged and counted; the loop keeps going.
    pub async fn drain(&mut self, coordinator: &Coordinator) -> DrainReport {
        let mut report = DrainReport::default();
        while self.pending() > 0 {
            let Some(signal) = self.rx.recv().await else {
                break;
            };
            report.delivered += 1;
            match coordinator.handle_signal(&signal).await {
                Ok(disposition) => report.count(&disposition),
                Err(e) => {
                    warn!(signal = %signal, error = %e, "Phase signal handling failed");
                    report.errors += 1;
                }
            }
            self.sink.pending.fetch_sub(1, Ordering::SeqCst);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syllabus_logic::Artifacts;
    use syllabus_utils::types::{PhaseId, WorkflowId};

    fn signal(attempt: u32) -> PhaseSignal {
        PhaseSignal::new(
            WorkflowId::parse("w1").unwrap(),
            PhaseId::ExpandQuery,
            attempt,
            &Artifacts::default(),
        )
    }

    #[tokio::test]
    async fn test_pending_counts_delayed_signals() {
        let mut bus = SignalBus::new();
        let sink = bus.sink();
        sink.emit(signal(1), Duration::ZERO).await.unwrap();
        sink.emit(signal(2), Duration::from_millis(20)).await.unwrap();
        assert_eq!(bus.pending(), 2);

        assert_eq!(bus.rx.recv().await.unwrap().attempt, 1);
        assert_eq!(bus.rx.recv().await.unwrap().attempt, 2);
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_signals() {
        let bus = SignalBus::new();
        let sink = bus.sink();
        drop(bus);

        let err = sink.emit(signal(1), Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, EffectError::Unavailable(_)));
    }
}
