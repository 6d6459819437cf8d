//! Command executor and its builder.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use syllabus_config::ExecutorSettings;
use syllabus_interceptors::{Context, Handler, Middleware, MiddlewareChain};
use syllabus_logic::{AdapterKind, Command, CommandKind, EffectOutput};
use syllabus_utils::error::ExecutorError;
use syllabus_utils::types::Fault;

use crate::adapters::{
    InferenceAdapter, InferenceRequest, Notice, NoticeLevel, NotificationAdapter,
    PersistenceAdapter, RetrievalAdapter, SignalSink,
};
use crate::middleware::{ErrorBoundary, Observability, Retry, UsageAccounting, UsageMeter};
use crate::observer::{ExecutionObserver, TracingObserver};

/// Result of executing one command.
pub type CommandResult = Result<EffectOutput, Fault>;

/// Middleware over commands.
pub type CommandMiddleware = Arc<dyn Middleware<Command, CommandResult>>;

/// Base handler: one adapter per family, dispatched by exhaustive match.
struct AdapterSet {
    inference: Arc<dyn InferenceAdapter>,
    retrieval: Arc<dyn RetrievalAdapter>,
    persistence: Arc<dyn PersistenceAdapter>,
    signals: Arc<dyn SignalSink>,
    notifications: Arc<dyn NotificationAdapter>,
}

#[async_trait]
impl Handler<Command, CommandResult> for AdapterSet {
    async fn call(&self, cmd: &Command, _ctx: &mut Context) -> CommandResult {
        let origin = cmd.kind().as_str();
        match cmd {
            Command::InvokeInference {
                purpose,
                prompt,
                max_tokens,
            } => {
                let reply = self
                    .inference
                    .infer(InferenceRequest {
                        purpose: purpose.clone(),
                        prompt: prompt.clone(),
                        max_tokens: *max_tokens,
                    })
                    .await
                    .map_err(|e| e.to_fault(origin))?;
                Ok(EffectOutput::Inference {
                    text: reply.text,
                    usage: reply.usage,
                })
            }
            Command::Search { query, limit } => {
                let hits = self
                    .retrieval
                    .search(query, *limit)
                    .await
                    .map_err(|e| e.to_fault(origin))?;
                Ok(EffectOutput::Search { hits })
            }
            Command::PersistRecord {
                collection,
                key,
                document,
            } => {
                let key = self
                    .persistence
                    .persist(collection, key, document)
                    .await
                    .map_err(|e| e.to_fault(origin))?;
                Ok(EffectOutput::Persisted { key })
            }
            Command::EmitPhaseSignal { signal, delay_ms } => {
                self.signals
                    .emit(signal.clone(), Duration::from_millis(*delay_ms))
                    .await
                    .map_err(|e| e.to_fault(origin))?;
                Ok(EffectOutput::SignalEmitted)
            }
            Command::Notify { channel, message } => {
                self.notifications
                    .notify(Notice {
                        channel: channel.clone(),
                        level: NoticeLevel::Info,
                        message: message.clone(),
                    })
                    .await
                    .map_err(|e| e.to_fault(origin))?;
                Ok(EffectOutput::Notified)
            }
            Command::ShowError { message } => {
                self.notifications
                    .notify(Notice {
                        channel: Notice::ERROR_CHANNEL.to_string(),
                        level: NoticeLevel::Error,
                        message: message.clone(),
                    })
                    .await
                    .map_err(|e| e.to_fault(origin))?;
                Ok(EffectOutput::Notified)
            }
        }
    }
}

/// Runs commands against effect adapters through the middleware chain.
///
/// Constructed once at startup and shared by reference (or `Arc`) with
/// everything that executes commands.
pub struct CommandExecutor {
    chain: MiddlewareChain<Command, CommandResult>,
    meter: Arc<UsageMeter>,
}

impl CommandExecutor {
    #[must_use]
    pub fn builder() -> CommandExecutorBuilder {
        CommandExecutorBuilder::default()
    }

    /// Execute one command.
    ///
    /// # Errors
    ///
    /// Returns the typed [`Fault`] produced by the adapter or a middleware.
    /// Panics inside adapters surface as `Internal` faults.
    pub async fn execute(&self, cmd: &Command, ctx: &mut Context) -> CommandResult {
        self.chain.execute(cmd, ctx).await
    }

    /// Execute a command with a fresh context.
    ///
    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn run(&self, cmd: &Command) -> CommandResult {
        self.execute(cmd, &mut Context::new()).await
    }

    /// Metered usage consumed through this executor.
    #[must_use]
    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    /// Middleware names, outermost first.
    pub fn middleware_names(&self) -> impl Iterator<Item = &str> {
        self.chain.names()
    }
}

/// Builder for [`CommandExecutor`].
#[derive(Default)]
pub struct CommandExecutorBuilder {
    inference: Option<Arc<dyn InferenceAdapter>>,
    retrieval: Option<Arc<dyn RetrievalAdapter>>,
    persistence: Option<Arc<dyn PersistenceAdapter>>,
    signals: Option<Arc<dyn SignalSink>>,
    notifications: Option<Arc<dyn NotificationAdapter>>,
    observer: Option<Arc<dyn ExecutionObserver>>,
    inference_budget: Option<u32>,
    retry: Option<Retry>,
    middleware: Vec<CommandMiddleware>,
}

impl CommandExecutorBuilder {
    #[must_use]
    pub fn inference(mut self, adapter: Arc<dyn InferenceAdapter>) -> Self {
        self.inference = Some(adapter);
        self
    }

    #[must_use]
    pub fn retrieval(mut self, adapter: Arc<dyn RetrievalAdapter>) -> Self {
        self.retrieval = Some(adapter);
        self
    }

    #[must_use]
    pub fn persistence(mut self, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        self.persistence = Some(adapter);
        self
    }

    #[must_use]
    pub fn signals(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.signals = Some(sink);
        self
    }

    #[must_use]
    pub fn notifications(mut self, adapter: Arc<dyn NotificationAdapter>) -> Self {
        self.notifications = Some(adapter);
        self
    }

    /// Where execution records go. Defaults to [`TracingObserver`].
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Limit on metered inference calls. Unlimited when not set.
    #[must_use]
    pub fn inference_budget(mut self, limit: u32) -> Self {
        self.inference_budget = Some(limit);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: Retry) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Apply budget and retry policy from configuration.
    ///
    /// Retries cover inference, search and signal emission; a zero
    /// `retry_attempts` disables the retry middleware.
    #[must_use]
    pub fn settings(mut self, settings: &ExecutorSettings) -> Self {
        self.inference_budget = Some(settings.inference_budget);
        self.retry = (settings.retry_attempts > 0).then(|| {
            Retry::new(settings.retry_attempts, settings.retry_delay()).for_kinds([
                CommandKind::InvokeInference,
                CommandKind::Search,
                CommandKind::EmitPhaseSignal,
            ])
        });
        self
    }

    /// Add a middleware inside the standard chain. Later calls nest deeper.
    #[must_use]
    pub fn middleware(mut self, middleware: CommandMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    fn is_bound(&self, adapter: AdapterKind) -> bool {
        match adapter {
            AdapterKind::Inference => self.inference.is_some(),
            AdapterKind::Retrieval => self.retrieval.is_some(),
            AdapterKind::Persistence => self.persistence.is_some(),
            AdapterKind::Signal => self.signals.is_some(),
            AdapterKind::Notification => self.notifications.is_some(),
        }
    }

    /// Build the executor.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::MissingAdapter` for the first command kind
    /// whose adapter family was not registered.
    pub fn build(self) -> Result<CommandExecutor, ExecutorError> {
        for kind in CommandKind::ALL {
            if !self.is_bound(kind.adapter()) {
                return Err(missing(kind));
            }
        }

        let adapters = AdapterSet {
            inference: self.inference.ok_or_else(|| missing(CommandKind::InvokeInference))?,
            retrieval: self.retrieval.ok_or_else(|| missing(CommandKind::Search))?,
            persistence: self.persistence.ok_or_else(|| missing(CommandKind::PersistRecord))?,
            signals: self.signals.ok_or_else(|| missing(CommandKind::EmitPhaseSignal))?,
            notifications: self.notifications.ok_or_else(|| missing(CommandKind::Notify))?,
        };

        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver));
        let meter = Arc::new(UsageMeter::new(self.inference_budget));

        let mut chain: Vec<CommandMiddleware> = vec![
            Arc::new(ErrorBoundary::new(observer.clone())),
            Arc::new(Observability::new(observer)),
        ];
        if let Some(retry) = self.retry {
            chain.push(Arc::new(retry));
        }
        chain.push(Arc::new(UsageAccounting::new(meter.clone())));
        chain.extend(self.middleware);

        debug!(
            middleware = chain.len(),
            budget = ?self.inference_budget,
            "Command executor built"
        );

        Ok(CommandExecutor {
            chain: MiddlewareChain::new(Arc::new(adapters), chain),
            meter,
        })
    }
}

fn missing(kind: CommandKind) -> ExecutorError {
    ExecutorError::MissingAdapter {
        command: kind.as_str().to_string(),
        adapter: kind.adapter().as_str().to_string(),
    }
}
