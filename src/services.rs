//! Wiring of the runtime components from a [`Config`].

use camino::Utf8PathBuf;
use std::sync::Arc;

use syllabus_config::{Config, StoreKind, StoreSettings};
use syllabus_coordinator::{Coordinator, DrainReport, SignalBus};
use syllabus_executor::offline::{
    LogNotifier, MemoryPersistence, OfflineInference, OfflineRetrieval,
};
use syllabus_executor::{CollectingObserver, CommandExecutor, FanoutObserver, TracingObserver};
use syllabus_store::{FileRecordStore, MemoryRecordStore, RecordStore};
use syllabus_utils::SyllabusError;
use syllabus_utils::error::ConfigError;

/// Everything a CLI command needs, built once per invocation.
pub struct Services {
    pub executor: Arc<CommandExecutor>,
    pub coordinator: Coordinator,
    pub bus: SignalBus,
    pub observer: Arc<CollectingObserver>,
    pub documents: Arc<MemoryPersistence>,
}

impl Services {
    /// Offline adapters, the configured record store and a local signal bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the executor is
    /// missing an adapter.
    pub fn offline(config: &Config) -> Result<Self, SyllabusError> {
        let store = open_store(&config.store)?;
        let bus = SignalBus::new();
        let observer = Arc::new(CollectingObserver::new());
        let documents = Arc::new(MemoryPersistence::new());

        let executor = CommandExecutor::builder()
            .inference(Arc::new(OfflineInference))
            .retrieval(Arc::new(OfflineRetrieval))
            .persistence(documents.clone())
            .signals(Arc::new(bus.sink()))
            .notifications(Arc::new(LogNotifier))
            .observer(Arc::new(
                FanoutObserver::new()
                    .with(Arc::new(TracingObserver))
                    .with(observer.clone()),
            ))
            .settings(&config.executor)
            .build()?;
        let executor = Arc::new(executor);

        let coordinator = Coordinator::new(store, executor.clone(), config.coordinator.clone());
        Ok(Self {
            executor,
            coordinator,
            bus,
            observer,
            documents,
        })
    }

    /// Deliver pending signals until the bus is idle.
    pub async fn drain(&mut self) -> DrainReport {
        self.bus.drain(&self.coordinator).await
    }
}

/// Open the record store named by the configuration.
///
/// # Errors
///
/// Returns an error if a file store has no usable directory or cannot be
/// created.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn RecordStore>, SyllabusError> {
    match settings.kind {
        StoreKind::Memory => Ok(Arc::new(MemoryRecordStore::new())),
        StoreKind::File => {
            let dir = settings.dir.clone().ok_or_else(|| ConfigError::InvalidValue {
                key: "store.dir".to_string(),
                value: "required when store.kind = \"file\"".to_string(),
            })?;
            let dir = Utf8PathBuf::from_path_buf(dir).map_err(|p| ConfigError::InvalidValue {
                key: "store.dir".to_string(),
                value: format!("{} is not valid UTF-8", p.display()),
            })?;
            Ok(Arc::new(FileRecordStore::open(dir)?))
        }
    }
}
