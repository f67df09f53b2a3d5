//! Process wiring.
//!
//! Builds the store, the log, the handler registry and the bus once at
//! start-up, and spawns one task per consumer role.

use std::sync::Arc;

use meridian_audit::{LogIntegrationService, TopicConfig};
use meridian_consumers::{
    ComplianceMonitor, DistributedDispatch, DocumentIndex, IndexingConsumer,
    InMemoryDocumentIndex, LoggingRemediationHook, PgDocumentIndex, ReportingConsumer,
};
use meridian_core::category::EventCategory;
use meridian_core::log::{EventLog, LogConsumer};
use meridian_core::repository::EventStore;
use meridian_event_store::{InMemoryEventStore, PgEventStore};
use meridian_eventbus::{EventBus, EventProcessor, HandlerRegistry, RetryCountingErrorHandler};
use meridian_log::{ConsumerConfig, ConsumerRunner, InMemoryLog, MessageHandler};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{SearchIndexBackend, WorkerConfig};
use crate::error::AppError;
use crate::read_model::AssetRegisterProjection;

/// Where records are produced to and consumed from.
#[derive(Debug, Clone)]
pub enum LogBackend {
    InMemory(InMemoryLog),
    #[cfg(feature = "kafka")]
    Kafka(meridian_log::KafkaConfig),
}

impl LogBackend {
    fn producer(&self) -> Result<Arc<dyn EventLog>, AppError> {
        match self {
            Self::InMemory(log) => Ok(Arc::new(log.clone())),
            #[cfg(feature = "kafka")]
            Self::Kafka(kafka) => Ok(Arc::new(meridian_log::KafkaEventLog::new(kafka)?)),
        }
    }

    fn consumer(&self, config: &ConsumerConfig) -> Result<Arc<dyn LogConsumer>, AppError> {
        match self {
            Self::InMemory(log) => Ok(Arc::new(
                log.consumer(config.group_id.clone(), config.topics.clone()),
            )),
            #[cfg(feature = "kafka")]
            Self::Kafka(kafka) => Ok(Arc::new(meridian_log::KafkaLogConsumer::new(
                kafka, config,
            )?)),
        }
    }
}

fn in_memory_index() -> Arc<dyn DocumentIndex> {
    tracing::warn!("using in-memory search index; documents are lost on restart");
    Arc::new(InMemoryDocumentIndex::new())
}

/// Everything the worker runs, built once.
pub struct Services {
    pub config: WorkerConfig,
    pub topics: TopicConfig,
    pub store: Arc<dyn EventStore>,
    pub log: LogBackend,
    pub producer: Arc<dyn EventLog>,
    pub processor: Arc<EventProcessor>,
    pub bus: Arc<EventBus>,
    pub assets: Arc<AssetRegisterProjection>,
    pub index: Arc<dyn DocumentIndex>,
    pub reporting: Arc<ReportingConsumer>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("topics", &self.topics)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// Connects to the configured store and log and wires the bus.
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the database cannot be reached or migrated, or
    /// a log client cannot be created.
    pub async fn build(config: WorkerConfig) -> Result<Self, AppError> {
        let pool = match (&config.database_url, config.in_memory) {
            (Some(url), false) => {
                let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
                sqlx::migrate!("../../migrations").run(&pool).await?;
                tracing::info!("connected to PostgreSQL event store");
                Some(pool)
            }
            _ => None,
        };

        let (store, transactional): (Arc<dyn EventStore>, Option<PgEventStore>) = match &pool {
            Some(pool) => {
                let pg = PgEventStore::new(pool.clone());
                (Arc::new(pg.clone()), Some(pg))
            }
            None => {
                tracing::warn!("using in-memory event store; events are lost on restart");
                (Arc::new(InMemoryEventStore::new()), None)
            }
        };

        let index: Arc<dyn DocumentIndex> = match (config.search_index, pool) {
            (SearchIndexBackend::Postgres, Some(pool)) => Arc::new(PgDocumentIndex::new(pool)),
            (SearchIndexBackend::Postgres, None) => {
                return Err(AppError::Config(
                    "postgres search index requested without a database".into(),
                ));
            }
            (SearchIndexBackend::InMemory, _) => in_memory_index(),
        };

        let log = match &config.kafka_brokers {
            #[cfg(feature = "kafka")]
            Some(brokers) => LogBackend::Kafka(meridian_log::KafkaConfig::new(brokers.clone())),
            _ => LogBackend::InMemory(InMemoryLog::new()),
        };

        Self::wire(config, store, transactional, index, log)
    }

    /// Wires the bus over an existing store and log, with an in-memory
    /// search index.
    ///
    /// # Errors
    ///
    /// Returns `AppError` if a log client cannot be created.
    pub fn with_backends(
        config: WorkerConfig,
        store: Arc<dyn EventStore>,
        log: LogBackend,
    ) -> Result<Self, AppError> {
        Self::wire(config, store, None, in_memory_index(), log)
    }

    fn wire(
        config: WorkerConfig,
        store: Arc<dyn EventStore>,
        transactional: Option<PgEventStore>,
        index: Arc<dyn DocumentIndex>,
        log: LogBackend,
    ) -> Result<Self, AppError> {
        let topics = config.topics();
        let producer = log.producer()?;

        let assets = Arc::new(AssetRegisterProjection::new());
        let mut registry = HandlerRegistry::new();
        assets.register(&mut registry);
        tracing::info!(
            handlers = registry.len(),
            event_types = ?registry.event_types(),
            "handler registry frozen"
        );

        let processor = Arc::new(EventProcessor::new(
            Arc::new(registry),
            Arc::clone(&store),
            Arc::new(RetryCountingErrorHandler::new(Arc::clone(&store))),
        ));
        let integration = Arc::new(LogIntegrationService::new(
            Arc::clone(&producer),
            topics.clone(),
        ));
        let mut bus = EventBus::new(Arc::clone(&store), Arc::clone(&processor), integration);
        if let Some(pg) = transactional {
            bus = bus.with_transactional_store(pg);
        }
        let bus = Arc::new(bus);

        Ok(Self {
            config,
            topics,
            store,
            log,
            producer,
            processor,
            bus,
            assets,
            index,
            reporting: Arc::new(ReportingConsumer::new()),
        })
    }

    fn consumer_config(&self, group: &str, categories: &[EventCategory]) -> ConsumerConfig {
        ConsumerConfig::new(
            format!("{}.{group}", self.config.namespace),
            self.topics.topics_for(categories),
            self.topics.dead_letter(),
        )
        .with_max_attempts(self.config.max_attempts)
    }

    /// Consumer roles with their configurations.
    fn roles(&self) -> Vec<(ConsumerConfig, Arc<dyn MessageHandler>)> {
        let mut roles: Vec<(ConsumerConfig, Arc<dyn MessageHandler>)> = Vec::new();
        let compliance = ComplianceMonitor::new(
            Arc::clone(&self.store),
            Arc::new(LoggingRemediationHook),
        );
        roles.push((
            self.consumer_config("compliance-monitor", &[EventCategory::Compliance]),
            Arc::new(compliance) as Arc<dyn MessageHandler>,
        ));
        roles.push((
            self.consumer_config("indexing", &EventCategory::ALL),
            Arc::new(IndexingConsumer::new(Arc::clone(&self.index))) as Arc<dyn MessageHandler>,
        ));
        roles.push((
            self.consumer_config("reporting", &EventCategory::ALL),
            Arc::clone(&self.reporting) as Arc<dyn MessageHandler>,
        ));
        if self.config.remote_dispatch {
            roles.push((
                self.consumer_config("dispatch", &EventCategory::ALL),
                Arc::new(DistributedDispatch::new(Arc::clone(&self.processor)))
                    as Arc<dyn MessageHandler>,
            ));
        }
        roles
    }

    /// Spawns one task per consumer role; each stops when `shutdown` flips.
    ///
    /// # Errors
    ///
    /// Returns `AppError` if a consumer cannot be created.
    pub fn spawn_consumers(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, AppError> {
        self.roles()
            .into_iter()
            .map(|(config, handler)| {
                let consumer = self.log.consumer(&config)?;
                let runner =
                    ConsumerRunner::new(consumer, Arc::clone(&self.producer), handler, config);
                Ok(tokio::spawn(runner.run(shutdown.clone())))
            })
            .collect()
    }
}
