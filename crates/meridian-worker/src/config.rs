//! Worker configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;

use meridian_audit::TopicConfig;
use meridian_core::category::EventCategory;
use meridian_log::config::DEFAULT_MAX_ATTEMPTS;

use crate::error::AppError;

/// Where the indexing role keeps search documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchIndexBackend {
    /// `search_documents` table in the event store database.
    Postgres,
    /// Process memory; documents are lost on restart.
    InMemory,
}

impl FromStr for SearchIndexBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::InMemory),
            other => Err(AppError::Config(format!(
                "MERIDIAN_SEARCH_INDEX must be postgres or memory, got {other:?}"
            ))),
        }
    }
}

/// Settings the worker reads at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// PostgreSQL connection string; absent in in-memory mode.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Use the in-memory store and log instead of PostgreSQL and Kafka.
    pub in_memory: bool,
    pub search_index: SearchIndexBackend,
    /// Kafka bootstrap servers; absent means the in-memory log.
    pub kafka_brokers: Option<String>,
    pub namespace: String,
    pub env: String,
    /// Per-category topic names that replace the derived defaults.
    pub topic_overrides: Vec<(EventCategory, String)>,
    pub dead_letter_topic: Option<String>,
    pub max_attempts: u32,
    /// Also dispatch events received from the log to local handlers.
    pub remote_dispatch: bool,
    /// OTLP gRPC endpoint; tracing export is off when absent.
    pub otlp_endpoint: Option<String>,
}

impl WorkerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a variable is missing or invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a variable is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let in_memory = parse_bool(get("MERIDIAN_IN_MEMORY").as_deref(), "MERIDIAN_IN_MEMORY")?;
        let database_url = get("DATABASE_URL");
        if !in_memory && database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL environment variable must be set unless MERIDIAN_IN_MEMORY=true"
                    .into(),
            ));
        }

        let search_index = match get("MERIDIAN_SEARCH_INDEX") {
            Some(value) => value.parse()?,
            None if in_memory => SearchIndexBackend::InMemory,
            None => SearchIndexBackend::Postgres,
        };
        if in_memory && search_index == SearchIndexBackend::Postgres {
            return Err(AppError::Config(
                "MERIDIAN_SEARCH_INDEX=postgres needs a database; unset MERIDIAN_IN_MEMORY".into(),
            ));
        }

        let kafka_brokers = if in_memory { None } else { get("KAFKA_BROKERS") };
        if kafka_brokers.is_some() && !cfg!(feature = "kafka") {
            return Err(AppError::Config(
                "KAFKA_BROKERS is set but the worker was built without the kafka feature".into(),
            ));
        }

        let topic_overrides = EventCategory::ALL
            .iter()
            .filter_map(|&category| {
                get(&format!("MERIDIAN_TOPIC_{}", category.as_str())).map(|topic| (category, topic))
            })
            .collect();

        let config = Self {
            database_url,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or("PORT", get("PORT"), 3000)?,
            in_memory,
            search_index,
            kafka_brokers,
            namespace: get("MERIDIAN_NAMESPACE").unwrap_or_else(|| "meridian".to_owned()),
            env: get("MERIDIAN_ENV").unwrap_or_else(|| "dev".to_owned()),
            topic_overrides,
            dead_letter_topic: get("MERIDIAN_TOPIC_DEAD_LETTER"),
            max_attempts: parse_or(
                "MERIDIAN_CONSUMER_MAX_ATTEMPTS",
                get("MERIDIAN_CONSUMER_MAX_ATTEMPTS"),
                DEFAULT_MAX_ATTEMPTS,
            )?
            .max(1),
            remote_dispatch: parse_bool(
                get("MERIDIAN_REMOTE_DISPATCH").as_deref(),
                "MERIDIAN_REMOTE_DISPATCH",
            )?,
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        };
        config
            .topics()
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Address the HTTP server binds to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// Topic names with the configured overrides applied.
    #[must_use]
    pub fn topics(&self) -> TopicConfig {
        let mut topics = TopicConfig::new(&self.namespace, &self.env);
        for (category, topic) in &self.topic_overrides {
            topics = topics.with_topic(*category, topic.clone());
        }
        if let Some(dead_letter) = &self.dead_letter_topic {
            topics = topics.with_dead_letter(dead_letter.clone());
        }
        topics
    }
}

fn parse_bool(value: Option<&str>, key: &str) -> Result<bool, AppError> {
    match value.map(str::trim) {
        None => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(AppError::Config(format!("{key} must be true or false, got {v:?}"))),
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| {
        v.trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}")))
    })
}
