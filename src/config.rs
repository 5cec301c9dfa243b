//! Runtime Configuration
//!
//! All settings come from the process environment. Only the queue and table
//! identifiers are required; without them the pipeline has nothing to read from
//! or write to, so their absence aborts startup. Everything else has a default.

use crate::error::ConfigError;

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound imposed by the queue backend on a single send or receive call.
pub const QUEUE_BATCH_LIMIT: usize = 10;

pub const DEFAULT_POPULAR_STYLES: &str = "traditional,realism,blackwork,japanese,fineline";
pub const DEFAULT_PRIORITY_LOCATIONS: &str = "manchester,birmingham,leeds,glasgow,bristol";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue_url: String,
    pub table_name: String,
    pub store_endpoint: String,
    pub store_partitions: u32,
    pub search_endpoint: String,
    pub search_index: String,

    pub max_messages_per_poll: usize,
    pub visibility_timeout: Duration,
    pub poll_wait: Duration,
    pub queue_max_receive_count: u32,

    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown: Duration,
    pub stream_max_retries: u32,
    pub stream_batch_size: usize,

    pub source_timeout: Duration,
    pub scrape_timeout: Duration,
    pub store_timeout: Duration,
    pub index_timeout: Duration,
    pub queue_timeout: Duration,

    pub worker_count: usize,
    pub shard_count: u32,
    pub popular_styles: HashSet<String>,
    pub priority_locations: HashSet<String>,
    pub bind_addr: String,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values are
    /// treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_messages_per_poll: usize = parse_or(&get, "MAX_MESSAGES_PER_POLL", QUEUE_BATCH_LIMIT)?;
        if !(1..=QUEUE_BATCH_LIMIT).contains(&max_messages_per_poll) {
            return Err(ConfigError::Invalid {
                key: "MAX_MESSAGES_PER_POLL",
                value: max_messages_per_poll.to_string(),
                reason: format!("must be between 1 and {}", QUEUE_BATCH_LIMIT),
            });
        }

        let config = Self {
            queue_url: get("QUEUE_URL").ok_or(ConfigError::Missing("QUEUE_URL"))?,
            table_name: get("TABLE_NAME").ok_or(ConfigError::Missing("TABLE_NAME"))?,
            store_endpoint: get("STORE_ENDPOINT").unwrap_or_else(|| "memory://".to_string()),
            store_partitions: at_least_one(&get, "STORE_PARTITIONS", 4)?,
            search_endpoint: get("SEARCH_ENDPOINT").unwrap_or_else(|| "memory://".to_string()),
            search_index: get("SEARCH_INDEX").unwrap_or_else(|| "artists".to_string()),

            max_messages_per_poll,
            visibility_timeout: Duration::from_secs(parse_or(&get, "VISIBILITY_TIMEOUT_SECS", 30)?),
            poll_wait: Duration::from_secs(parse_or(&get, "POLL_WAIT_SECS", 20)?),
            queue_max_receive_count: at_least_one(&get, "QUEUE_MAX_RECEIVE_COUNT", 3)?,

            circuit_breaker_threshold: at_least_one(&get, "CIRCUIT_BREAKER_THRESHOLD", 5)?,
            circuit_breaker_cooldown: Duration::from_secs(parse_or(
                &get,
                "CIRCUIT_BREAKER_COOLDOWN_SECS",
                30,
            )?),
            stream_max_retries: parse_or(&get, "STREAM_MAX_RETRIES", 3)?,
            stream_batch_size: at_least_one(&get, "STREAM_BATCH_SIZE", 100)?,

            source_timeout: Duration::from_millis(parse_or(&get, "SOURCE_TIMEOUT_MS", 10_000)?),
            scrape_timeout: Duration::from_millis(parse_or(&get, "SCRAPE_TIMEOUT_MS", 10_000)?),
            store_timeout: Duration::from_millis(parse_or(&get, "STORE_TIMEOUT_MS", 2_000)?),
            index_timeout: Duration::from_millis(parse_or(&get, "INDEX_TIMEOUT_MS", 2_000)?),
            queue_timeout: Duration::from_millis(parse_or(&get, "QUEUE_TIMEOUT_MS", 5_000)?),

            worker_count: at_least_one(&get, "WORKER_COUNT", 4)?,
            shard_count: at_least_one(&get, "SHARD_COUNT", 10)?,
            popular_styles: parse_list(
                &get("POPULAR_STYLES").unwrap_or_else(|| DEFAULT_POPULAR_STYLES.to_string()),
            ),
            priority_locations: parse_list(
                &get("PRIORITY_LOCATIONS").unwrap_or_else(|| DEFAULT_PRIORITY_LOCATIONS.to_string()),
            ),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
        };

        if !is_memory_endpoint(&config.store_endpoint) {
            return Err(ConfigError::Invalid {
                key: "STORE_ENDPOINT",
                value: config.store_endpoint,
                reason: "only the in-memory store (memory://) is available".to_string(),
            });
        }

        Ok(config)
    }

    pub fn uses_memory_search(&self) -> bool {
        is_memory_endpoint(&self.search_endpoint)
    }
}

fn is_memory_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("memory")
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn at_least_one<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + From<u8> + ToString,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value < T::from(1) {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

/// Comma separated list, lowercased, blanks dropped.
pub fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
