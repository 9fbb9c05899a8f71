//! Run profiles loaded from YAML, merged with command-line overrides.

use crate::batch::MessageTemplate;
use crate::event::Event;
use crate::transport::config::{parse_connect_kv, parse_engine};
use crate::transport::{ConnectOptions, Engine};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ENGINE: &str = "mqtt";
pub const DEFAULT_MESSAGES: u64 = 1000;
pub const DEFAULT_BATCH_LIMIT: u64 = 100;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MESSAGE: &str = "hub-bench";

/// Where the run's events come from.
#[derive(Debug, Clone)]
pub enum EventSource {
    Template(MessageTemplate),
    /// Replayed in order, wrapping to the start as often as needed
    Pool(Vec<Event>),
}

/// Fully resolved settings for one sender run.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub engine: Engine,
    pub connect: ConnectOptions,
    pub messages: u64,
    pub batch_limit: u64,
    pub workers: usize,
    pub source: EventSource,
    pub send_timeout: Option<Duration>,
    /// Cancels every in-flight send once elapsed
    pub run_timeout: Option<Duration>,
    pub snapshot_interval_secs: u64,
    pub output_file: Option<String>,
}

/// Every field is optional so a profile and CLI flags can be layered.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub engine: Option<String>,
    /// `key=value` connection parameters
    pub connect: Vec<String>,
    pub messages: Option<u64>,
    pub batch_limit: Option<u64>,
    pub workers: Option<usize>,
    pub message: Option<String>,
    /// `key=value` properties attached to synthesized events
    pub properties: Vec<String>,
    pub base64: Option<bool>,
    pub suffix: Option<bool>,
    /// JSONL file of events to replay instead of synthesizing
    pub events_file: Option<String>,
    pub send_timeout_ms: Option<u64>,
    pub run_timeout_secs: Option<u64>,
    pub csv: Option<String>,
}

impl RunConfig {
    pub fn from_yaml(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).context("invalid run profile")
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading run profile {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    /// Layer `over` on top of `self`. Scalars in `over` win; lists append.
    pub fn merge(mut self, over: RunConfig) -> Self {
        self.engine = over.engine.or(self.engine);
        self.connect.extend(over.connect);
        self.messages = over.messages.or(self.messages);
        self.batch_limit = over.batch_limit.or(self.batch_limit);
        self.workers = over.workers.or(self.workers);
        self.message = over.message.or(self.message);
        self.properties.extend(over.properties);
        self.base64 = over.base64.or(self.base64);
        self.suffix = over.suffix.or(self.suffix);
        self.events_file = over.events_file.or(self.events_file);
        self.send_timeout_ms = over.send_timeout_ms.or(self.send_timeout_ms);
        self.run_timeout_secs = over.run_timeout_secs.or(self.run_timeout_secs);
        self.csv = over.csv.or(self.csv);
        self
    }

    /// Apply defaults, validate, and load the replay pool if one is configured.
    pub async fn resolve(self, snapshot_interval_secs: u64) -> Result<SenderConfig> {
        let engine_name = self.engine.as_deref().unwrap_or(DEFAULT_ENGINE);
        let Some(engine) = parse_engine(engine_name) else {
            bail!("unknown engine: {engine_name}");
        };
        let batch_limit = self.batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT);
        if batch_limit == 0 {
            bail!("batch_limit must be greater than zero");
        }
        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            bail!("workers must be greater than zero");
        }

        let source = match self.events_file {
            Some(path) => {
                let pool = load_event_pool(&path).await?;
                if pool.is_empty() {
                    bail!("event pool {path} is empty");
                }
                EventSource::Pool(pool)
            }
            None => EventSource::Template(MessageTemplate {
                body: self.message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
                properties: self.properties,
                encode_base64: self.base64.unwrap_or(false),
                add_suffix: self.suffix.unwrap_or(false),
            }),
        };

        Ok(SenderConfig {
            engine,
            connect: parse_connect_kv(&self.connect),
            messages: self.messages.unwrap_or(DEFAULT_MESSAGES),
            batch_limit,
            workers,
            source,
            send_timeout: self.send_timeout_ms.map(Duration::from_millis),
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
            snapshot_interval_secs,
            output_file: self.csv,
        })
    }
}

/// Read one JSON event per line; blank lines are skipped.
pub async fn load_event_pool(path: &str) -> Result<Vec<Event>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading event pool {path}"))?;
    raw.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str::<Event>(l).with_context(|| format!("{path}:{}: bad event", i + 1))
        })
        .collect()
}
