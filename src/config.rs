//! Environment-driven configuration for the two services.
//!
//! Every `SF_*` variable that has no default is required; a missing one is a
//! startup failure, not a runtime error.

use crate::error::{Error, Result};
use sqlx::postgres::PgConnectOptions;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_RELAY_HOST: &str = "bsky.network";
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_BATCH_INTERVAL: f64 = 0.5;
const DEFAULT_BATCH_POSTPONE: f64 = 0.5;
const DEFAULT_BATCH_WAIT: f64 = 4.0;
const DEFAULT_BATCH_SIZE: i64 = 10;

/// Connection parameters for the shared relational store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub pass: String,
}

impl DbConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: required("SF_DB_HOST")?,
            port: required("SF_DB_PORT")?
                .parse()
                .map_err(|_| Error::InvalidEnv("SF_DB_PORT"))?,
            name: required("SF_DB_NAME")?,
            user: required("SF_DB_USER")?,
            pass: required("SF_DB_PASS")?,
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.pass)
    }
}

/// Configuration for the firehose ingestion service.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Relay to subscribe to for `com.atproto.sync.subscribeRepos`.
    pub relay_host: String,
    /// Capacity of the admission queue; the handler blocks when it is full.
    pub queue_capacity: usize,
}

impl StreamConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            relay_host: optional("SF_RELAY_HOST").unwrap_or_else(|| DEFAULT_RELAY_HOST.into()),
            queue_capacity: parsed_or("SF_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
        })
    }
}

/// Cadence knobs for the batch scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum time between batch starts.
    pub batch_interval: Duration,
    /// Sleep when the cadence is not yet due.
    pub batch_postpone: Duration,
    /// Sleep after the selector returned an empty batch.
    pub batch_wait: Duration,
    /// Maximum number of posts pulled per batch.
    pub batch_size: i64,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            batch_interval: seconds_or("SF_BATCH_INTERVAL", DEFAULT_BATCH_INTERVAL)?,
            batch_postpone: seconds_or("SF_BATCH_POSTPONE", DEFAULT_BATCH_POSTPONE)?,
            batch_wait: seconds_or("SF_BATCH_WAIT", DEFAULT_BATCH_WAIT)?,
            batch_size: parsed_or("SF_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
        })
    }
}

/// Configuration for the post-processing service.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Root directory of the on-disk image archive.
    pub images_dir: PathBuf,
    pub bsky_user: String,
    pub bsky_pass: String,
    pub scheduler: SchedulerConfig,
}

impl ProcessConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            images_dir: PathBuf::from(required("SF_DB_IMAGES_DIR")?),
            bsky_user: required("SF_BSKY_USER")?,
            bsky_pass: required("SF_BSKY_PASS")?,
            scheduler: SchedulerConfig::from_env()?,
        })
    }
}

fn required(name: &'static str) -> Result<String> {
    env::var(name).map_err(|_| Error::MissingEnv(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn parsed_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T> {
    match optional(name) {
        Some(value) => value.parse().map_err(|_| Error::InvalidEnv(name)),
        None => Ok(default),
    }
}

fn seconds_or(name: &'static str, default: f64) -> Result<Duration> {
    let seconds: f64 = parsed_or(name, default)?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::InvalidEnv(name));
    }
    Ok(Duration::from_secs_f64(seconds))
}
