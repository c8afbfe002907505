//! Batch configuration
//!
//! Tunables shared by every chunk-oriented step of a process. They are read
//! once at startup, validated, then passed by reference to the step builders.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::BatchError;

/// Default number of items per chunk (one transaction per chunk).
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Default size of the fixed worker pool.
pub const DEFAULT_THREADS_COUNT: usize = 10;

/// Lightweight per-item tasks are used unless disabled.
pub const DEFAULT_VIRTUAL_THREADS_ENABLED: bool = true;

pub const CHUNK_SIZE_ENV: &str = "BATCH_CHUNK_SIZE";
pub const PAGE_SIZE_ENV: &str = "BATCH_PAGE_SIZE";
pub const THREADS_COUNT_ENV: &str = "BATCH_THREADS_COUNT";
pub const VIRTUAL_THREADS_ENABLED_ENV: &str = "BATCH_VIRTUAL_THREADS_ENABLED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per transactional chunk
    pub chunk_size: usize,
    /// Records fetched per page query, defaults to the chunk size
    pub page_size: usize,
    /// Worker pool size when virtual threads are disabled
    pub threads_count: usize,
    /// Use one lightweight task per item instead of a fixed pool
    pub virtual_threads_enabled: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_size: DEFAULT_CHUNK_SIZE,
            threads_count: DEFAULT_THREADS_COUNT,
            virtual_threads_enabled: DEFAULT_VIRTUAL_THREADS_ENABLED,
        }
    }
}

impl BatchConfig {
    /// Load configuration from the environment (and a `.env` file if present).
    pub fn from_env() -> Result<Self, BatchError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value lookup, falling back to defaults
    /// for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chunk_size = parse_or(&lookup, CHUNK_SIZE_ENV, DEFAULT_CHUNK_SIZE)?;

        let config = BatchConfig {
            chunk_size,
            page_size: parse_or(&lookup, PAGE_SIZE_ENV, chunk_size)?,
            threads_count: parse_or(&lookup, THREADS_COUNT_ENV, DEFAULT_THREADS_COUNT)?,
            virtual_threads_enabled: parse_or(
                &lookup,
                VIRTUAL_THREADS_ENABLED_ENV,
                DEFAULT_VIRTUAL_THREADS_ENABLED,
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(
                "chunk size must be greater than 0".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(BatchError::Configuration(
                "page size must be greater than 0".to_string(),
            ));
        }

        if self.threads_count == 0 {
            return Err(BatchError::Configuration(
                "threads count must be greater than 0".to_string(),
            ));
        }

        if self.threads_count > Semaphore::MAX_PERMITS {
            return Err(BatchError::Configuration(format!(
                "threads count must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, BatchError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|err| {
            BatchError::Configuration(format!("invalid value {:?} for {}: {}", raw, key, err))
        }),
        None => Ok(default),
    }
}
