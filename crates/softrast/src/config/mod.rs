//! # Processor Configuration
//!
//! Configuration for the worker pool, loaded from a TOML file. Only the
//! `[processor]` section is consumed by this crate; unknown keys and unknown
//! sections are ignored so the same file can carry settings for outer layers.
//!
//! A file that is missing or fails to parse falls back to defaults with a
//! single warning, so a malformed configuration can never prevent rendering.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum number of worker threads the pool will create on its own.
pub const MAX_AUTO_WORKERS: usize = 16;

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

/// How worker threads are bound to the cores of the affinity mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffinityPolicy {
    /// A thread may run on any core of its allowed set.
    #[default]
    #[serde(alias = "anyof")]
    Any,
    /// A thread is pinned to exactly one core of its allowed set.
    #[serde(alias = "oneof")]
    One,
}

/// Worker-pool settings consumed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Number of worker threads; 0 selects `min(logical CPUs, 16)`.
    #[serde(alias = "ThreadCount")]
    pub thread_count: u32,
    /// Bitmask of cores workers may run on; 0 is invalid and falls back to
    /// all cores.
    #[serde(alias = "AffinityMask")]
    pub affinity_mask: u64,
    /// Binding policy for the affinity mask.
    #[serde(alias = "AffinityPolicy")]
    pub affinity_policy: AffinityPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            thread_count: 0,
            affinity_mask: u64::MAX,
            affinity_policy: AffinityPolicy::Any,
        }
    }
}

/// On-disk layout: the `[processor]` section plus whatever else the file has.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    processor: ProcessorConfig,
}

impl ProcessorConfig {
    /// Loads the `[processor]` section from a TOML file.
    ///
    /// Missing files, malformed TOML, and an all-zero affinity mask all fall
    /// back to defaults; each logs one warning.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let config = match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("failed to read {}: {err}; using defaults", path.display());
                Self::default()
            }
        };
        config.sanitized()
    }

    /// Loads the `[processor]` section from a TOML file without fallback.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(file.processor)
    }

    /// Replaces invalid settings with their documented fallbacks.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if self.affinity_mask == 0 {
            log::warn!("affinity mask is empty, using all-cores affinity");
            self.affinity_mask = u64::MAX;
        }
        self
    }

    /// The number of worker threads this configuration resolves to.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.thread_count == 0 {
            num_cpus::get().min(MAX_AUTO_WORKERS)
        } else {
            self.thread_count as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_all_cores() {
        let config = ProcessorConfig::default();
        assert_eq!(config.affinity_mask, u64::MAX);
        assert_eq!(config.affinity_policy, AffinityPolicy::Any);
        assert!(config.worker_count() >= 1);
        assert!(config.worker_count() <= MAX_AUTO_WORKERS);
    }

    #[test]
    fn parses_processor_section_and_ignores_unknown_keys() {
        let toml = r#"
            [processor]
            thread_count = 4
            affinity_mask = 15
            affinity_policy = "one"
            future_knob = "ignored"

            [window]
            width = 640
        "#;
        let file: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(file.processor.thread_count, 4);
        assert_eq!(file.processor.affinity_mask, 15);
        assert_eq!(file.processor.affinity_policy, AffinityPolicy::One);
    }

    #[test]
    fn accepts_legacy_key_spellings() {
        let toml = r#"
            [processor]
            ThreadCount = 2
            AffinityPolicy = "one"
        "#;
        let file: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(file.processor.thread_count, 2);
        assert_eq!(file.processor.affinity_policy, AffinityPolicy::One);
    }

    #[test]
    fn empty_affinity_mask_falls_back_to_all_cores() {
        let config = ProcessorConfig {
            affinity_mask: 0,
            ..ProcessorConfig::default()
        }
        .sanitized();
        assert_eq!(config.affinity_mask, u64::MAX);
    }

    #[test]
    fn explicit_thread_count_wins_over_auto() {
        let config = ProcessorConfig {
            thread_count: 3,
            ..ProcessorConfig::default()
        };
        assert_eq!(config.worker_count(), 3);
    }
}
