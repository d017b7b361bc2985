//! Demuxer configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DemuxError, Result};
use crate::types::{LogLevel, SeekFlag};

/// Logging configuration for binaries embedding the demuxer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter used when RUST_LOG is unset (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "demux_stream=debug".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Demuxer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxerConfig {
    /// Name of the worker thread hosting the engine
    pub worker_thread_name: String,

    /// Per-request response timeout for single-result queries; none waits forever
    pub request_timeout_ms: Option<u64>,

    /// Seek flag used by the convenience methods when the caller gives none
    pub default_seek_flag: SeekFlag,

    /// Engine log level applied when the worker starts
    pub engine_log_level: LogLevel,

    /// Engine resources passed along with the first load
    pub engine_asset_path: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            worker_thread_name: "demux-worker".to_string(),
            request_timeout_ms: None,
            default_seek_flag: SeekFlag::Backward,
            engine_log_level: LogLevel::Warning,
            engine_asset_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl DemuxerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DemuxError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| DemuxError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DemuxerConfig::default();
        assert_eq!(config.worker_thread_name, "demux-worker");
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.default_seek_flag, SeekFlag::Backward);
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demux.toml");

        let config = DemuxerConfig {
            request_timeout_ms: Some(2500),
            engine_log_level: LogLevel::Debug,
            engine_asset_path: Some(PathBuf::from("/opt/engine")),
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let loaded = DemuxerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.request_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(loaded.engine_log_level, LogLevel::Debug);
        assert_eq!(loaded.engine_asset_path, Some(PathBuf::from("/opt/engine")));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "default_seek_flag = \"forward\"\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = DemuxerConfig::from_file(&path).unwrap();
        assert_eq!(config.default_seek_flag, SeekFlag::Forward);
        assert!(config.logging.is_json());
        assert_eq!(config.logging.level, "demux_stream=debug");
        assert_eq!(config.worker_thread_name, "demux-worker");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "request_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(
            DemuxerConfig::from_file(&path),
            Err(DemuxError::Config(_))
        ));
    }
}
