// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration.
//!
//! Loaded from `<data_dir>/config.toml` when present; every field has a
//! default so a bare data directory works. `CLAUDIA_DATA_DIR` overrides
//! the root.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no home directory and no CLAUDIA_DATA_DIR set")]
    NoDataDir,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// One extension to launch at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionEntry {
    /// Launcher command, e.g. `["node"]`.
    pub launcher: Vec<String>,
    pub entrypoint: PathBuf,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// The file shape of `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    bind: Option<String>,
    agent_binary: Option<String>,
    agent_log_dir: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
    librarian_workspace: Option<PathBuf>,
    tts_endpoint: Option<String>,
    tts_voice: Option<String>,
    default_model: Option<String>,
    gap_minutes: Option<i64>,
    #[serde(default)]
    extensions: Vec<ExtensionEntry>,
}

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// WebSocket bind address.
    pub bind: String,
    pub agent_binary: String,
    /// Read-only tree of external agent session logs.
    pub agent_log_dir: PathBuf,
    /// Version-controlled directory the librarian commits into.
    pub artifact_dir: PathBuf,
    pub librarian_workspace: PathBuf,
    pub tts_endpoint: Option<String>,
    pub tts_voice: Option<String>,
    pub default_model: Option<String>,
    pub gap_minutes: i64,
    pub extensions: Vec<ExtensionEntry>,
}

impl Config {
    /// Load from the default data dir (`~/.claudia`, overridable with
    /// `CLAUDIA_DATA_DIR`).
    pub fn load() -> Result<Self, ConfigError> {
        let data_dir = match std::env::var_os("CLAUDIA_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => home_dir().ok_or(ConfigError::NoDataDir)?.join(".claudia"),
        };
        Self::load_from(&data_dir)
    }

    pub fn load_from(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join("config.toml");
        let file: FileConfig = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            })?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                source: e,
            })?
        } else {
            FileConfig::default()
        };

        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            bind: file.bind.unwrap_or_else(|| "127.0.0.1:4600".to_string()),
            agent_binary: file.agent_binary.unwrap_or_else(|| "claude".to_string()),
            agent_log_dir: file
                .agent_log_dir
                .unwrap_or_else(|| home.join(".claude").join("projects")),
            artifact_dir: file
                .artifact_dir
                .unwrap_or_else(|| data_dir.join("archive")),
            librarian_workspace: file
                .librarian_workspace
                .unwrap_or_else(|| data_dir.join("librarian")),
            tts_endpoint: file.tts_endpoint,
            tts_voice: file.tts_voice,
            default_model: file.default_model,
            gap_minutes: file.gap_minutes.unwrap_or(10),
            extensions: file.extensions,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("logs").join("gateway.log")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
