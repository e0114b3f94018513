// ABOUTME: Configuration management for dockmate
// Handles Docker connection settings, watch backoff, log window sizes and terminal shell choice

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Docker configuration
    #[serde(default)]
    pub docker: DockerConfig,

    /// Resource watch loops
    #[serde(default)]
    pub watch: WatchConfig,

    /// Container log backlog and follow settings
    #[serde(default)]
    pub logs: LogsConfig,

    /// Interactive terminal sessions
    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Publication channel
    #[serde(default)]
    pub publisher: PublisherConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Docker host connection string
    /// Examples:
    /// - unix:///var/run/docker.sock
    /// - tcp://localhost:2375
    pub host: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_docker_timeout")]
    pub timeout: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout: default_docker_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Pause before a watch loop stops itself after an event feed error (default: 2000ms)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl WatchConfig {
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Lines returned by a one-shot log fetch (default: 100)
    #[serde(default = "default_backlog_lines")]
    pub backlog_lines: usize,

    /// Lines replayed when a live follow starts (default: 10)
    #[serde(default = "default_follow_tail_lines")]
    pub follow_tail_lines: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            backlog_lines: default_backlog_lines(),
            follow_tail_lines: default_follow_tail_lines(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Shell used when the container has it (default: bash)
    #[serde(default = "default_preferred_shell")]
    pub preferred_shell: String,

    /// Shell used otherwise (default: sh)
    #[serde(default = "default_fallback_shell")]
    pub fallback_shell: String,

    /// Probe the container for the preferred shell before opening a session
    #[serde(default = "default_true")]
    pub probe_shell: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            preferred_shell: default_preferred_shell(),
            fallback_shell: default_fallback_shell(),
            probe_shell: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Buffered publications per subscriber before it starts skipping (default: 256)
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

const fn default_docker_timeout() -> u64 {
    60
}

const fn default_backoff_ms() -> u64 {
    2000
}

const fn default_backlog_lines() -> usize {
    100
}

const fn default_follow_tail_lines() -> usize {
    10
}

fn default_preferred_shell() -> String {
    "bash".to_string()
}

fn default_fallback_shell() -> String {
    "sh".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_capacity() -> usize {
    256
}

impl AppConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        for path in Self::get_config_paths().into_iter().rev() {
            if path.exists() {
                config.merge(Self::load_from_path(&path)?);
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Parse a single configuration file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get configuration file paths in order of precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".dockmate").join("config.toml"));
        }

        // 2. User config (~/.dockmate/config/config.toml)
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".dockmate").join("config").join("config.toml"));
        }

        // 3. System config
        paths.push(PathBuf::from("/etc/dockmate/config.toml"));

        paths
    }

    /// Merge another config into this one; values that differ from the defaults win
    fn merge(&mut self, other: Self) {
        let defaults = Self::default();

        if other.docker.host.is_some() {
            self.docker.host = other.docker.host;
        }
        if other.docker.timeout != defaults.docker.timeout {
            self.docker.timeout = other.docker.timeout;
        }
        if other.watch != defaults.watch {
            self.watch = other.watch;
        }
        if other.logs.backlog_lines != defaults.logs.backlog_lines {
            self.logs.backlog_lines = other.logs.backlog_lines;
        }
        if other.logs.follow_tail_lines != defaults.logs.follow_tail_lines {
            self.logs.follow_tail_lines = other.logs.follow_tail_lines;
        }
        if other.terminal != defaults.terminal {
            self.terminal = other.terminal;
        }
        if other.publisher != defaults.publisher {
            self.publisher = other.publisher;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("DOCKMATE_DOCKER_HOST") {
            if !host.trim().is_empty() {
                self.docker.host = Some(host);
            }
        }
    }
}
