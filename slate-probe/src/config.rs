//! Probe configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use slate_core::{BridgeConfig, SupervisorConfig};

/// Top-level configuration for the probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Bridge timing.
    pub bridge: BridgeSection,
    /// Kernel process supervision.
    pub supervisor: SupervisorSection,
    /// Logging.
    pub logging: LoggingSection,
}

/// Handshake timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// Total handshake window in milliseconds.
    pub connect_timeout_ms: u64,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

/// Kernel process supervision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    /// Kernel executable file name.
    pub executable_name: String,
    /// Child working directory; empty = current directory.
    pub data_dir: String,
    /// Extra directories to search for the executable.
    pub search_dirs: Vec<String>,
    /// Extra runtime arguments placed before the session id.
    pub runtime_args: Vec<String>,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level filter.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeSection::default(),
            supervisor: SupervisorSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for BridgeSection {
    fn default() -> Self {
        let defaults = BridgeConfig::default();
        Self {
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

impl Default for SupervisorSection {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            executable_name: defaults.executable_name,
            data_dir: String::new(),
            search_dirs: Vec::new(),
            runtime_args: Vec::new(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Conversion ───────────────────────────────────────────────────

impl ProbeConfig {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            connect_timeout: Duration::from_millis(self.bridge.connect_timeout_ms),
            poll_interval: Duration::from_millis(self.bridge.poll_interval_ms.max(1)),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig {
            executable_name: self.supervisor.executable_name.clone(),
            runtime_args: self.supervisor.runtime_args.clone(),
            ..SupervisorConfig::default()
        };
        if !self.supervisor.data_dir.is_empty() {
            config.data_dir = PathBuf::from(&self.supervisor.data_dir);
        }
        config
            .search_dirs
            .extend(self.supervisor.search_dirs.iter().map(PathBuf::from));
        config
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ProbeConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ProbeConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("connect_timeout_ms"));
        assert!(text.contains("executable_name"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ProbeConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ProbeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.bridge.connect_timeout_ms, 30_000);
        assert_eq!(parsed.bridge.poll_interval_ms, 100);
    }

    #[test]
    fn conversion_honours_overrides() {
        let mut cfg = ProbeConfig::default();
        cfg.bridge.connect_timeout_ms = 1000;
        cfg.supervisor.data_dir = "/tmp".into();
        cfg.supervisor.search_dirs = vec!["/opt/slate".into()];

        let bridge = cfg.bridge_config();
        assert_eq!(bridge.connect_timeout, Duration::from_millis(1000));

        let sup = cfg.supervisor_config();
        assert_eq!(sup.data_dir, PathBuf::from("/tmp"));
        assert!(sup.search_dirs.contains(&PathBuf::from("/opt/slate")));
    }
}
