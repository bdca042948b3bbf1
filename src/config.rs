//! Agent configuration. Loaded from JSON; missing or unparseable files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Data directory (store, event log)
    pub data_dir: PathBuf,
    /// Reading source
    pub source: SourceConfig,
    /// Rolling window and sampling parameters
    pub window: WindowConfig,
    /// Detection session parameters
    pub detection: DetectionConfig,
    /// Uplink: central verdict reporting (server-controlled policy)
    pub uplink: UplinkConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Line-delimited device node / FIFO / file to read voltages from.
    /// None together with `simulate = false` means no source attached.
    pub path: Option<PathBuf>,
    /// Use the built-in waveform simulator instead of a device
    pub simulate: bool,
    /// Bounded poll interval between reads (milliseconds)
    pub poll_interval_ms: u64,
    /// Consecutive empty polls before the source counts as disconnected
    pub idle_timeout_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Rolling window capacity (readings)
    pub window_size: usize,
    /// Score every Nth reading during a running session
    pub sample_every_n: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Path to ONNX anomaly model; None means no model selected yet
    pub model_path: Option<PathBuf>,
    /// Decision threshold (0.0–1.0)
    pub threshold: f64,
    /// Auto-stop timer for a detection session (seconds)
    pub auto_stop_secs: u64,
    /// Stop after this many scored predictions
    pub max_predictions: usize,
    /// Finalized sessions kept in memory
    pub history_limit: usize,
    /// Start a session automatically whenever the source is connected and idle
    pub auto_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    /// Whether uplink is enabled (set by server policy, not user)
    pub enabled: bool,
    /// Endpoint URL when enabled
    pub endpoint: Option<String>,
    /// Agent node id reported upstream
    pub agent_id: Option<String>,
    /// Report interval seconds when enabled
    pub report_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            source: SourceConfig::default(),
            window: WindowConfig::default(),
            detection: DetectionConfig::default(),
            uplink: UplinkConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("voltwatch"))
        .unwrap_or_else(|| PathBuf::from(".voltwatch"))
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            simulate: true,
            poll_interval_ms: 100,
            idle_timeout_polls: 50,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            sample_every_n: 3,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            threshold: 0.5,
            auto_stop_secs: 30,
            max_predictions: 50,
            history_limit: 10,
            auto_start: false,
        }
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            agent_id: None,
            report_interval_secs: 300,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl AgentConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<AgentConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }
}
