//! Engine settings.
//!
//! Settings cover the ambient knobs of the engine: where per-VM sockets and
//! ephemeral disks live, how the hypervisor daemon is reached, and the
//! polling intervals of the connection layer. They load from TOML with
//! humantime-style durations ("5s", "1m"); everything has a deployment
//! default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Hypervisor daemon URI.
    pub uri: String,

    /// Base directory for per-VM sockets (isolation, serial, VNC).
    pub sockets_dir: PathBuf,

    /// Base directory for node-local ephemeral disk data.
    pub ephemeral_disks_dir: PathBuf,

    /// Poll interval while establishing the initial connection.
    #[serde(with = "duration_str")]
    pub connect_interval: Duration,

    /// Give-up deadline for establishing the initial connection.
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,

    /// Interval of the background connection liveness probe.
    #[serde(with = "duration_str")]
    pub monitor_interval: Duration,

    /// Capacity of the lifecycle event queue between the daemon's dispatch
    /// thread and the watch worker.
    pub event_queue_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            uri: "qemu:///system".to_string(),
            sockets_dir: PathBuf::from("/var/run/virtnode"),
            ephemeral_disks_dir: PathBuf::from("/var/run/virtnode-ephemeral-disks"),
            connect_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(15),
            monitor_interval: Duration::from_secs(10),
            event_queue_capacity: 10,
        }
    }
}

impl EngineSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::ConfigLoad(format!("{}: {e}", path.as_ref().display())))?;
        let settings: EngineSettings =
            toml::from_str(&text).map_err(|e| Error::ConfigLoad(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default location, falling back to defaults
    /// when no file exists.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("virtnode").join("config.toml"))
    }

    /// Check invariants the rest of the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.event_queue_capacity == 0 {
            return Err(Error::Config("event_queue_capacity must be at least 1".into()));
        }
        if self.connect_interval.is_zero() {
            return Err(Error::Config("connect_interval must be non-zero".into()));
        }
        if self.connect_timeout < self.connect_interval {
            return Err(Error::Config(
                "connect_timeout must be at least connect_interval".into(),
            ));
        }
        Ok(())
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
