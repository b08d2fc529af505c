//! Config loading, validation, and utility operations.

use super::model::{Backend, Config};
use crate::error::{Result, TurnstileError};
use crate::fs::FsService;
use crate::memory::MemoryService;
use crate::namespace::{Ensemble, path};
use crate::session::SessionSettings;
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the config file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(TurnstileError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            TurnstileError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|e| TurnstileError::Config(format!("failed to parse config YAML: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            TurnstileError::Config(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - durations and the poll interval must be positive
    /// - `endpoints` must contain at least one non-empty entry
    /// - `root` must be a valid absolute namespace path
    /// - `connect_base_delay_ms` must not exceed `connect_max_delay_ms`
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("session_timeout_ms", self.session_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("connect_base_delay_ms", self.connect_base_delay_ms),
            ("connect_max_delay_ms", self.connect_max_delay_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(TurnstileError::Config(format!(
                    "config validation failed: {} must be greater than 0",
                    name
                )));
            }
        }

        if self.endpoints.is_empty() {
            return Err(TurnstileError::Config(
                "config validation failed: endpoints must not be empty".to_string(),
            ));
        }
        if self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(TurnstileError::Config(
                "config validation failed: endpoints entries must be non-empty".to_string(),
            ));
        }

        path::validate(&self.root).map_err(|e| {
            TurnstileError::Config(format!("config validation failed: root: {}", e))
        })?;

        if self.connect_base_delay_ms > self.connect_max_delay_ms {
            return Err(TurnstileError::Config(format!(
                "config validation failed: connect_base_delay_ms ({}) exceeds connect_max_delay_ms ({})",
                self.connect_base_delay_ms, self.connect_max_delay_ms
            )));
        }

        Ok(())
    }

    /// Connection parameters derived from this config.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            endpoints: self.endpoints.clone(),
            session_timeout: Duration::from_millis(self.session_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_retries: self.connect_max_retries,
            base_delay: Duration::from_millis(self.connect_base_delay_ms),
            max_delay: Duration::from_millis(self.connect_max_delay_ms),
        }
    }

    /// The coordination service selected by `backend`.
    pub fn ensemble(&self) -> Box<dyn Ensemble> {
        match self.backend {
            Backend::Filesystem => Box::new(FsService::new(Duration::from_millis(
                self.poll_interval_ms,
            ))),
            Backend::Memory => Box::new(MemoryService::new()),
        }
    }

    /// Create missing filesystem endpoint directories.
    ///
    /// A no-op for other backends.
    pub fn prepare_endpoints(&self) -> Result<()> {
        if self.backend != Backend::Filesystem {
            return Ok(());
        }
        for endpoint in &self.endpoints {
            std::fs::create_dir_all(endpoint).map_err(|e| {
                TurnstileError::Connect(format!(
                    "failed to create service directory '{}': {}",
                    endpoint, e
                ))
            })?;
        }
        Ok(())
    }
}
