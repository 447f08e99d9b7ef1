use crate::error::MqRestError;
use crate::mapping::MappingOverrideMode;
use crate::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECONDS: f64 = 30.0;
pub const DEFAULT_CSRF_TOKEN: &str = "local";

/// Connection and behaviour settings for a [`crate::CommandSession`].
///
/// Loadable from TOML:
///
/// ```toml
/// rest_base_url = "https://mq.example.com:9443/ibmmq/rest/v2"
/// qmgr_name = "QM1"
/// mapping_strict = false
///
/// [sync]
/// timeout_seconds = 60.0
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub rest_base_url: String,
    pub qmgr_name: String,
    #[serde(default)]
    pub gateway_qmgr: Option<String>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Per-request timeout; `None` waits indefinitely.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: Option<f64>,
    #[serde(default = "default_true")]
    pub map_attributes: bool,
    #[serde(default = "default_true")]
    pub mapping_strict: bool,
    #[serde(default = "default_csrf_token")]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub mapping_override_mode: MappingOverrideMode,
    #[serde(default)]
    pub mapping_overrides_path: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> Option<f64> {
    Some(DEFAULT_TIMEOUT_SECONDS)
}

fn default_csrf_token() -> Option<String> {
    Some(DEFAULT_CSRF_TOKEN.to_owned())
}

impl SessionConfig {
    pub fn new(rest_base_url: impl Into<String>, qmgr_name: impl Into<String>) -> Self {
        Self {
            rest_base_url: rest_base_url.into(),
            qmgr_name: qmgr_name.into(),
            gateway_qmgr: None,
            verify_tls: true,
            timeout_seconds: default_timeout_seconds(),
            map_attributes: true,
            mapping_strict: true,
            csrf_token: default_csrf_token(),
            mapping_override_mode: MappingOverrideMode::default(),
            mapping_overrides_path: None,
            sync: SyncConfig::default(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    pub fn validate(&self) -> Result<(), MqRestError> {
        if self.rest_base_url.trim().is_empty() {
            return Err(MqRestError::config("rest_base_url must not be empty"));
        }
        if self.qmgr_name.trim().is_empty() {
            return Err(MqRestError::config("qmgr_name must not be empty"));
        }
        if let Some(timeout) = self.timeout_seconds {
            if !(timeout.is_finite() && timeout > 0.0) {
                return Err(MqRestError::config("timeout_seconds must be > 0"));
            }
        }
        Ok(())
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.rest_base_url.trim_end_matches('/')
    }

    pub fn mqsc_url(&self) -> String {
        format!("{}/admin/action/qmgr/{}/mqsc", self.base_url(), self.qmgr_name)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }
}
