//! Configuration loading and validation for the field encryption layer.
//!
//! All values are read from environment variables at startup. Loading fails
//! with a clear error message if a required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::keys::MasterKey;

/// Validated field encryption configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Whether sensitive fields are encrypted at all.
    #[serde(default = "default_kms_enabled")]
    pub kms_enabled: bool,

    /// Base64-encoded 32-byte master key. **Required** when `kms_enabled`.
    #[serde(default)]
    pub kms_master_key: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint of the OTEL collector. Spans are not exported when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_kms_enabled() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// The decoded master key, or `None` when key management is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if key management is enabled and the key is missing,
    /// not base64, or not 32 bytes.
    pub fn master_key(&self) -> Result<Option<MasterKey>> {
        if !self.kms_enabled {
            return Ok(None);
        }
        let encoded = self
            .kms_master_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .context("KMS_MASTER_KEY is required when KMS_ENABLED is true")?;
        let key = MasterKey::from_base64(encoded).context("KMS_MASTER_KEY is invalid")?;
        Ok(Some(key))
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        self.master_key()?;
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("kms_enabled", &self.kms_enabled)
            .field(
                "kms_master_key",
                &self.kms_master_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("log_level", &self.log_level)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty");
    }
    Ok(())
}
