//! Pipeline configuration.
//!
//! One flat config struct with three sections, all optional in the source
//! TOML — the host overrides just the values it cares about:
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [limits]
//! max_images = 10               # Registry capacity
//! max_source_bytes = 26214400   # 25 MB ceiling on a selected original
//!
//! [encoding]
//! max_dimension = 1920          # Longer edge after compression
//! normalize_quality = 90        # JPEG quality for format normalization
//! compress_quality = 85         # JPEG quality for compression
//! byte_budget = 2097152         # 2 MiB soft budget; under it, skip re-encode
//!
//! [remote]
//! issuer_url = "https://api.example.com/uploads/sign"
//! public_base_url = "https://cdn.example.com"
//! # bearer_token = "..."        # Optional credential for the issuer
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full pipeline configuration.
///
/// All fields have sensible defaults except the remote endpoints, which
/// [`validate`](PipelineConfig::validate) requires before any upload runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Selection limits enforced at the validation boundary.
    pub limits: LimitsConfig,
    /// Normalization and compression parameters.
    pub encoding: EncodingConfig,
    /// Signed-target issuer and public address scheme.
    pub remote: RemoteConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            encoding: EncodingConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Most records the registry holds at once.
    pub max_images: usize,
    /// Hard ceiling on a selected original's size, checked before any
    /// record is created (compression happens later and doesn't excuse an
    /// oversized source).
    pub max_source_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_images: 10,
            max_source_bytes: 25 * 1000 * 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// Longer-edge cap applied by the compressor.
    pub max_dimension: u32,
    /// JPEG quality when re-encoding a non-canonical format.
    pub normalize_quality: u8,
    /// JPEG quality when compressing.
    pub compress_quality: u8,
    /// Soft byte budget. A file under both this and `max_dimension` is
    /// returned byte-identical.
    pub byte_budget: u64,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            normalize_quality: 90,
            compress_quality: 85,
            byte_budget: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Endpoint that issues signed upload targets.
    pub issuer_url: String,
    /// Base address permanent image URLs are built from, joined with the
    /// object key the issuer returns.
    pub public_base_url: String,
    /// Optional bearer credential sent with target requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl PipelineConfig {
    /// Parse from a TOML snippet, applying defaults for missing values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that can't be expressed through types alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_images == 0 {
            return Err(ConfigError::Validation(
                "limits.max_images must be at least 1".into(),
            ));
        }
        if self.encoding.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "encoding.max_dimension must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("encoding.normalize_quality", self.encoding.normalize_quality),
            ("encoding.compress_quality", self.encoding.compress_quality),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be between 1 and 100, got {value}"
                )));
            }
        }
        if self.remote.issuer_url.is_empty() {
            return Err(ConfigError::Validation(
                "remote.issuer_url must be set".into(),
            ));
        }
        if self.remote.public_base_url.is_empty() {
            return Err(ConfigError::Validation(
                "remote.public_base_url must be set".into(),
            ));
        }
        Ok(())
    }
}
