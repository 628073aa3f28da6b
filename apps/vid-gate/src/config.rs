//! Process configuration
//!
//! Everything is read from the environment (a `.env` file is honored by
//! `main`). Optional values fall back to defaults, which are logged so an
//! operator can see what the relay actually runs with.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use vidrelay_domain::ingestion::{
    FinalizerConfig, IngestionError, SessionConfig, DEFAULT_ENRICHMENT_MAX_BYTES, DEFAULT_MAX_IN_FLIGHT_FRAGMENTS,
    DEFAULT_MEDIA_TYPE,
};
use vidrelay_http::infrastructure::{
    OpenAiConfig, DEFAULT_BASE_URL, DEFAULT_SUMMARY_MODEL, DEFAULT_TIMEOUT,
    DEFAULT_TRANSCRIPTION_MODEL,
};
use vidrelay_s3::infrastructure::{DEFAULT_FOLDER, DEFAULT_PART_SIZE, MIN_PART_SIZE};

const MIB: u64 = 1024 * 1024;

/// Runtime configuration of the relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub scratch_dir: PathBuf,
    pub bucket: String,
    pub folder: String,
    pub public_base_url: Option<String>,
    pub part_size: usize,
    pub max_in_flight: usize,
    pub enrichment_max_bytes: u64,
    pub media_type: String,
    pub catalog_host: String,
    pub catalog_timeout: Duration,
    pub openai: OpenAiConfig,
}

impl RelayConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let part_size_mib: u64 = env.parsed("RELAY_PART_SIZE_MIB", DEFAULT_PART_SIZE as u64 / MIB)?;
        let part_size = part_size_mib
            .checked_mul(MIB)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or_else(|| {
                IngestionError::config_error(format!("RELAY_PART_SIZE_MIB is too large: {}", part_size_mib))
            })?;
        if part_size < MIN_PART_SIZE {
            return Err(IngestionError::config_error(format!(
                "RELAY_PART_SIZE_MIB must be at least {}, got {}",
                MIN_PART_SIZE as u64 / MIB,
                part_size_mib
            ))
            .into());
        }

        let max_in_flight: usize = env.parsed("RELAY_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT_FRAGMENTS)?;
        if max_in_flight == 0 {
            return Err(IngestionError::config_error("RELAY_MAX_IN_FLIGHT must be greater than 0").into());
        }

        let enrichment_max_mib: u64 =
            env.parsed("RELAY_ENRICHMENT_MAX_MIB", DEFAULT_ENRICHMENT_MAX_BYTES / MIB)?;

        let catalog_host = env
            .optional("CATALOG_API_HOST")
            .ok_or_else(|| IngestionError::config_error("CATALOG_API_HOST must be set"))?;

        let openai = OpenAiConfig {
            api_key: env.optional("OPENAI_API_KEY"),
            base_url: env.or_default("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            transcription_model: env.or_default("OPENAI_TRANSCRIPTION_MODEL", DEFAULT_TRANSCRIPTION_MODEL),
            summary_model: env.or_default("OPENAI_SUMMARY_MODEL", DEFAULT_SUMMARY_MODEL),
            ..OpenAiConfig::default()
        };
        if openai.api_key.is_none() {
            info!("OPENAI_API_KEY not set, enrichment disabled");
        }

        Ok(Self {
            host: env.or_default("RELAY_HOST", "0.0.0.0"),
            port: env.parsed("RELAY_PORT", 5000)?,
            scratch_dir: PathBuf::from(env.or_default("RELAY_SCRATCH_DIR", "temp_upload")),
            bucket: env.or_default("RELAY_BUCKET", "vidrelay"),
            folder: env.or_default("RELAY_FOLDER", DEFAULT_FOLDER),
            public_base_url: env.optional("RELAY_PUBLIC_BASE_URL"),
            part_size,
            max_in_flight,
            enrichment_max_bytes: enrichment_max_mib.saturating_mul(MIB),
            media_type: env.or_default("RELAY_MEDIA_TYPE", DEFAULT_MEDIA_TYPE),
            catalog_host,
            catalog_timeout: Duration::from_secs(
                env.parsed("CATALOG_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs())?,
            ),
            openai,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_in_flight_fragments: self.max_in_flight,
            finalizer: FinalizerConfig {
                enrichment_max_bytes: self.enrichment_max_bytes,
                media_type: self.media_type.clone(),
            },
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| {
            info!("{} not set, using default: {}", key, default);
            default.to_string()
        })
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr + std::fmt::Display,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|err| {
                IngestionError::config_error(format!("invalid value for {}: '{}' ({})", key, raw, err)).into()
            }),
            None => {
                info!("{} not set, using default: {}", key, default);
                Ok(default)
            }
        }
    }
}
