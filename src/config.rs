// Run configuration and credentials
// Settings: optional TOML file under TRENDSCREENER__* env vars, all fields defaulted

use anyhow::Context;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "trendscreener.toml";
const ENV_PREFIX: &str = "TRENDSCREENER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub pipeline: PipelineSettings,
    pub compliance: ComplianceSettings,
    pub notify: NotifySettings,
    pub report: ReportSettings,
    pub secrets_dir: Option<PathBuf>,
}

/// Market data fetching and retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub base_url: String,
    pub feed: String,
    /// Calendar days of history requested; 400 covers 255 trading days
    pub lookback_days: i64,
    pub min_bars: usize,
    pub max_attempts: u32,
    pub rate_limit_backoff_ms: u64,
    pub transient_backoff_ms: u64,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: "https://data.alpaca.markets".to_string(),
            feed: "iex".to_string(),
            lookback_days: 400,
            min_bars: 50,
            max_attempts: 3,
            rate_limit_backoff_ms: 1000,
            transient_backoff_ms: 500,
            requests_per_minute: 200,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Tickers fetched at once; 1 processes candidates one by one
    pub max_concurrency: usize,
    /// Pause before each ticker after the first
    pub request_pause_ms: u64,
    pub max_tickers: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            request_pause_ms: 100,
            max_tickers: None,
        }
    }
}

impl PipelineSettings {
    pub fn request_pause(&self) -> Duration {
        Duration::from_millis(self.request_pause_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComplianceSettings {
    pub enabled: bool,
    pub url: String,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: crate::api::aatinaa::AATINAA_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub enabled: bool,
    pub base_url: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: crate::api::telegram::TELEGRAM_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
    pub timezone: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (optional) and the environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, reason: &str| ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        };

        if self.fetch.max_attempts == 0 {
            return Err(invalid("fetch.max_attempts", "must be at least 1"));
        }
        if self.fetch.min_bars == 0 {
            return Err(invalid("fetch.min_bars", "must be at least 1"));
        }
        if self.fetch.lookback_days <= 0 {
            return Err(invalid("fetch.lookback_days", "must be positive"));
        }
        if self.fetch.requests_per_minute == 0 {
            return Err(invalid("fetch.requests_per_minute", "must be positive"));
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(invalid("pipeline.max_concurrency", "must be at least 1"));
        }
        if self.report.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(invalid("report.timezone", "unknown timezone"));
        }
        Ok(())
    }
}

/// Where credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CredentialMode {
    /// `.env` file, then the process environment
    Local,
    /// Mounted secret files, then the process environment
    Deployed,
}

pub const DEFAULT_SECRETS_DIR: &str = "/var/run/secrets/trendscreener";

/// Secrets for the external collaborators
#[derive(Debug, Default)]
pub struct Credentials {
    pub alpaca_api_key: Option<SecretString>,
    pub alpaca_secret_key: Option<SecretString>,
    pub telegram_bot_token: Option<SecretString>,
    pub telegram_chat_id: Option<String>,
}

impl Credentials {
    pub fn load(mode: CredentialMode, secrets_dir: Option<&Path>) -> anyhow::Result<Self> {
        let secrets_dir = secrets_dir.unwrap_or(Path::new(DEFAULT_SECRETS_DIR));

        if mode == CredentialMode::Local {
            // A missing .env is fine; the environment may already be set
            if let Ok(path) = dotenvy::dotenv() {
                tracing::debug!("Loaded environment from {}", path.display());
            }
        }

        let lookup = |name: &str| lookup_secret(mode, secrets_dir, name);

        Ok(Self {
            alpaca_api_key: lookup("ALPACA_API_KEY")?.map(SecretString::from),
            alpaca_secret_key: lookup("ALPACA_SECRET_KEY")?.map(SecretString::from),
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN")?.map(SecretString::from),
            telegram_chat_id: lookup("TELEGRAM_CHAT_ID")?,
        })
    }

    /// Alpaca key id and secret, both required for fetching
    pub fn alpaca(&self) -> Result<(&SecretString, &SecretString), ConfigError> {
        let key = self
            .alpaca_api_key
            .as_ref()
            .ok_or(ConfigError::MissingCredential("ALPACA_API_KEY"))?;
        let secret = self
            .alpaca_secret_key
            .as_ref()
            .ok_or(ConfigError::MissingCredential("ALPACA_SECRET_KEY"))?;
        Ok((key, secret))
    }
}

fn lookup_secret(mode: CredentialMode, secrets_dir: &Path, name: &str) -> anyhow::Result<Option<String>> {
    if mode == CredentialMode::Deployed {
        let path = secrets_dir.join(name.to_lowercase());
        match std::fs::read_to_string(&path) {
            Ok(value) => return Ok(non_empty(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read secret {}", path.display()))
            }
        }
    }

    Ok(std::env::var(name).ok().and_then(non_empty))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
