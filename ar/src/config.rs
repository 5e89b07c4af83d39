//! Auto-retry configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Key the retry settings live under in the host's extension settings map
pub const MODULE_NAME: &str = "auto_retry";

/// Current settings schema version
pub const SCHEMA_VERSION: u32 = 2;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings schema version (1 = camelCase blob written by the browser extension)
    #[serde(rename = "schema-version")]
    pub schema_version: u32,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Retry conditions and limits
    #[serde(rename = "auto-retry")]
    pub retry: RetrySettings,

    /// Internal delays of the state machine and action trigger
    pub timing: TimingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            log_level: None,
            retry: RetrySettings::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        debug!(schema_version = self.schema_version, "Config::validate: called");
        if self.schema_version > SCHEMA_VERSION {
            return Err(eyre::eyre!(
                "Unsupported schema-version {} (newest known is {})",
                self.schema_version,
                SCHEMA_VERSION
            ));
        }
        self.retry.validate()
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .autoretry.yml
        let local_config = PathBuf::from(".autoretry.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/autoretry/autoretry.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("autoretry").join("autoretry.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Retry conditions and limits
///
/// Every field has a default, so a partial blob merges over the defaults on load.
/// The camelCase aliases accept schema-version 1 blobs written by the browser extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Master switch
    pub enabled: bool,

    /// Retry when the response is empty after trimming
    #[serde(rename = "retry-on-empty", alias = "retryOnEmpty")]
    pub retry_on_empty: bool,

    /// Retry when the response is shorter than `min_length` characters
    #[serde(rename = "retry-on-short", alias = "retryOnShort")]
    pub retry_on_short: bool,

    #[serde(rename = "min-length", alias = "minLength")]
    pub min_length: u32,

    /// Retry when the response does not contain `required_string`
    #[serde(rename = "retry-on-missing-string", alias = "retryOnMissingString")]
    pub retry_on_missing_string: bool,

    #[serde(rename = "required-string", alias = "requiredString")]
    pub required_string: String,

    /// Retry when the response took less than `min_generation_time_ms` to generate
    #[serde(rename = "retry-on-fast-generation", alias = "retryOnFastGeneration")]
    pub retry_on_fast_generation: bool,

    #[serde(rename = "min-generation-time-ms", alias = "minGenerationTime")]
    pub min_generation_time_ms: u64,

    /// Upper bound on retries per session
    #[serde(rename = "max-retries", alias = "maxRetries")]
    pub max_retries: u32,

    /// Pause before each retry action
    #[serde(rename = "retry-delay-ms", alias = "retryDelay")]
    pub retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            retry_on_empty: true,
            retry_on_short: true,
            min_length: 10,
            retry_on_missing_string: false,
            required_string: String::new(),
            retry_on_fast_generation: false,
            min_generation_time_ms: 10_000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl RetrySettings {
    /// Read the retry blob out of the host's extension settings map
    ///
    /// A missing blob yields the defaults. Keys are merged one at a time over the
    /// defaults, so a key with a bad value is logged and dropped without taking the
    /// rest of the blob with it. Negative numbers are clamped to zero and values that
    /// fail [`validate`](Self::validate) fall back to their defaults.
    pub fn from_extension_settings(extension_settings: &serde_json::Value) -> Self {
        debug!("RetrySettings::from_extension_settings: called");
        let Some(blob) = extension_settings.get(MODULE_NAME) else {
            debug!("RetrySettings::from_extension_settings: no blob, using defaults");
            return Self::default();
        };
        let Some(entries) = blob.as_object() else {
            warn!("{} settings blob is not an object, using defaults", MODULE_NAME);
            return Self::default();
        };

        let mut accepted = serde_json::Map::new();
        let mut settings = Self::default();
        for (key, value) in entries {
            let mut candidate = accepted.clone();
            candidate.insert(key.clone(), clamp_negative(value));
            match serde_json::from_value::<Self>(serde_json::Value::Object(candidate.clone())) {
                Ok(merged) => {
                    accepted = candidate;
                    settings = merged;
                }
                Err(e) => {
                    warn!(%key, error = %e, "Ignoring bad {} setting", MODULE_NAME);
                }
            }
        }
        settings.sanitized()
    }

    /// Replace values that fail [`validate`](Self::validate) with their defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_retries == 0 {
            warn!(default = defaults.max_retries, "max-retries must be at least 1, using default");
            self.max_retries = defaults.max_retries;
        }
        if self.min_generation_time_ms == 0 {
            warn!(
                default = defaults.min_generation_time_ms,
                "min-generation-time-ms must be at least 1, using default"
            );
            self.min_generation_time_ms = defaults.min_generation_time_ms;
        }
        self
    }

    /// True when at least one retry condition is switched on
    pub fn any_condition_enabled(&self) -> bool {
        self.retry_on_empty || self.retry_on_short || self.retry_on_missing_string || self.retry_on_fast_generation
    }

    /// Pause before each retry action as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject values the state machine cannot work with
    pub fn validate(&self) -> Result<()> {
        debug!(max_retries = self.max_retries, "RetrySettings::validate: called");
        if self.max_retries == 0 {
            return Err(eyre::eyre!("max-retries must be at least 1"));
        }
        if self.min_generation_time_ms == 0 {
            return Err(eyre::eyre!("min-generation-time-ms must be at least 1"));
        }
        Ok(())
    }
}

/// Host settings forms store whatever integer was typed; the counters here are unsigned
fn clamp_negative(value: &serde_json::Value) -> serde_json::Value {
    match value.as_f64() {
        Some(n) if n < 0.0 => serde_json::Value::from(0),
        _ => value.clone(),
    }
}

/// Internal delays of the state machine and action trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after generation-ended before inspecting the message (lets the UI render)
    #[serde(rename = "evaluation-delay-ms")]
    pub evaluation_delay_ms: u64,

    /// Pause between "previous variant" and "next variant" in a swipe cycle
    #[serde(rename = "swipe-pause-ms")]
    pub swipe_pause_ms: u64,

    /// Wait after a swipe before re-reading the variant index
    #[serde(rename = "swipe-settle-ms")]
    pub swipe_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            evaluation_delay_ms: 200,
            swipe_pause_ms: 100,
            swipe_settle_ms: 300,
        }
    }
}

impl TimingConfig {
    pub fn evaluation_delay(&self) -> Duration {
        Duration::from_millis(self.evaluation_delay_ms)
    }

    pub fn swipe_pause(&self) -> Duration {
        Duration::from_millis(self.swipe_pause_ms)
    }

    pub fn swipe_settle(&self) -> Duration {
        Duration::from_millis(self.swipe_settle_ms)
    }
}

/// Live view of the retry settings
///
/// The settings UI may change values at any time; the state machine reads them
/// fresh at every decision point.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> RetrySettings;
}

impl SettingsSource for RetrySettings {
    fn current(&self) -> RetrySettings {
        self.clone()
    }
}

/// Settings shared between the host's settings form and the state machine
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<RetrySettings>>,
}

impl SharedSettings {
    pub fn new(settings: RetrySettings) -> Self {
        debug!(enabled = settings.enabled, "SharedSettings::new: called");
        Self {
            inner: Arc::new(RwLock::new(settings.sanitized())),
        }
    }

    /// Apply an edit from the settings form; invalid values revert to their defaults
    pub fn update(&self, edit: impl FnOnce(&mut RetrySettings)) {
        debug!("SharedSettings::update: called");
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        edit(&mut guard);
        *guard = guard.clone().sanitized();
    }
}

impl SettingsSource for SharedSettings {
    fn current(&self) -> RetrySettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
