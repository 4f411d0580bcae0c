//! Serializable run configuration.
//!
//! Everything is loaded from TOML and optionally patched by `key=value`
//! override strings from the command line. Recognised keys are enumerated
//! per section; anything else is an error. `validate()` must pass before a
//! run starts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("malformed override '{0}' (expected key=value)")]
    MalformedOverride(String),

    #[error("unknown {section} option '{key}'")]
    UnknownKey { section: &'static str, key: String },

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How a bracket group is handed to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Three `submit` calls; only the last leg transmits.
    Linked,
    /// One `submit_bracket` call carrying all three legs.
    Bracket,
}

/// What to do once a position has been held for `max_hold_steps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldPolicy {
    /// Report the expiry and keep the position.
    LogOnly,
    /// Report the expiry and send a market exit.
    Flatten,
}

/// Bracket strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Entry limit sits this fraction below the signal close.
    pub limit_offset: f64,
    /// Stop and target sit this fraction below/above the entry price.
    pub bracket_offset: f64,
    pub entry_valid_days: i64,
    pub bracket_valid_days: i64,
    pub max_hold_steps: usize,
    /// Exchange entry and stop prices (and their validity). Produces a
    /// deliberately degenerate bracket for robustness runs.
    pub swap_entry_stop: bool,
    pub submission_mode: SubmissionMode,
    pub hold_policy: HoldPolicy,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_period: 5,
            slow_period: 15,
            limit_offset: 0.005,
            bracket_offset: 0.02,
            entry_valid_days: 3,
            bracket_valid_days: 1000,
            max_hold_steps: 10,
            swap_entry_stop: false,
            submission_mode: SubmissionMode::Linked,
            hold_policy: HoldPolicy::LogOnly,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fast_period == 0 || self.slow_period == 0 {
            return Err(ConfigError::Invalid(
                "moving average periods must be >= 1".into(),
            ));
        }
        if self.fast_period >= self.slow_period {
            return Err(ConfigError::Invalid(format!(
                "fast_period ({}) must be < slow_period ({})",
                self.fast_period, self.slow_period
            )));
        }
        if !(0.0..1.0).contains(&self.limit_offset) {
            return Err(ConfigError::Invalid(format!(
                "limit_offset must be in [0, 1), got {}",
                self.limit_offset
            )));
        }
        if !(self.bracket_offset > 0.0 && self.bracket_offset < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "bracket_offset must be in (0, 1), got {}",
                self.bracket_offset
            )));
        }
        if self.entry_valid_days < 0 || self.bracket_valid_days < 0 {
            return Err(ConfigError::Invalid(
                "validity windows must not be negative".into(),
            ));
        }
        if self.max_hold_steps == 0 {
            return Err(ConfigError::Invalid("max_hold_steps must be >= 1".into()));
        }
        Ok(())
    }

    /// Apply `key=value[,key=value...]` overrides.
    pub fn apply_overrides(&mut self, overrides: &str) -> Result<(), ConfigError> {
        for (key, value) in parse_overrides(overrides)? {
            match key {
                "fast_period" | "p1" => self.fast_period = parse_value(key, value)?,
                "slow_period" | "p2" => self.slow_period = parse_value(key, value)?,
                "limit_offset" | "limit" => self.limit_offset = parse_value(key, value)?,
                "bracket_offset" => self.bracket_offset = parse_value(key, value)?,
                "entry_valid_days" | "limdays" => self.entry_valid_days = parse_value(key, value)?,
                "bracket_valid_days" | "limdays2" => {
                    self.bracket_valid_days = parse_value(key, value)?
                }
                "max_hold_steps" | "hold" => self.max_hold_steps = parse_value(key, value)?,
                "swap_entry_stop" | "switchp1p2" => self.swap_entry_stop = parse_bool(key, value)?,
                "submission_mode" => self.submission_mode = parse_enum(key, value)?,
                "usebracket" => {
                    self.submission_mode = if parse_bool(key, value)? {
                        SubmissionMode::Bracket
                    } else {
                        SubmissionMode::Linked
                    }
                }
                "hold_policy" => self.hold_policy = parse_enum(key, value)?,
                _ => {
                    return Err(ConfigError::UnknownKey {
                        section: "strategy",
                        key: key.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Deterministic hash of the parameter set.
    pub fn fingerprint(&self) -> String {
        // Struct field order is fixed, so the JSON text is canonical.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// Simulated broker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub cash: f64,
    /// Commission as a fraction of traded value.
    pub commission: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            cash: 10_000.0,
            commission: 0.0,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cash.is_finite() && self.cash > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "broker cash must be positive, got {}",
                self.cash
            )));
        }
        if !(0.0..1.0).contains(&self.commission) {
            return Err(ConfigError::Invalid(format!(
                "commission must be in [0, 1), got {}",
                self.commission
            )));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &str) -> Result<(), ConfigError> {
        for (key, value) in parse_overrides(overrides)? {
            match key {
                "cash" => self.cash = parse_value(key, value)?,
                "commission" => self.commission = parse_value(key, value)?,
                _ => {
                    return Err(ConfigError::UnknownKey {
                        section: "broker",
                        key: key.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Fixed-size position sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizerConfig {
    pub stake: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self { stake: 1.0 }
    }
}

impl SizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.stake.is_finite() && self.stake > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "stake must be positive, got {}",
                self.stake
            )));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &str) -> Result<(), ConfigError> {
        for (key, value) in parse_overrides(overrides)? {
            match key {
                "stake" => self.stake = parse_value(key, value)?,
                _ => {
                    return Err(ConfigError::UnknownKey {
                        section: "sizer",
                        key: key.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Complete configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy: StrategyConfig,
    pub broker: BrokerConfig,
    pub sizer: SizerConfig,
    /// Inclusive lower bound on bar dates.
    pub from_date: Option<NaiveDate>,
    /// Inclusive upper bound on bar dates.
    pub to_date: Option<NaiveDate>,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        self.broker.validate()?;
        self.sizer.validate()?;
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from > to {
                return Err(ConfigError::Invalid(format!(
                    "from_date {from} is after to_date {to}"
                )));
            }
        }
        Ok(())
    }
}

// ─── Override parsing ────────────────────────────────────────────────

fn parse_overrides(input: &str) -> Result<Vec<(&str, &str)>, ConfigError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedOverride(pair.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::MalformedOverride(pair.to_string()));
            }
            Ok((key, value.trim()))
        })
        .collect()
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

/// Parse a snake_case enum variant through its serde representation.
fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T, ConfigError> {
    let unquoted = value.trim_matches(|c| c == '"' || c == '\'');
    serde_json::from_value(serde_json::Value::String(unquoted.to_string())).map_err(|e| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}
