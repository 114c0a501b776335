//! Lottery Configuration
//!
//! Game timing, store shape and payout rule. Loaded from defaults,
//! `LOTTO_*` environment variables, or a JSON document.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::clock::SECONDS_PER_DAY;
use crate::game::board::{MatchRule, NumberRange, LOTTO_NUMBER_COUNT};
use crate::proof::merkle::{DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH};

/// Default entry window: 6 days, the draw follows on day 7.
pub const DEFAULT_GAME_DURATION_SECS: u64 = 6 * SECONDS_PER_DAY;

/// Default minimum time between two epoch starts.
pub const DEFAULT_MIN_EPOCH_GAP_SECS: u64 = SECONDS_PER_DAY;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// Values parse but do not make a playable game.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// JSON document could not be parsed.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lottery configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LottoConfig {
    /// Length of the entry window (seconds).
    pub game_duration_secs: u64,
    /// Minimum time between the previous window's start and a new epoch.
    pub min_epoch_gap_secs: u64,
    /// Store depth (sibling levels per membership proof).
    pub tree_depth: usize,
    /// Legal range for picked and drawn numbers.
    pub number_range: NumberRange,
    /// Rule deciding which claims pay out.
    pub match_rule: MatchRule,
}

impl Default for LottoConfig {
    fn default() -> Self {
        Self {
            game_duration_secs: DEFAULT_GAME_DURATION_SECS,
            min_epoch_gap_secs: DEFAULT_MIN_EPOCH_GAP_SECS,
            tree_depth: DEFAULT_TREE_DEPTH,
            number_range: NumberRange::default(),
            match_rule: MatchRule::Exact,
        }
    }
}

impl LottoConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup (environment, test maps).
    ///
    /// Recognised keys: `LOTTO_GAME_DURATION_SECS`, `LOTTO_MIN_EPOCH_GAP_SECS`,
    /// `LOTTO_TREE_DEPTH`, `LOTTO_NUMBER_MIN`, `LOTTO_NUMBER_MAX`,
    /// `LOTTO_MATCH_RULE` (`exact` or `at-least:<k>`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            game_duration_secs: parse_or(&lookup, "LOTTO_GAME_DURATION_SECS", defaults.game_duration_secs)?,
            min_epoch_gap_secs: parse_or(&lookup, "LOTTO_MIN_EPOCH_GAP_SECS", defaults.min_epoch_gap_secs)?,
            tree_depth: parse_or(&lookup, "LOTTO_TREE_DEPTH", defaults.tree_depth)?,
            number_range: NumberRange {
                min: parse_or(&lookup, "LOTTO_NUMBER_MIN", defaults.number_range.min)?,
                max: parse_or(&lookup, "LOTTO_NUMBER_MAX", defaults.number_range.max)?,
            },
            match_rule: match lookup("LOTTO_MATCH_RULE") {
                Some(raw) => parse_match_rule(&raw)?,
                None => defaults.match_rule,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration describes a playable game.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game_duration_secs == 0 {
            return Err(ConfigError::Invalid("game duration must be positive".into()));
        }
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "tree depth must be in 1..={}, got {}",
                MAX_TREE_DEPTH, self.tree_depth
            )));
        }
        if self.number_range.min > self.number_range.max {
            return Err(ConfigError::Invalid(format!(
                "number range [{}, {}] is empty",
                self.number_range.min, self.number_range.max
            )));
        }
        if let MatchRule::AtLeast(k) = self.match_rule {
            if k == 0 || k > LOTTO_NUMBER_COUNT {
                return Err(ConfigError::Invalid(format!(
                    "match rule needs 1..={} numbers, got {}",
                    LOTTO_NUMBER_COUNT, k
                )));
            }
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_match_rule(raw: &str) -> Result<MatchRule, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: "LOTTO_MATCH_RULE",
        value: raw.to_string(),
    };

    let value = raw.trim().to_ascii_lowercase();
    if value == "exact" {
        return Ok(MatchRule::Exact);
    }
    value
        .strip_prefix("at-least:")
        .and_then(|k| k.parse().ok())
        .map(MatchRule::AtLeast)
        .ok_or_else(invalid)
}
