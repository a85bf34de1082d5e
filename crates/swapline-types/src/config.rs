//! Configuration types for Swapline nodes.
//!
//! A node is configured from TOML (see [`NodeConfig::from_toml_str`]) and a
//! small set of `SWAPLINE_*` environment overrides. Every section has a
//! usable default, so an empty document is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{SwaplineError, constants};

/// Payment selection tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Attempts after the first before giving up on contended funds.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub retry_sleep_ms: u64,
    /// Upper bound on a single backoff delay in milliseconds.
    pub retry_cap_ms: u64,
    /// Records fetched per index page.
    pub page_size: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_SELECTION_MAX_RETRIES,
            retry_sleep_ms: constants::DEFAULT_SELECTION_RETRY_SLEEP_MS,
            retry_cap_ms: constants::DEFAULT_SELECTION_RETRY_CAP_MS,
            page_size: constants::DEFAULT_PAGE_SIZE,
        }
    }
}

impl SelectionConfig {
    /// Delay before retry number `attempt` (0-based):
    /// `min(retry_sleep * 2^attempt, retry_cap)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .retry_sleep_ms
            .saturating_mul(factor)
            .min(self.retry_cap_ms);
        Duration::from_millis(ms)
    }
}

/// Peer session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for the counterparty's next message.
    pub timeout_ms: u64,
    /// Messages buffered per direction. 1 means strict ping-pong.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: constants::DEFAULT_SESSION_TIMEOUT_MS,
            channel_capacity: constants::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Exchange settings shared by both roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Well-known name of the party whose currency sellers quote.
    pub currency_issuer: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            currency_issuer: constants::DEFAULT_CURRENCY_ISSUER.to_string(),
        }
    }
}

/// Configuration for a single Swapline node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Well-known name this node registers under.
    pub name: String,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

impl NodeConfig {
    /// Defaults for every section under the given node name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selection: SelectionConfig::default(),
            session: SessionConfig::default(),
            exchange: ExchangeConfig::default(),
        }
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    /// `Configuration` if the document is malformed or `name` is missing.
    pub fn from_toml_str(s: &str) -> crate::Result<Self> {
        let cfg: Self =
            toml::from_str(s).map_err(|e| SwaplineError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `SWAPLINE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> crate::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Split out so tests don't
    /// have to mutate the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(constants::ENV_SESSION_TIMEOUT_MS) {
            self.session.timeout_ms = parse_env(constants::ENV_SESSION_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(constants::ENV_SELECTION_MAX_RETRIES) {
            self.selection.max_retries = parse_env(constants::ENV_SELECTION_MAX_RETRIES, &v)?;
        }
        if let Some(v) = lookup(constants::ENV_CURRENCY_ISSUER) {
            self.exchange.currency_issuer = v;
        }
        self.validate()
    }

    fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(SwaplineError::Configuration("node name is empty".into()));
        }
        if self.session.channel_capacity == 0 {
            return Err(SwaplineError::Configuration(
                "session.channel_capacity must be at least 1".into(),
            ));
        }
        if self.selection.page_size == 0 {
            return Err(SwaplineError::Configuration(
                "selection.page_size must be at least 1".into(),
            ));
        }
        if self.exchange.currency_issuer.trim().is_empty() {
            return Err(SwaplineError::Configuration(
                "exchange.currency_issuer is empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SwaplineError::Configuration(format!("{key}={value}: {e}")))
}
