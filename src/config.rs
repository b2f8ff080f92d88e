//! Controller configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PresenceError, Result};
use crate::pool::DEFAULT_POOL_CAPACITY;

/// Application id used when none is configured
pub const DEFAULT_APPLICATION_ID: &str = "956193080111923300";

/// Timing and connection settings for a [`PresenceController`](crate::PresenceController)
///
/// Durations are stored as integer milliseconds so the struct round-trips
/// through JSON unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub application_id: String,
    /// Ask the native layer to register the app's URL protocol
    pub auto_register: bool,
    pub steam_id: Option<String>,
    /// How often queued native callbacks are pumped
    pub pump_interval_ms: u64,
    /// How often the presence is rebuilt and resent
    pub refresh_interval_ms: u64,
    /// Hierarchy-driven re-detection is ignored this long after a play-mode change
    pub play_mode_lock_ms: u64,
    /// Consecutive failures before the controller gives up and cools down
    pub failure_threshold: u32,
    /// How long re-initialization is suppressed after giving up
    pub error_cooldown_ms: u64,
    /// An upload older than this is assumed stuck
    pub upload_timeout_ms: u64,
    pub pool_capacity: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            auto_register: false,
            steam_id: None,
            pump_interval_ms: 1_000,
            refresh_interval_ms: 5_000,
            play_mode_lock_ms: 3_000,
            failure_threshold: 3,
            error_cooldown_ms: 30_000,
            upload_timeout_ms: 10 * 60 * 1_000,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl RpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| PresenceError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = application_id.into();
        self
    }

    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }

    pub fn with_steam_id(mut self, steam_id: impl Into<String>) -> Self {
        self.steam_id = Some(steam_id.into());
        self
    }

    pub fn with_pump_interval(mut self, interval: Duration) -> Self {
        self.pump_interval_ms = millis(interval);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = millis(interval);
        self
    }

    pub fn with_play_mode_lock(mut self, lock: Duration) -> Self {
        self.play_mode_lock_ms = millis(lock);
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_error_cooldown(mut self, cooldown: Duration) -> Self {
        self.error_cooldown_ms = millis(cooldown);
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout_ms = millis(timeout);
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn play_mode_lock(&self) -> Duration {
        Duration::from_millis(self.play_mode_lock_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn validate(&self) -> Result {
        let invalid = |msg: &str| Err(PresenceError::InvalidConfig(msg.to_string()));

        if self.application_id.trim().is_empty() {
            return Err(PresenceError::EmptyApplicationId);
        }
        if !self.application_id.chars().all(|c| c.is_ascii_digit()) {
            return invalid("application_id must be a numeric snowflake");
        }
        if self.pump_interval_ms == 0 {
            return invalid("pump_interval_ms must be greater than 0");
        }
        if self.refresh_interval_ms == 0 {
            return invalid("refresh_interval_ms must be greater than 0");
        }
        if self.failure_threshold == 0 {
            return invalid("failure_threshold must be greater than 0");
        }
        if self.upload_timeout_ms == 0 {
            return invalid("upload_timeout_ms must be greater than 0");
        }
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
