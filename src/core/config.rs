use crate::errors::{Result, RunnerError};
use crate::types::Headers;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Run settings. The base settings of a run are overlaid by each step's
/// [`SettingsOverride`] while that step executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pause after every passing step.
    pub step_delay_ms: u64,
    /// Pause after every driver action reported through the step driver.
    pub action_delay_ms: u64,
    pub wait_timeout_ms: u64,
    pub clear_cache: bool,
    pub clear_cookies: bool,
    pub disable_cache: bool,
    pub incognito: bool,
    pub device: Option<String>,
    pub user_agent: Option<String>,
    pub extra_headers: Headers,
    pub screenshot_on_failure: bool,
    /// Free-form keys read by step bodies.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step_delay_ms: 0,
            action_delay_ms: 0,
            wait_timeout_ms: 30000,
            clear_cache: false,
            clear_cookies: false,
            disable_cache: false,
            incognito: false,
            device: None,
            user_agent: None,
            extra_headers: Headers::new(),
            screenshot_on_failure: false,
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&raw).map_err(|e| {
            RunnerError::Config(format!("invalid settings in {}: {}", path.display(), e))
        })
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Per-step settings. Every present key replaces the base value wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverride {
    pub step_delay_ms: Option<u64>,
    pub action_delay_ms: Option<u64>,
    pub wait_timeout_ms: Option<u64>,
    pub clear_cache: Option<bool>,
    pub clear_cookies: Option<bool>,
    pub disable_cache: Option<bool>,
    pub incognito: Option<bool>,
    pub device: Option<String>,
    pub user_agent: Option<String>,
    pub extra_headers: Option<Headers>,
    pub screenshot_on_failure: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SettingsOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_step_delay(mut self, ms: u64) -> Self {
        self.step_delay_ms = Some(ms);
        self
    }

    pub fn with_wait_timeout(mut self, ms: u64) -> Self {
        self.wait_timeout_ms = Some(ms);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
