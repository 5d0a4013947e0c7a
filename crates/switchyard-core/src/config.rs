use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};

/// Top-level switchyard configuration.
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub expense: ExpenseConfig,
    #[serde(default)]
    pub sales: SalesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_provider() -> String { "anthropic".to_string() }
fn default_model_id() -> String { "claude-3-5-sonnet-20241022".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

/// Step executor settings shared by every compiled graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum node invocations per run before it fails with a step budget error.
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,
    /// Optional upper bound on a single node invocation. None = unlimited.
    #[serde(default)]
    pub node_timeout_secs: Option<u64>,
    /// Keep a per-step record (input snapshot + update) in the run outcome.
    #[serde(default = "default_record_steps")]
    pub record_steps: bool,
}

impl ExecutorConfig {
    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            node_timeout_secs: None,
            record_steps: default_record_steps(),
        }
    }
}

fn default_step_budget() -> usize { 25 }
fn default_record_steps() -> bool { true }

/// Ambient monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sleep between feed polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Demo mode stops after one pass over the feed; otherwise it cycles forever.
    #[serde(default = "default_demo_mode")]
    pub demo_mode: bool,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            demo_mode: default_demo_mode(),
        }
    }
}

fn default_poll_interval_ms() -> u64 { 5000 }
fn default_demo_mode() -> bool { true }

/// Expense approval thresholds, in USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseConfig {
    #[serde(default = "default_auto_approve_limit")]
    pub auto_approve_limit: f64,
    #[serde(default = "default_auto_reject_limit")]
    pub auto_reject_limit: f64,
    /// How long the human approval step waits before giving up.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
}

impl Default for ExpenseConfig {
    fn default() -> Self {
        Self {
            auto_approve_limit: default_auto_approve_limit(),
            auto_reject_limit: default_auto_reject_limit(),
            approval_timeout_secs: default_approval_timeout(),
        }
    }
}

fn default_auto_approve_limit() -> f64 { 50.0 }
fn default_auto_reject_limit() -> f64 { 1000.0 }
fn default_approval_timeout() -> u64 { 300 }

/// Sales email pipeline billing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesConfig {
    #[serde(default = "default_cost_per_run")]
    pub cost_per_run: u64,
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            cost_per_run: default_cost_per_run(),
        }
    }
}

fn default_cost_per_run() -> u64 { 5 }

impl AppConfig {
    /// Load configuration from a TOML file, expanding `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text, expanding `${ENV_VAR}` references.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded)
            .map_err(|e| SwitchyardError::Config(e.to_string()))
    }

    /// Apply `POLL_INTERVAL_MS`, `DEMO_MODE` and `ANTHROPIC_API_KEY` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup("POLL_INTERVAL_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            if ms > 0 {
                self.monitor.poll_interval_ms = ms;
            }
        }
        if let Some(mode) = lookup("DEMO_MODE") {
            self.monitor.demo_mode = mode.trim() != "false";
        }
        if self.model.api_key.is_none() {
            self.model.api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty());
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SwitchyardError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep the reference if the variable is unset
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
