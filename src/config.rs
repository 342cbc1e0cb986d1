//! Service configuration loading.
//!
//! Reads `config/copilot.yaml` and resolves environment variables.
//! Every field has a default, so a missing file still yields a runnable
//! service; the completion call then fails with `no_api_key`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while reading or parsing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `config/copilot.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    pub server: ServerConfig,
    pub completion: CompletionConfig,
    pub analytics: AnalyticsConfig,
    pub cache: CacheConfig,
    pub anomaly: AnomalyThresholds,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP surface binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".into(),
        }
    }
}

/// Completion Service endpoint and model selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    /// Empty or absent means "not configured".
    pub api_key: Option<String>,
    pub model: String,
    /// Model used by the planner stage. Falls back to `model` when unset.
    pub planner_model: Option<String>,
    pub max_output_tokens: u32,
    pub planner_max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4.1-mini".into(),
            planner_model: None,
            max_output_tokens: 2000,
            planner_max_output_tokens: 400,
            timeout_secs: 60,
        }
    }
}

impl CompletionConfig {
    pub fn planner_model(&self) -> &str {
        self.planner_model.as_deref().unwrap_or(&self.model)
    }
}

/// GA4 Data API and Search Console access.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// OAuth bearer token shared by both Google APIs.
    pub access_token: Option<String>,
    pub ga4_base_url: String,
    pub search_console_base_url: String,
    pub timeout_secs: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            ga4_base_url: "https://analyticsdata.googleapis.com/v1beta".into(),
            search_console_base_url: "https://www.googleapis.com/webmasters/v3".into(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// SQLite file. Defaults to `<data_dir>/cache.db`.
    pub path: Option<String>,
    pub enrichment_ttl_secs: u64,
    pub flexible_ttl_secs: u64,
    pub digest_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: None,
            enrichment_ttl_secs: 7200,
            flexible_ttl_secs: 7200,
            digest_ttl_secs: 14400,
        }
    }
}

impl CacheConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        match &self.path {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => crate::data_dir().join("cache.db"),
        }
    }
}

/// Product-tuned anomaly thresholds. Rates are fractions (0.05 = 5%).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub spike_multiplier: f64,
    pub spike_min_sessions: f64,
    pub dominant_share: f64,
    pub dominant_max_engagement: f64,
    pub bot_max_engagement: f64,
    pub bot_max_duration_secs: f64,
    pub bot_min_sessions: f64,
    pub high_bounce_rate: f64,
    pub high_bounce_min_sessions: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            spike_multiplier: 5.0,
            spike_min_sessions: 10.0,
            dominant_share: 0.5,
            dominant_max_engagement: 0.10,
            bot_max_engagement: 0.05,
            bot_max_duration_secs: 3.0,
            bot_min_sessions: 10.0,
            high_bounce_rate: 0.95,
            high_bounce_min_sessions: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// End-to-end budget for one chat request.
    pub request_timeout_secs: u64,
    pub planner_timeout_secs: u64,
    /// Number of trailing history messages forwarded to the model.
    pub history_limit: usize,
    pub max_enrichment_queries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 90,
            planner_timeout_secs: 20,
            history_limit: 50,
            max_enrichment_queries: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string. `RUST_LOG` takes precedence.
    pub level: String,
    /// Also write a rotated `copilot.log` in the data directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "traffic_copilot=info,warn".into(),
            file: true,
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

const CONFIG_RELATIVE_PATH: &str = "config/copilot.yaml";

/// Locate the configuration file.
///
/// Checks `TRAFFIC_COPILOT_CONFIG` first, then searches upward from `start`
/// for `config/copilot.yaml`.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var("TRAFFIC_COPILOT_CONFIG") {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load and parse a configuration file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_config(path: &Path) -> Result<CopilotConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config(&raw)
}

/// Parse configuration text. An empty document yields the defaults.
pub fn parse_config(raw: &str) -> Result<CopilotConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(CopilotConfig::default());
    }
    let mut config: CopilotConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;

    // `${OPENAI_API_KEY}` with the variable unset interpolates to "".
    if config.completion.api_key.as_deref().is_some_and(str::is_empty) {
        config.completion.api_key = None;
    }
    if config.analytics.access_token.as_deref().is_some_and(str::is_empty) {
        config.analytics.access_token = None;
    }
    Ok(config)
}

/// Find and load the configuration, falling back to defaults when no file
/// exists.
pub fn load_or_default(start: &Path) -> Result<CopilotConfig, ConfigError> {
    match find_config_path(start) {
        Some(path) => load_config(&path),
        None => Ok(CopilotConfig::default()),
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
