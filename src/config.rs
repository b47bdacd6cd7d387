use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub localizer: LocalizerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `host:port` of the remote-framebuffer server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Interval between background samples.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Attempts made by a forced capture before giving up.
    #[serde(default = "default_capture_attempts")]
    pub capture_attempts: u32,
    #[serde(default = "default_capture_retry_delay_ms")]
    pub capture_retry_delay_ms: u64,
}

impl SessionConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn capture_retry_delay(&self) -> Duration {
        Duration::from_millis(self.capture_retry_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            password: default_password(),
            sample_interval_ms: default_sample_interval_ms(),
            capture_attempts: default_capture_attempts(),
            capture_retry_delay_ms: default_capture_retry_delay_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "127.0.0.1:5905".into()
}

fn default_password() -> String {
    "123456".into()
}

fn default_sample_interval_ms() -> u64 {
    1000
}

fn default_capture_attempts() -> u32 {
    10
}

fn default_capture_retry_delay_ms() -> u64 {
    200
}

/// A parsed `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PilotError::Config(format!("endpoint '{s}' is missing a port")))?;
        if host.is_empty() {
            return Err(PilotError::Config(format!("endpoint '{s}' is missing a host")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| PilotError::Config(format!("endpoint '{s}' has an invalid port: {e}")))?;
        Ok(Endpoint::new(host, port))
    }
}

// ── Localizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocalizerStrategy {
    /// Iterative grid narrowing with the grounding oracle.
    #[default]
    Grid,
    /// Single bounding-box query.
    Bbox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizerConfig {
    #[serde(default)]
    pub strategy: LocalizerStrategy,
    #[serde(default = "default_grid_dim")]
    pub rows: u32,
    #[serde(default = "default_grid_dim")]
    pub cols: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            strategy: LocalizerStrategy::default(),
            rows: default_grid_dim(),
            cols: default_grid_dim(),
            steps: default_steps(),
        }
    }
}

fn default_grid_dim() -> u32 {
    4
}

fn default_steps() -> u32 {
    2
}

// ── Executor ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Pause after each acting turn so the remote UI can settle.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_double_click_delay_ms")]
    pub double_click_delay_ms: u64,
    /// Upper bound on tool-calling rounds for one instruction.
    #[serde(default = "default_max_turns")]
    pub max_tool_rounds: u32,
}

impl ExecutorConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn double_click_delay(&self) -> Duration {
        Duration::from_millis(self.double_click_delay_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            settle_ms: default_settle_ms(),
            double_click_delay_ms: default_double_click_delay_ms(),
            max_tool_rounds: default_max_turns(),
        }
    }
}

fn default_max_turns() -> u32 {
    25
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_double_click_delay_ms() -> u64 {
    100
}

// ── Artifacts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Falls back to `<data_local_dir>/framepilot/artifacts`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self { enabled: true, dir: None }
    }
}

impl ArtifactsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| data_dir_or_cwd().join("artifacts"))
    }
}

/// `<data_local_dir>/framepilot`, falling back to the working directory.
pub fn data_dir_or_cwd() -> PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        return base.join("framepilot");
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

// ── LLM ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub api_base: String,
    /// Default model for this provider (used when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Used only when FRAMEPILOT_<ID>_API_KEY is unset.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Decides the next basic step or `complete`.
    pub planner: Option<RoleEntry>,
    /// Tool-calling model that performs one step.
    pub executor: Option<RoleEntry>,
    /// Picks a grid cell on an annotated screenshot.
    pub grounding: Option<RoleEntry>,
    /// Returns a bounding box for an element description.
    pub bbox: Option<RoleEntry>,
}

impl RolesConfig {
    pub fn entry(&self, role: OracleRole) -> Option<&RoleEntry> {
        match role {
            OracleRole::Planner => self.planner.as_ref(),
            OracleRole::Executor => self.executor.as_ref(),
            OracleRole::Grounding => self.grounding.as_ref(),
            OracleRole::Bbox => self.bbox.as_ref(),
        }
    }
}

/// The model-backed collaborators a task run talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleRole {
    Planner,
    Executor,
    Grounding,
    Bbox,
}

impl OracleRole {
    pub fn as_str(self) -> &'static str {
        match self {
            OracleRole::Planner => "planner",
            OracleRole::Executor => "executor",
            OracleRole::Grounding => "grounding",
            OracleRole::Bbox => "bbox",
        }
    }
}

impl std::fmt::Display for OracleRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    pub temperature: Option<f64>,
}

pub const DEFAULT_TEMPERATURE: f64 = 0.1;

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_true() -> bool {
    true
}

// ── Loading ──────────────────────────────────────────────────────────────────

fn resolve_config_path() -> PilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(PilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn parse_config(content: &str) -> PilotResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

pub fn load_config() -> PilotResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        endpoint = %config.session.endpoint,
        provider = %config.llm.active_provider,
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> PilotResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.session.endpoint, "127.0.0.1:5905");
        assert_eq!(cfg.session.capture_attempts, 10);
        assert_eq!(cfg.session.sample_interval(), Duration::from_secs(1));
        assert_eq!(cfg.localizer.strategy, LocalizerStrategy::Grid);
        assert_eq!((cfg.localizer.rows, cfg.localizer.cols, cfg.localizer.steps), (4, 4, 2));
        assert_eq!(cfg.executor.max_turns, 25);
        assert_eq!(cfg.executor.double_click_delay(), Duration::from_millis(100));
        assert!(cfg.artifacts.enabled);
    }

    #[test]
    fn parses_roles_and_overrides() {
        let cfg = parse_config(
            r#"
            [session]
            endpoint = "10.0.0.5:5901"
            sample_interval_ms = 250

            [localizer]
            strategy = "bbox"

            [llm]
            active_provider = "openai"

            [llm.providers.openai]
            api_base = "https://api.openai.com/v1/chat/completions"
            model = "gpt-4o"

            [llm.roles.grounding]
            provider = "openai"
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.session.sample_interval_ms, 250);
        assert_eq!(cfg.localizer.strategy, LocalizerStrategy::Bbox);
        assert_eq!(cfg.llm.providers["openai"].temperature, 0.1);
        let grounding = cfg.llm.roles.grounding.unwrap();
        assert_eq!(grounding.model, "gpt-4o-mini");
        assert!(!grounding.stream);
        assert!(cfg.llm.roles.planner.is_none());
    }

    #[test]
    fn endpoint_parsing() {
        let ep: Endpoint = "127.0.0.1:5905".parse().unwrap();
        assert_eq!(ep, Endpoint::new("127.0.0.1", 5905));
        assert_eq!(ep.to_string(), "127.0.0.1:5905");

        assert!("localhost".parse::<Endpoint>().is_err());
        assert!(":5900".parse::<Endpoint>().is_err());
        assert!("host:notaport".parse::<Endpoint>().is_err());
    }
}
