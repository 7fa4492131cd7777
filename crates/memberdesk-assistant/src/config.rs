//! Assistant configuration.
//!
//! Settings come from an optional TOML file with `[gateway]`,
//! `[orchestrator]` and `[tools]` sections, every field defaulted, then from
//! `MEMBERDESK_*` environment variables.  The environment is read through a
//! lookup function so callers (and tests) decide where values come from.
//!
//! ```toml
//! [gateway]
//! models = ["meta-llama/llama-3.3-70b-instruct:free"]
//! min_request_delay_ms = 1000
//! max_rounds = 3
//!
//! [orchestrator]
//! history_window = 20
//!
//! [tools]
//! service_url = "http://localhost:3000/api/assistant/tools"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AssistantError, Result};
use crate::gateway::{DEFAULT_MODELS, GatewayConfig};
use crate::llm::client::{ClientConfig, DEFAULT_BASE_URL};
use crate::orchestrator::{DEFAULT_SYSTEM_PROMPT, MIN_HISTORY_WINDOW, OrchestratorConfig};

/// Bearer token for the model endpoint.
pub const ENV_API_KEY: &str = "MEMBERDESK_LLM_API_KEY";
/// Base URL of the model endpoint.
pub const ENV_BASE_URL: &str = "MEMBERDESK_LLM_BASE_URL";
/// Comma-separated candidate model list.
pub const ENV_MODELS: &str = "MEMBERDESK_LLM_MODELS";
/// Base URL of the tool service.
pub const ENV_TOOLS_URL: &str = "MEMBERDESK_TOOLS_URL";

const APP_NAME: &str = "memberdesk";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// `[gateway]`: model endpoint and resilience policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Usually left empty in the file and supplied via the environment.
    pub api_key: String,
    pub base_url: String,
    pub models: Vec<String>,
    pub min_request_delay_ms: u64,
    pub max_rounds: u32,
    pub round_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            models: DEFAULT_MODELS.iter().map(|m| (*m).to_owned()).collect(),
            min_request_delay_ms: 1_000,
            max_rounds: 3,
            round_backoff_ms: 2_000,
            request_timeout_secs: 60,
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

/// `[orchestrator]`: per-session turn settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// Overrides the built-in system prompt when set.
    pub system_prompt: Option<String>,
    pub history_window: usize,
    pub tool_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            system_prompt: None,
            history_window: 20,
            tool_timeout_secs: 15,
        }
    }
}

/// `[tools]`: where tool calls are executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// Base URL; each tool is reached at `{service_url}/{tool_name}`.
    pub service_url: String,
    /// Optional bearer token sent to the tool service.
    pub auth_token: Option<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:3000/api/assistant/tools".to_owned(),
            auth_token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Complete assistant configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub gateway: GatewaySection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
}

impl AssistantConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AssistantError::Config {
            reason: format!("invalid config: {e}"),
        })
    }

    /// Load and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AssistantError::Config {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), "loading assistant config");
        Self::from_toml_str(&raw)
    }

    /// Apply `MEMBERDESK_*` overrides obtained through `lookup`.
    ///
    /// Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.gateway.api_key = key;
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.gateway.base_url = url;
        }
        if let Some(list) = get(ENV_MODELS) {
            let models: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .collect();
            if !models.is_empty() {
                self.gateway.models = models;
            }
        }
        if let Some(url) = get(ENV_TOOLS_URL) {
            self.tools.service_url = url;
        }
    }

    /// Check values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.models.is_empty() {
            return Err(AssistantError::Config {
                reason: "gateway.models must list at least one model".into(),
            });
        }
        if self.gateway.max_rounds == 0 {
            return Err(AssistantError::Config {
                reason: "gateway.max_rounds must be at least 1".into(),
            });
        }
        if self.orchestrator.history_window < MIN_HISTORY_WINDOW {
            return Err(AssistantError::Config {
                reason: format!("orchestrator.history_window must be at least {MIN_HISTORY_WINDOW}"),
            });
        }
        if self.gateway.request_timeout_secs == 0 || self.orchestrator.tool_timeout_secs == 0 {
            return Err(AssistantError::Config {
                reason: "timeouts must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Settings for the HTTP model client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            app_name: Some(APP_NAME.to_owned()),
            ..ClientConfig::with_base_url(&self.gateway.api_key, &self.gateway.base_url)
        }
    }

    /// Settings for the [`crate::ModelGateway`].
    pub fn gateway_config(&self) -> GatewayConfig {
        let g = &self.gateway;
        GatewayConfig {
            models: g.models.clone(),
            min_request_delay: Duration::from_millis(g.min_request_delay_ms),
            max_rounds: g.max_rounds,
            round_backoff: Duration::from_millis(g.round_backoff_ms),
            request_timeout: Duration::from_secs(g.request_timeout_secs),
            temperature: Some(g.temperature),
            max_tokens: Some(g.max_tokens),
        }
    }

    /// Settings for each [`crate::Orchestrator`].
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let o = &self.orchestrator;
        OrchestratorConfig {
            system_prompt: o
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned()),
            history_window: o.history_window,
            tool_timeout: Duration::from_secs(o.tool_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_component_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.gateway_config(), GatewayConfig::default());
        assert_eq!(config.orchestrator_config(), OrchestratorConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AssistantConfig::from_toml_str(
            r#"
            [gateway]
            models = ["a/one:free", "b/two:free"]
            max_rounds = 5

            [orchestrator]
            history_window = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.models, ["a/one:free", "b/two:free"]);
        assert_eq!(config.gateway.max_rounds, 5);
        assert_eq!(config.gateway.min_request_delay_ms, 1_000);
        assert_eq!(config.orchestrator.history_window, 12);
        assert_eq!(config.tools, ToolsSection::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tools]\nservice_url = \"http://tools.internal\"").unwrap();
        let config = AssistantConfig::load(file.path()).unwrap();
        assert_eq!(config.tools.service_url, "http://tools.internal");
    }

    #[test]
    fn missing_or_malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = AssistantConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(AssistantError::Config { .. })));

        let bad = AssistantConfig::from_toml_str("[gateway]\nmax_rounds = \"three\"");
        assert!(matches!(bad, Err(AssistantError::Config { .. })));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = AssistantConfig::default();
        config.apply_env(env(&[
            (ENV_API_KEY, " sk-test "),
            (ENV_MODELS, "x/model-a, ,y/model-b"),
            (ENV_TOOLS_URL, "http://127.0.0.1:9000/tools"),
            (ENV_BASE_URL, ""),
        ]));
        assert_eq!(config.gateway.api_key, "sk-test");
        assert_eq!(config.gateway.models, ["x/model-a", "y/model-b"]);
        assert_eq!(config.tools.service_url, "http://127.0.0.1:9000/tools");
        assert_eq!(config.gateway.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let mut config = AssistantConfig::default();
        config.gateway.models.clear();
        assert!(config.validate().is_err());

        let mut config = AssistantConfig::default();
        config.orchestrator.history_window = MIN_HISTORY_WINDOW - 1;
        assert!(config.validate().is_err());

        config.orchestrator.history_window = MIN_HISTORY_WINDOW;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn client_config_carries_key_and_url() {
        let mut config = AssistantConfig::default();
        config.gateway.api_key = "sk-1".into();
        let client = config.client_config();
        assert_eq!(client.api_key, "sk-1");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.app_name.as_deref(), Some("memberdesk"));
    }
}
