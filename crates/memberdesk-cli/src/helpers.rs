//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, config resolution and assembly of the
//! assistant services.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use memberdesk_assistant::config::AssistantConfig;
use memberdesk_assistant::{ModelGateway, OpenAiCompatibleClient, Orchestrator, ToolCatalog};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::remote_tool::remote_catalog;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "memberdesk.toml";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Resolve the effective configuration.
///
/// Order: built-in defaults, then the TOML file (explicit path or
/// `./memberdesk.toml`), then `MEMBERDESK_*` variables from the process
/// environment and `.env`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AssistantConfig> {
    if let Ok(env_path) = dotenvy::dotenv() {
        debug!(path = %env_path.display(), "loaded .env");
    }

    let file = path
        .map(Path::to_path_buf)
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()));

    let mut config = match &file {
        Some(file) => AssistantConfig::load(file)
            .with_context(|| format!("failed to load config from {}", file.display()))?,
        None => AssistantConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());
    config.validate().context("invalid configuration")?;

    let source = file
        .as_deref()
        .map_or_else(|| "defaults".to_owned(), |p| p.display().to_string());
    info!(
        config = %source,
        models = config.gateway.models.len(),
        tools_url = %config.tools.service_url,
        "configuration resolved"
    );
    Ok(config)
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// The long-lived parts shared by every conversation.
pub struct Services {
    pub gateway: Arc<ModelGateway>,
    pub catalog: Arc<ToolCatalog>,
}

impl Services {
    /// Build the model client, gateway and tool catalog.
    pub fn build(config: &AssistantConfig) -> anyhow::Result<Self> {
        let client = OpenAiCompatibleClient::new(config.client_config()).with_context(|| {
            format!(
                "no model API key; set {} or gateway.api_key",
                memberdesk_assistant::config::ENV_API_KEY
            )
        })?;
        let gateway = ModelGateway::new(Arc::new(client), config.gateway_config())
            .context("invalid gateway settings")?;
        let catalog = remote_catalog(config).context("failed to build tool catalog")?;

        Ok(Self {
            gateway: Arc::new(gateway),
            catalog: Arc::new(catalog),
        })
    }

    /// Start a fresh conversation.
    pub fn orchestrator(&self, config: &AssistantConfig) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.catalog),
            config.orchestrator_config(),
        )
    }
}
