//! Tool handlers backed by the dashboard's tool service.
//!
//! Every dashboard tool is served at `POST {service_url}/{tool_name}`.  The
//! request body is the JSON argument object; a 2xx response body is the tool
//! result.  Anything else becomes a [`ToolError`] the model gets to see.

use std::sync::Arc;

use async_trait::async_trait;
use memberdesk_assistant::config::AssistantConfig;
use memberdesk_assistant::{ToolArguments, ToolCatalog, ToolError, ToolHandler, dashboard_catalog};
use serde_json::Value;
use tracing::debug;

/// Error bodies longer than this are cut.
const MAX_ERROR_BODY: usize = 300;

/// Calls one tool endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteToolHandler {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl RemoteToolHandler {
    /// Create a handler for `tool` under `service_url`.
    pub fn new(
        client: reqwest::Client,
        service_url: &str,
        tool: &str,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            client,
            url: format!("{}/{}", service_url.trim_end_matches('/'), tool),
            auth_token,
        }
    }

    /// The endpoint this handler posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ToolHandler for RemoteToolHandler {
    async fn execute(&self, arguments: ToolArguments) -> Result<Value, ToolError> {
        let mut request = self.client.post(&self.url).json(&Value::Object(arguments));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::failed(format!("tool service unreachable: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::failed(format!("failed to read tool response: {e}")))?;

        debug!(url = %self.url, status = status.as_u16(), body_length = body.len(), "tool service responded");

        if !status.is_success() {
            let mut snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            if body.chars().count() > MAX_ERROR_BODY {
                snippet.push_str("...");
            }
            return Err(ToolError::failed(format!(
                "tool service returned {}: {snippet}",
                status.as_u16()
            )));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ToolError::failed(format!("tool service returned invalid JSON: {e}")))
    }
}

/// Build the dashboard catalog with every tool served by the tool service.
pub fn remote_catalog(config: &AssistantConfig) -> anyhow::Result<ToolCatalog> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("memberdesk/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let tools = &config.tools;

    let catalog = dashboard_catalog(|name| -> Arc<dyn ToolHandler> {
        Arc::new(RemoteToolHandler::new(
            client.clone(),
            &tools.service_url,
            name,
            tools.auth_token.clone(),
        ))
    })?;
    Ok(catalog)
}
