//! Generic HTTP endpoint adapter.
//!
//! Calls one configured URL per invocation. Provider-specific shaping is
//! limited to what the config expresses: query parameters, a JSON body and
//! an optional bearer token, all of which may reference `{input}`.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{fill_input, Adapter, StepContext};
use crate::domain::Payload;

/// Longest response excerpt included in an error message
const ERROR_BODY_EXCERPT: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Configuration for [`HttpAdapter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    /// Query parameters; values may contain `{input}`
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// JSON body for POST; string leaves may contain `{input}`
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Environment variable holding a bearer token
    #[serde(default)]
    pub bearer_token_env: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Connect timeout in seconds (the step timeout bounds the whole call)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

impl HttpConfig {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            query: BTreeMap::new(),
            body: None,
            bearer_token_env: None,
            headers: BTreeMap::new(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Adapter issuing one HTTP request per invocation
pub struct HttpAdapter {
    name: String,
    config: HttpConfig,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(name: impl Into<String>, config: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    fn bearer_token(&self) -> Result<Option<String>> {
        match &self.config.bearer_token_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .with_context(|| format!("Missing {} environment variable", var)),
            None => Ok(None),
        }
    }

    fn build_request(&self, input: &str) -> Result<reqwest::RequestBuilder> {
        let query: Vec<(String, String)> = self
            .config
            .query
            .iter()
            .map(|(k, v)| (k.clone(), fill_input(v, input)))
            .collect();

        let mut request = match self.config.method {
            HttpMethod::Get => self.client.get(&self.config.url),
            HttpMethod::Post => {
                let body = self
                    .config
                    .body
                    .as_ref()
                    .map(|b| fill_json(b, input))
                    .unwrap_or_else(|| serde_json::json!({ "input": input }));
                self.client.post(&self.config.url).json(&body)
            }
        };

        request = request.query(&query);

        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(token) = self.bearer_token()? {
            request = request.bearer_auth(token);
        }

        Ok(request)
    }

    async fn call(&self, input: &str) -> Result<Payload> {
        let response = self
            .build_request(input)?
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.config.url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", self.config.url))?;

        if !status.is_success() {
            anyhow::bail!(
                "{} returned {}: {}",
                self.config.url,
                status,
                excerpt(&text, ERROR_BODY_EXCERPT)
            );
        }

        let payload = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(data) => Payload::text(text).with_data(data),
            Err(_) => Payload::text(text),
        };
        Ok(payload)
    }
}

/// Replace `{input}` in every string leaf of a JSON value
fn fill_json(value: &serde_json::Value, input: &str) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::String(s) => Value::String(fill_input(s, input)),
        Value::Array(items) => Value::Array(items.iter().map(|v| fill_json(v, input)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), fill_json(v, input)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: StepContext) -> Result<Payload> {
        debug!(adapter = %self.name, url = %self.config.url, "Calling endpoint");

        tokio::select! {
            payload = self.call(&ctx.input) => payload,
            _ = ctx.cancelled() => anyhow::bail!("Request to {} cancelled", self.config.url),
        }
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .head(&self.config.url)
            .send()
            .await
            .with_context(|| format!("{} is unreachable", self.config.url))?;
        Ok(())
    }
}
