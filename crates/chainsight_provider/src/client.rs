use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context as _, Result};
use chainsight_domain::{Arguments, Environment, Error, ToolName, ToolResponse};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::decode;
use crate::offline;
use crate::request::JsonRpcRequest;

/// HTTP JSON-RPC protocol client. Holds no mutable session state other
/// than the next request id.
pub struct ProtocolClient {
    client: Client,
    base_url: Url,
    api_key: Option<HeaderValue>,
    timeout: std::time::Duration,
    retry_status_codes: Vec<u16>,
    offline: bool,
    next_id: AtomicU64,
}

impl ProtocolClient {
    pub fn new(env: &Environment) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(env.http.connect_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        let api_key = env
            .api_key
            .as_deref()
            .map(|key| {
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| Error::Configuration("API key is not a valid header value".to_string()))
            })
            .transpose()?;

        Ok(Self {
            client,
            base_url: env.base_url.clone(),
            api_key,
            timeout: std::time::Duration::from_millis(env.http.request_timeout_ms),
            retry_status_codes: env.retry.retry_status_codes.clone(),
            offline: env.offline,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        if let Some(ref key) = self.api_key {
            headers.insert(AUTHORIZATION, key.clone());
        }
        headers
    }

    /// Invokes a named remote tool. Transient failures come back wrapped in
    /// [`Error::Retryable`]; everything else is terminal for this attempt.
    pub async fn invoke(&self, name: &ToolName, arguments: Arguments) -> Result<ToolResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        if self.offline {
            debug!(tool = %name, id = %id, "Offline mode, serving local substitute");
            return Ok(offline::respond(id, name, &arguments));
        }

        let request = JsonRpcRequest::call(id, name.clone(), arguments);
        debug!(url = %self.base_url, tool = %name, id = %id, "Invoking remote tool");

        let response = self
            .client
            .post(self.base_url.clone())
            .headers(self.headers())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.classify_transport(err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", self.base_url))?;

        if !status.is_success() {
            return Err(self.classify_status(status, &body));
        }

        let reply = decode::decode_reply(&body)?;
        Ok(reply.into_response(id)?)
    }

    fn classify_transport(&self, err: reqwest::Error) -> anyhow::Error {
        if err.is_timeout() {
            return Error::Retryable(Error::Timeout(self.timeout).into()).into();
        }
        if err.is_connect() {
            return Error::Retryable(
                anyhow::Error::from(err)
                    .context(format!("Failed to connect to {}", self.base_url)),
            )
            .into();
        }
        anyhow::Error::from(err).context(format!("POST {} failed", self.base_url))
    }

    /// Authentication and not-found failures are terminal and carry a
    /// clarified message; statuses on the retry list are wrapped as
    /// retryable instead.
    fn classify_status(&self, status: StatusCode, body: &str) -> anyhow::Error {
        let code = status.as_u16();
        let reason = preview(body);
        match code {
            401 | 403 => Error::Auth(format!(
                "status {code}, check the configured API key: {reason}"
            ))
            .into(),
            404 => Error::NotFound(format!("{}: {reason}", self.base_url)).into(),
            code if self.retry_status_codes.contains(&code) => Error::Retryable(
                anyhow::Error::from(Error::InvalidStatusCode(code)).context(reason),
            )
            .into(),
            code => {
                anyhow::Error::from(Error::InvalidStatusCode(code)).context(reason)
            }
        }
    }
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "[empty body]".to_string();
    }
    trimmed.chars().take(200).collect()
}
