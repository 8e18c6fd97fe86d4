//! Reqwest-based client for the Smarthome Homescript API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    ExecutionRequest, ExecutionResult, Mode, RemoteError, RemoteScriptRecord, ScriptExecutor,
    ScriptRepository, Target,
};
use crate::config::Config;
use crate::project::ProjectDescriptor;

/// One authenticated session against a Smarthome server. Constructed once per
/// invocation and handed to every component that talks to the remote.
#[derive(Debug)]
pub struct SmarthomeClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    request_timeout: Duration,
    execute_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HomescriptData {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    quick_actions_enabled: bool,
    #[serde(default)]
    scheduler_enabled: bool,
    #[serde(default)]
    code: String,
    #[serde(default)]
    md_icon: String,
}

impl HomescriptData {
    fn new(descriptor: &ProjectDescriptor, code: &str) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            quick_actions_enabled: descriptor.quick_actions_enabled,
            scheduler_enabled: descriptor.scheduler_enabled,
            code: code.to_string(),
            md_icon: descriptor.icon.clone(),
        }
    }

    fn into_record(self) -> RemoteScriptRecord {
        RemoteScriptRecord {
            descriptor: ProjectDescriptor {
                id: self.id,
                name: self.name,
                description: self.description,
                quick_actions_enabled: self.quick_actions_enabled,
                scheduler_enabled: self.scheduler_enabled,
                icon: self.md_icon,
            },
            code: self.code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HomescriptEnvelope {
    data: HomescriptData,
}

#[derive(Debug, Serialize)]
struct Argument<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct RunBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    args: Vec<Argument<'a>>,
}

impl SmarthomeClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.server_url(),
            username: cfg.username(),
            request_timeout: cfg.request_timeout(),
            execute_timeout: cfg.execute_timeout(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticates the session; the server answers with a session cookie
    /// that the cookie store attaches to every later request.
    pub async fn login(&self, password: &str) -> Result<(), RemoteError> {
        debug!(url = %self.base_url, user = %self.username, "logging in");
        let body = LoginRequest { username: &self.username, password };
        let resp = self
            .request(Method::POST, "/api/login", self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(resp).await.map(|_| ())
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(timeout)
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<reqwest::Response, RemoteError> {
        debug!(%method, path, "sending request");
        let resp = self
            .request(method, path, timeout)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        debug!(path, "fetching");
        let resp = self
            .request(Method::GET, path, self.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        decode(check_status(resp).await?).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(%status, "server rejected request");
    Err(map_http_status(status, &body))
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RemoteError> {
    resp.json::<T>()
        .await
        .map_err(|e| RemoteError::Unknown(format!("invalid response body: {e}")))
}

/// Map an HTTP status code from the Smarthome server to a [`RemoteError`].
pub(crate) fn map_http_status(status: StatusCode, body: &str) -> RemoteError {
    match status.as_u16() {
        401 | 403 => RemoteError::PermissionDenied,
        409 => RemoteError::Conflict,
        422 => RemoteError::UnprocessableEntity,
        503 => RemoteError::ServiceUnavailable,
        _ => RemoteError::Unknown(format!("HTTP {status}: {}", body.trim())),
    }
}

/// Map a [`reqwest::Error`] raised before any response arrived.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::ConnectionFailed("request timed out".into())
    } else if err.is_connect() || err.is_request() {
        RemoteError::ConnectionFailed(err.to_string())
    } else {
        RemoteError::Unknown(err.to_string())
    }
}

#[async_trait]
impl ScriptRepository for SmarthomeClient {
    async fn create(&self, descriptor: &ProjectDescriptor) -> Result<(), RemoteError> {
        let body = HomescriptData::new(descriptor, "");
        self.send_json(Method::POST, "/api/homescript/add", &body, self.request_timeout)
            .await
            .map(|_| ())
    }

    async fn get(&self, id: &str) -> Result<RemoteScriptRecord, RemoteError> {
        let envelope: HomescriptEnvelope = self.get_json(&format!("/api/homescript/get/{id}")).await?;
        Ok(envelope.data.into_record())
    }

    async fn modify(&self, descriptor: &ProjectDescriptor, code: &str) -> Result<(), RemoteError> {
        let body = HomescriptData::new(descriptor, code);
        self.send_json(Method::PUT, "/api/homescript/edit", &body, self.request_timeout)
            .await
            .map(|_| ())
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let body = serde_json::json!({ "id": id });
        self.send_json(Method::DELETE, "/api/homescript/delete", &body, self.request_timeout)
            .await
            .map(|_| ())
    }

    async fn list(&self) -> Result<Vec<RemoteScriptRecord>, RemoteError> {
        let scripts: Vec<HomescriptEnvelope> = self.get_json("/api/homescript/list/personal").await?;
        Ok(scripts.into_iter().map(|s| s.data.into_record()).collect())
    }
}

#[async_trait]
impl ScriptExecutor for SmarthomeClient {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RemoteError> {
        let (path, id, code) = match (&request.target, request.mode) {
            (Target::ById(id), Mode::Execute) => ("/api/homescript/run", Some(id.as_str()), None),
            (Target::ById(id), Mode::Lint) => ("/api/homescript/lint", Some(id.as_str()), None),
            (Target::ByCode { code, .. }, Mode::Execute) => ("/api/homescript/run/live", None, Some(code.as_str())),
            (Target::ByCode { code, .. }, Mode::Lint) => ("/api/homescript/lint/live", None, Some(code.as_str())),
        };
        let timeout = match request.mode {
            Mode::Execute => self.execute_timeout,
            Mode::Lint => self.request_timeout,
        };
        let mut args: Vec<Argument<'_>> = request
            .args
            .iter()
            .map(|(key, value)| Argument { key, value })
            .collect();
        args.sort_by(|a, b| a.key.cmp(b.key));

        let resp = self
            .send_json(Method::POST, path, &RunBody { id, code, args }, timeout)
            .await?;
        decode(resp).await
    }
}
