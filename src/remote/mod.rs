//! Remote script repository: traits consumed by the synchronizer and the
//! execution client, plus the wire types of the Smarthome Homescript API.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::ProjectDescriptor;

pub mod http;

/// Failure taxonomy of every remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("permission denied: please ensure that you have the correct access rights")]
    PermissionDenied,
    #[error("conflict: one or more automations depend on this homescript")]
    Conflict,
    #[error("the server rejected the request: the homescript does not exist or the data is invalid")]
    UnprocessableEntity,
    #[error("the server is currently unavailable")]
    ServiceUnavailable,
    #[error("could not connect to the server: {0}")]
    ConnectionFailed(String),
    #[error("server responded with unknown error: {0}")]
    Unknown(String),
}

/// Server-side twin of a local project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteScriptRecord {
    pub descriptor: ProjectDescriptor,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Execute,
    Lint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The server resolves the stored script.
    ById(String),
    /// The client supplies the full text; `filename` is only used for display.
    ByCode { code: String, filename: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub target: Target,
    pub args: HashMap<String, String>,
    pub mode: Mode,
}

impl ExecutionRequest {
    /// Name of the file the diagnostics of this request refer to.
    pub fn filename(&self) -> String {
        match &self.target {
            Target::ById(id) => format!("{id}.hms"),
            Target::ByCode { filename, .. } => filename.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub filename: String,
    pub line: usize,
    pub column: usize,
    #[serde(default)]
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceError {
    pub error_type: String,
    pub location: Location,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(alias = "exitcode")]
    pub exit_code: i32,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub errors: Vec<SourceError>,
}

impl ExecutionResult {
    /// A script-level failure is not a client error: the script ran (or was
    /// linted) and reported problems of its own.
    pub fn is_failure(&self) -> bool {
        !self.success || self.exit_code != 0
    }
}

/// CRUD + list against the remote script store.
#[async_trait]
pub trait ScriptRepository: Send + Sync {
    async fn create(&self, descriptor: &ProjectDescriptor) -> Result<(), RemoteError>;

    async fn get(&self, id: &str) -> Result<RemoteScriptRecord, RemoteError>;

    async fn modify(&self, descriptor: &ProjectDescriptor, code: &str) -> Result<(), RemoteError>;

    /// Fails with [`RemoteError::Conflict`] when an automation references the script.
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    /// All scripts visible to the current user.
    async fn list(&self) -> Result<Vec<RemoteScriptRecord>, RemoteError>;
}

/// Remote execution and linting.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RemoteError>;
}
