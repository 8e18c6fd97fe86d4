//! Remote execution and linting, by id or by code.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use owo_colors::OwoColorize;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::printer::{ErrorPresenter, PresentError, TextPrinter};
use crate::project::ProjectError;
use crate::remote::{
    ExecutionRequest, ExecutionResult, Mode, RemoteError, ScriptExecutor, ScriptRepository, Target,
};
use crate::spinner::Progress;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("Bad Homescript argument formatting at position {index}: '{arg}' does not contain the ':' separator")]
    MissingSeparator { index: usize, arg: String },
    #[error("Bad Homescript argument formatting at position {index}: '{arg}' contains more than one ':' separator")]
    MultipleSeparators { index: usize, arg: String },
}

/// Parses `key:value` arguments. Every argument must hold exactly one `:`.
pub fn parse_args(raw: &[String]) -> Result<HashMap<String, String>, ArgError> {
    let mut args = HashMap::with_capacity(raw.len());
    for (index, arg) in raw.iter().enumerate() {
        let mut parts = arg.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => {
                args.insert(key.to_string(), value.to_string());
            }
            (_, None, _) => return Err(ArgError::MissingSeparator { index, arg: arg.clone() }),
            _ => return Err(ArgError::MultipleSeparators { index, arg: arg.clone() }),
        }
    }
    Ok(args)
}

/// Display name of code passed through `hms pipe`.
pub const PIPE_FILENAME: &str = "pipe";

/// Execution request for a standalone script file outside of any project.
pub fn file_request(path: &Path, args: HashMap<String, String>) -> Result<ExecutionRequest, ProjectError> {
    let code = fs::read_to_string(path).map_err(|source| ProjectError::Io {
        context: "failed to read homescript file",
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(ExecutionRequest { target: Target::ByCode { code, filename }, args, mode: Mode::Execute })
}

/// Execution request for code given on the command line, one line per argument.
pub fn pipe_request(lines: &[String]) -> ExecutionRequest {
    ExecutionRequest {
        target: Target::ByCode { code: lines.join("\n"), filename: PIPE_FILENAME.to_string() },
        args: HashMap::new(),
        mode: Mode::Execute,
    }
}

pub struct ExecutionClient<'a, R: ?Sized> {
    remote: &'a R,
    username: String,
    progress: Progress,
}

impl<'a, R> ExecutionClient<'a, R>
where
    R: ScriptRepository + ScriptExecutor + ?Sized,
{
    pub fn new(remote: &'a R, username: impl Into<String>) -> Self {
        Self { remote, username: username.into(), progress: Progress::hidden() }
    }

    /// Shows a progress indicator while a request is pending.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub async fn submit(&self, request: &ExecutionRequest) -> Result<Execution, ClientError> {
        let filename = request.filename();
        debug!(file = %filename, mode = ?request.mode, "submitting homescript");

        let label = match request.mode {
            Mode::Execute => "Executing Homescript",
            Mode::Lint => "Linting Homescript",
        };
        let outcome = self.progress.decorate(label, self.remote.execute(request)).await;
        let mut result = outcome.map_err(|err| self.map_error(request.mode, err))?;

        for err in &mut result.errors {
            err.location.filename = filename.clone();
        }

        let source = if result.is_failure() && !result.errors.is_empty() {
            Some(self.source_for(&request.target).await?)
        } else {
            None
        };

        info!(file = %filename, exit_code = result.exit_code, "homescript finished");
        Ok(Execution { mode: request.mode, filename, result, source })
    }

    async fn source_for(&self, target: &Target) -> Result<String, ClientError> {
        match target {
            Target::ByCode { code, .. } => Ok(code.clone()),
            // The server may hold a newer version than any local copy.
            Target::ById(id) => {
                let record = self.remote.get(id).await.map_err(ClientError::SourceUnavailable)?;
                Ok(record.code)
            }
        }
    }

    fn map_error(&self, mode: Mode, err: RemoteError) -> ClientError {
        match err {
            RemoteError::PermissionDenied => ClientError::PermissionDenied { username: self.username.clone() },
            other => {
                let context = match mode {
                    Mode::Execute => "Failed to run homescript",
                    Mode::Lint => "Failed to lint homescript",
                };
                ClientError::remote(context)(other)
            }
        }
    }
}

/// A finished run or lint together with the source its diagnostics refer to.
#[derive(Debug, Clone)]
pub struct Execution {
    pub mode: Mode,
    pub filename: String,
    pub result: ExecutionResult,
    pub source: Option<String>,
}

impl Execution {
    pub fn is_failure(&self) -> bool {
        self.result.is_failure()
    }

    /// Exit code of the process: the script's own, or 1 when the server
    /// reported a failure without one.
    pub fn exit_code(&self) -> i32 {
        match (self.is_failure(), self.result.exit_code) {
            (true, 0) => 1,
            (_, code) => code,
        }
    }

    pub fn summary(&self) -> Option<String> {
        match (self.mode, self.is_failure()) {
            (Mode::Execute, false) => None,
            (Mode::Execute, true) => Some(format!(
                "Error: Program terminated abnormally with exit-code {}",
                self.exit_code()
            )),
            (Mode::Lint, true) => Some(format!("FAIL: linting discovered problems in '{}':", self.filename)),
            (Mode::Lint, false) => Some(format!("PASS: linting discovered no problems in '{}'", self.filename)),
        }
    }

    /// All reported errors, each anchored in the source when possible.
    pub fn diagnostics(&self, styled: bool) -> String {
        let presenter = ErrorPresenter::new(styled);
        let mut out = String::new();
        for err in &self.result.errors {
            let rendered = match self.source.as_deref().map(|src| presenter.render(err, src)) {
                Some(Ok(text)) => text,
                Some(Err(PresentError::MalformedLocation { line, available })) => {
                    debug!(line, available, "error location outside of source");
                    presenter.render_without_context(err)
                }
                None => presenter.render_without_context(err),
            };
            out.push_str(&rendered);
            out.push('\n');
        }
        out
    }

    /// Everything shown for this execution. A failed run shows its header
    /// and diagnostics but not the partial output.
    pub fn report(&self, printer: &TextPrinter) -> String {
        let mut out = String::new();
        let output = self.result.output.trim_end();
        if !self.is_failure() && !output.is_empty() {
            out.push_str(&printer.paint_output(output));
            out.push('\n');
        }
        if let Some(summary) = self.summary() {
            if self.is_failure() {
                out.push_str(&printer.paint_failure(&summary));
            } else {
                out.push_str(&printer.paint_success(&summary));
            }
            out.push('\n');
        }
        if self.is_failure() {
            out.push_str(&self.diagnostics(printer.styled));
        }
        out
    }

    pub fn print(&self, printer: &TextPrinter) {
        print!("{}", self.report(printer));
    }
}

/// Elapsed-time footer printed after `run` and `lint`.
pub fn timing_line(mode: Mode, elapsed: std::time::Duration, styled: bool) -> String {
    let verb = match mode {
        Mode::Execute => "Executed",
        Mode::Lint => "Linted",
    };
    let text = format!("{verb} in {:.2?}", elapsed);
    if styled {
        format!("{}", text.bright_black())
    } else {
        text
    }
}
