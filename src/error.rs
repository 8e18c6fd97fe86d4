//! Client-side error taxonomy and the process exit code each error maps to.

use thiserror::Error;

use crate::exec::ArgError;
use crate::project::ProjectError;
use crate::remote::RemoteError;

pub const EXIT_LOCAL: i32 = 1;
pub const EXIT_VALIDATION: i32 = 2;
pub const EXIT_PERMISSION_DENIED: i32 = 403;
pub const EXIT_REMOTE: i32 = 99;
pub const EXIT_SOURCE_UNAVAILABLE: i32 = 255;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// A remote call failed; `context` names the operation in progress.
    #[error("{context}")]
    Remote {
        context: &'static str,
        #[source]
        source: RemoteError,
    },

    #[error("Permission denied: you ({username}) do not have the permission (homescript) which is required to use Homescript")]
    PermissionDenied { username: String },

    #[error(transparent)]
    Argument(#[from] ArgError),

    #[error("could not download remote code for error display")]
    SourceUnavailable(#[source] RemoteError),

    /// Local files were removed but the remote object could not be purged.
    #[error("failed to remove project `{id}` from remote (local files are already deleted)")]
    PurgeFailed {
        id: String,
        #[source]
        source: RemoteError,
    },

    /// The remote create failed and the new local project could not be deleted again.
    #[error("Failed to create remote project (the local project could not be reverted: {revert})")]
    RevertFailed {
        revert: ProjectError,
        #[source]
        source: RemoteError,
    },

    #[error("cloned {cloned} projects, {failed} failed")]
    CloneIncomplete { cloned: usize, failed: usize },
}

impl ClientError {
    pub fn remote(context: &'static str) -> impl FnOnce(RemoteError) -> ClientError {
        move |source| ClientError::Remote { context, source }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Project(_) | ClientError::CloneIncomplete { .. } => EXIT_LOCAL,
            ClientError::Argument(_) => EXIT_VALIDATION,
            ClientError::PermissionDenied { .. } => EXIT_PERMISSION_DENIED,
            ClientError::Remote { source, .. }
            | ClientError::PurgeFailed { source, .. }
            | ClientError::RevertFailed { source, .. } => match source {
                RemoteError::PermissionDenied => EXIT_PERMISSION_DENIED,
                _ => EXIT_REMOTE,
            },
            ClientError::SourceUnavailable(_) => EXIT_SOURCE_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(ClientError::from(ProjectError::NotAProject(PathBuf::from("."))).exit_code(), EXIT_LOCAL);
        assert_eq!(
            ClientError::from(ArgError::MissingSeparator { index: 0, arg: "x".into() }).exit_code(),
            EXIT_VALIDATION
        );
        assert_eq!(ClientError::PermissionDenied { username: "admin".into() }.exit_code(), 403);
        assert_eq!(ClientError::remote("push")(RemoteError::PermissionDenied).exit_code(), 403);
        assert_eq!(ClientError::remote("push")(RemoteError::Conflict).exit_code(), EXIT_REMOTE);
        assert_eq!(ClientError::SourceUnavailable(RemoteError::ServiceUnavailable).exit_code(), 255);
    }

    #[test]
    fn remote_errors_chain_their_cause() {
        let err = anyhow::Error::new(ClientError::remote("Failed to pull remote state")(RemoteError::Conflict));
        assert_eq!(
            format!("{err:#}"),
            "Failed to pull remote state: conflict: one or more automations depend on this homescript"
        );
    }

    #[test]
    fn failed_revert_reports_both_errors() {
        let err = ClientError::RevertFailed {
            revert: ProjectError::AlreadyExists(PathBuf::from("lamp")),
            source: RemoteError::PermissionDenied,
        };
        assert_eq!(err.exit_code(), 403);
        let text = format!("{:#}", anyhow::Error::new(err));
        assert!(text.starts_with("Failed to create remote project"), "got {text}");
        assert!(text.contains("`lamp`"), "got {text}");
        assert!(text.ends_with(&RemoteError::PermissionDenied.to_string()), "got {text}");
    }
}
