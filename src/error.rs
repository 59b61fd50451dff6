//! Error types for the command provider.

use thiserror::Error;

use crate::exec::ExecError;
use crate::schema::SchemaError;
use crate::types::Phase;
use crate::validation::DecodeError;

/// Errors that can occur while serving a phase call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource type is not implemented by this provider.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The inputs do not fit the expected shape, or are not known yet.
    #[error("Validation error: {0}")]
    Validation(#[from] DecodeError),

    /// A record declaration is broken.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A phase that requires a command has none.
    #[error("{0} command is not specified")]
    CommandUnspecified(Phase),

    /// The phase's command ran and exited non-zero.
    #[error("{phase} command exited with code {exit_code}: {stderr}")]
    CommandFailed {
        /// The phase whose command failed.
        phase: Phase,
        /// The process exit code, `-1` when killed by a signal.
        exit_code: i32,
        /// The captured stderr.
        stderr: String,
    },

    /// The command could not be run.
    #[error("Execution error: {0}")]
    Execution(ExecError),

    /// The provider was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether this error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ExecError> for ProviderError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Cancelled => Self::Cancelled,
            other => Self::Execution(other),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        let msg = err.to_string();
        match err {
            ProviderError::UnknownResource(_) => tonic::Status::not_found(msg),
            ProviderError::InvalidRequest(_) => tonic::Status::invalid_argument(msg),
            ProviderError::Validation(DecodeError::Unresolved { .. }) => {
                tonic::Status::failed_precondition(msg)
            },
            ProviderError::Validation(_) => tonic::Status::invalid_argument(msg),
            ProviderError::Schema(_) => tonic::Status::internal(msg),
            ProviderError::CommandUnspecified(_) => tonic::Status::invalid_argument(msg),
            ProviderError::CommandFailed { .. } => tonic::Status::aborted(msg),
            ProviderError::Execution(_) => tonic::Status::unavailable(msg),
            ProviderError::Cancelled => tonic::Status::cancelled(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::CheckFailure;

    #[test]
    fn test_error_display() {
        let err = ProviderError::UnknownResource("command:v1:Other".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: command:v1:Other");

        let err = ProviderError::CommandUnspecified(Phase::Create);
        assert_eq!(format!("{}", err), "create command is not specified");

        let err = ProviderError::CommandFailed {
            phase: Phase::Update,
            exit_code: 2,
            stderr: "no such file".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "update command exited with code 2: no such file"
        );
    }

    #[test]
    fn test_validation_display_includes_path() {
        let err: ProviderError =
            DecodeError::Failure(CheckFailure::missing_required("create.command", "command"))
                .into();
        assert_eq!(
            format!("{}", err),
            "Validation error: create.command: missing required property command"
        );
    }

    #[test]
    fn test_exec_cancellation_converts() {
        let err: ProviderError = ExecError::Cancelled.into();
        assert!(err.is_cancelled());

        let err: ProviderError = ExecError::EmptyCommand.into();
        assert!(matches!(err, ProviderError::Execution(ExecError::EmptyCommand)));
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status = ProviderError::UnknownResource("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = ProviderError::InvalidRequest("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = ProviderError::Validation(DecodeError::Failure(
            CheckFailure::invalid("create.command", "command must not be empty"),
        ))
        .into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = ProviderError::Validation(DecodeError::Unresolved {
            path: "create".to_string(),
        })
        .into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status =
            ProviderError::Schema(SchemaError::UnsupportedShape("chan".to_string())).into();
        assert_eq!(status.code(), tonic::Code::Internal);

        let status: tonic::Status = ProviderError::CommandFailed {
            phase: Phase::Delete,
            exit_code: 1,
            stderr: String::new(),
        }
        .into();
        assert_eq!(status.code(), tonic::Code::Aborted);

        let status: tonic::Status = ProviderError::Execution(ExecError::EmptyCommand).into();
        assert_eq!(status.code(), tonic::Code::Unavailable);

        let status: tonic::Status = ProviderError::Cancelled.into();
        assert_eq!(status.code(), tonic::Code::Cancelled);
    }

    #[test]
    fn test_status_message_keeps_stderr() {
        let status: tonic::Status = ProviderError::CommandFailed {
            phase: Phase::Create,
            exit_code: 3,
            stderr: "disk full".to_string(),
        }
        .into();
        assert!(status.message().contains("disk full"));
    }
}
