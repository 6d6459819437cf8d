//! Exit code constants and error mapping for the `syllabus` binary.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CONFIG` | Invalid CLI arguments or configuration |
//! | 3 | `WORKFLOW_FAILED` | The workflow ended in `failed` |
//! | 4 | `NOT_FOUND` | No record for the requested workflow |
//! | 5 | `CONFLICT` | Conditional writes kept losing races |

use crate::error::{CoordinatorError, SyllabusError};

/// Process exit code.
///
/// The numeric values are part of the public API.
///
/// # Example
///
/// ```rust
/// use syllabus_utils::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(3), ExitCode::WORKFLOW_FAILED);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Configuration or argument error
    pub const CONFIG: ExitCode = ExitCode(2);

    /// Workflow reached the `failed` tag
    pub const WORKFLOW_FAILED: ExitCode = ExitCode(3);

    /// Workflow record missing or expired
    pub const NOT_FOUND: ExitCode = ExitCode(4);

    /// Conflict retries exhausted
    pub const CONFLICT: ExitCode = ExitCode(5);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.0
    }
}

impl SyllabusError {
    /// Map this error to the process exit code reported by the CLI.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::WorkflowId(_) | Self::Executor(_) => ExitCode::CONFIG,
            Self::WorkflowFailed { .. } | Self::WorkflowStalled { .. } => {
                ExitCode::WORKFLOW_FAILED
            }
            Self::Coordinator(CoordinatorError::NotFound { .. }) => ExitCode::NOT_FOUND,
            Self::Coordinator(CoordinatorError::ConflictRetriesExhausted { .. }) => {
                ExitCode::CONFLICT
            }
            Self::Coordinator(
                CoordinatorError::InvalidTransition { .. } | CoordinatorError::NotAllowed { .. },
            ) => ExitCode::CONFIG,
            Self::Coordinator(_) | Self::Store(_) | Self::Effect(_) | Self::Io(_) => {
                ExitCode::INTERNAL
            }
        }
    }
}
