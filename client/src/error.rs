//! Client error types.

use anchor_lang::error::{Error as AnchorError, ErrorCode as AnchorErrorCode, ERROR_CODE_OFFSET};
use confidential_gradebook::ErrorCode;
use thiserror::Error;

/// Everything a gradebook call can fail with, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradebookError {
    /// The caller failed the access policy.
    #[error("caller is not authorized for this operation")]
    Unauthorized,
    /// No grade is recorded for the caller.
    #[error("no grade recorded for this student")]
    NotFound,
    /// Malformed identity or grade, rejected before any call is made.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Encryption, sealing or session lookup failed.
    #[error("confidential session failed: {0}")]
    AdapterFailure(String),
    /// The previous grade submission has not been computed yet.
    #[error("another grade submission is still being computed")]
    SubmissionPending,
    /// Any other rejection from the gradebook program.
    #[error("gradebook program rejected the call: {0}")]
    Ledger(String),
}

impl From<ErrorCode> for GradebookError {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Unauthorized => Self::Unauthorized,
            ErrorCode::GradeNotFound => Self::NotFound,
            ErrorCode::SubmissionPending => Self::SubmissionPending,
            other => Self::Ledger(other.to_string()),
        }
    }
}

/// Anchor's own account checks. A student without a grade record fails
/// `view_my_grade` with `AccountNotInitialized` before the program runs.
impl From<AnchorErrorCode> for GradebookError {
    fn from(code: AnchorErrorCode) -> Self {
        match code {
            AnchorErrorCode::AccountNotInitialized => Self::NotFound,
            other => Self::Ledger(other.to_string()),
        }
    }
}

impl GradebookError {
    /// Maps an error returned by a gradebook instruction, whether raised by
    /// Anchor or by the program itself.
    pub fn from_anchor(error: &AnchorError) -> Self {
        let AnchorError::AnchorError(error) = error else {
            return Self::Ledger(error.to_string());
        };
        let code = error.error_code_number;
        if code == AnchorErrorCode::AccountNotInitialized as u32 {
            return AnchorErrorCode::AccountNotInitialized.into();
        }
        [ErrorCode::Unauthorized, ErrorCode::GradeNotFound, ErrorCode::SubmissionPending]
            .into_iter()
            .find(|known| ERROR_CODE_OFFSET + *known as u32 == code)
            .map_or_else(|| Self::Ledger(error.error_msg.clone()), Self::from)
    }
}
