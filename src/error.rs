use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::access::{Capability, Role};

/// Failures surfaced to the operator. None of them are fatal to the process.
#[derive(Error, Debug)]
pub enum DeskError {
    /// Required field missing or malformed input. Nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// Completion attempted before the contract is due.
    #[error("maintenance cannot be completed before {earliest}")]
    PrematureCompletion { earliest: NaiveDate },

    #[error("storage error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("contract {id} not found")]
    NotFound { id: Uuid },

    /// The row changed between read and write.
    #[error("contract {id} was modified concurrently, reload and retry")]
    Conflict { id: Uuid },

    #[error("role {role} lacks the {capability} capability")]
    Forbidden { role: Role, capability: Capability },
}

pub type Result<T> = std::result::Result<T, DeskError>;

impl DeskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Rejections the operator can fix and retry.
    pub fn is_user_correctable(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }

    /// Only storage failures are worth retrying, and only for reads.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Persistence(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Protocol(_)
            )
        )
    }
}
