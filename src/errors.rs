//! Unified error type for the IQ-coin service.
//!
//! Every fallible operation in `core` returns [`Result`]. The variants split into
//! caller mistakes (validation, authorization, missing records) that are reported
//! back to the user with no state change, and infrastructure failures (database,
//! I/O) that abort the current request.

use crate::entities::profile::Role;
use sea_orm::DbErr;
use thiserror::Error;

/// All errors produced by the service.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying database failure; the surrounding atomic scope is rolled back.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Human readable explanation
        message: String,
    },

    /// Malformed input other than amounts (empty names, negative target balance, ...).
    #[error("Validation error: {message}")]
    Validation {
        /// Human readable explanation
        message: String,
    },

    /// Ledger amounts must be positive (and under the configured cap, if any).
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// Deduction larger than the current balance.
    #[error("Insufficient balance: current {current}, required {required}")]
    InsufficientBalance {
        /// Balance at the time of the request
        current: i64,
        /// Amount that was requested
        required: i64,
    },

    /// Deductions must carry a non-empty comment.
    #[error("A comment is required for deductions")]
    CommentRequired,

    /// Only AWARD transactions may be edited after creation.
    #[error("Transaction {id} is not an award and cannot be edited")]
    NotEditable {
        /// Transaction id
        id: i64,
    },

    /// Student does not exist or is outside the caller's scope.
    #[error("Student not found: {id}")]
    StudentNotFound {
        /// Student id
        id: i64,
    },

    /// Transaction does not exist or is outside the caller's scope.
    #[error("Transaction not found: {id}")]
    TransactionNotFound {
        /// Transaction id
        id: i64,
    },

    /// No user with that username.
    #[error("User not found: {username}")]
    UserNotFound {
        /// Username that was looked up
        username: String,
    },

    /// The caller's role does not allow this action.
    #[error("Role '{role}' is not allowed to {action}")]
    Forbidden {
        /// Role of the caller
        role: Role,
        /// What was attempted
        action: &'static str,
    },

    /// Login failed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Request without a valid session.
    #[error("Authentication required")]
    Unauthenticated,

    /// Password hashing or hash parsing failed.
    #[error("Password hash error: {message}")]
    PasswordHash {
        /// Underlying argon2 message
        message: String,
    },

    /// Bulk import input was structurally unusable.
    #[error("Import error: {message}")]
    Import {
        /// Human readable explanation
        message: String,
    },

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
