//! # AppError
//!
//! Centralized error handling for the forum engagement core.
//! Absence (expired session, unknown comment) is modelled with `Option`
//! wherever it is a normal outcome; these variants are actual failures.

use thiserror::Error;

/// The primary error type for all forum-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (kind, id)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Bad input shape or value; never reaches storage
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Bad or missing credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (e.g. duplicate username)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The relational store rejected or could not execute an operation
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// Secure randomness was unavailable
    #[error("allocation error: {0}")]
    Allocation(String),

    /// Anything else that is our fault
    #[error("internal service error: {0}")]
    Internal(String),
}

/// A specialized Result type for forum logic.
pub type Result<T> = std::result::Result<T, AppError>;
