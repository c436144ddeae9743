//! Error type definitions for the adapted repository layer
//!
//! This module defines all error types used throughout the crate, providing
//! a hierarchical error system: expression errors (malformed trees or
//! mappings), evaluation errors (running a tree against a record), data
//! source errors (the external collaborator) and repository errors (the
//! facade, which wraps the other three).

use thiserror::Error;

/// Top-level application error type
///
/// Used by the binary; library code returns the narrower errors below.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Data source errors raised outside a repository call
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    /// Database-related errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Errors raised while building, rewriting or fusing expression trees.
///
/// All of these are programmer errors (malformed expressions or mappings).
/// They are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// The tree uses a construct the rewriter does not support
    #[error("Unsupported expression shape: {reason}")]
    UnsupportedExpressionShape { reason: String },

    /// Name-based member resolution failed on the mapped type
    #[error("Member '{member}' of {source_type} not found on target type {target_type}")]
    MemberNotFoundOnTarget {
        member: String,
        source_type: String,
        target_type: String,
    },

    /// An include factory binding is not a pure member-access chain
    #[error("Unsupported include path shape: {reason}")]
    UnsupportedIncludePathShape { reason: String },

    /// Include factory and projection do not share a root parameter
    #[error("Key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },

    /// A type mapping was given the same source type twice
    #[error("Duplicate type mapping for source type {type_id}")]
    DuplicateMapping { type_id: String },
}

/// Errors raised while evaluating an expression against a record.
#[derive(Error, Debug)]
pub enum EvaluationError {
    /// Operand types do not fit the operator
    #[error("Type mismatch: {operation} expects {expected}, got {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    /// The record has no member of that name
    #[error("Missing member '{member}' on record")]
    MissingMember { member: String },

    /// A parameter that is not bound by the lambda being evaluated
    #[error("Unbound parameter '{name}'")]
    UnboundParameter { name: String },

    /// Node kinds the evaluator cannot run (e.g. opaque method calls)
    #[error("Unsupported node: {node}")]
    UnsupportedNode { node: String },

    /// Integer division by zero
    #[error("Division by zero")]
    DivideByZero,

    /// Lambda parameter count differs from the argument count
    #[error("Arity mismatch: lambda takes {expected} parameter(s), got {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// Entity could not be converted to or from its record form
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by a data source. Database errors pass through opaque.
#[derive(Error, Debug)]
pub enum DataSourceError {
    /// Database errors from SeaORM
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The data source cannot execute this request natively
    #[error("Unsupported by data source: {operation} - {reason}")]
    Unsupported { operation: String, reason: String },

    /// No storage is known for this type
    #[error("Unknown entity type: {type_id}")]
    UnknownType { type_id: String },

    /// Key value count differs from the key member count
    #[error("Key arity mismatch for {type_id}: expected {expected} value(s), got {found}")]
    KeyArity {
        type_id: String,
        expected: usize,
        found: usize,
    },

    /// An include path names a member that is not a navigation member
    #[error("Invalid include path '{path}' on {type_id}: {reason}")]
    InvalidIncludePath {
        path: String,
        type_id: String,
        reason: String,
    },

    /// Constraint violations (duplicate keys, missing rows on delete)
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// Expression could not be translated to a native query
    #[error("Translation failed: {reason}")]
    Translation { reason: String },

    /// In-memory evaluation failures
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Malformed expression or mapping
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Evaluation of a predicate or projection failed
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Pass-through failure from the data source
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The data source refused the projection and in-memory fallback is disabled
    #[error("Projection on {type_id} was not pushed down: {reason}")]
    ProjectionNotPushedDown { type_id: String, reason: String },

    /// Blocking runtime could not be created
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Convenience methods for creating common error types
impl ExpressionError {
    pub fn unsupported_shape<S: Into<String>>(reason: S) -> Self {
        Self::UnsupportedExpressionShape {
            reason: reason.into(),
        }
    }

    pub fn unsupported_include<S: Into<String>>(reason: S) -> Self {
        Self::UnsupportedIncludePathShape {
            reason: reason.into(),
        }
    }
}

impl EvaluationError {
    pub fn type_mismatch<O, E, F>(operation: O, expected: E, found: F) -> Self
    where
        O: Into<String>,
        E: Into<String>,
        F: Into<String>,
    {
        Self::TypeMismatch {
            operation: operation.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl DataSourceError {
    pub fn unsupported<O: Into<String>, R: Into<String>>(operation: O, reason: R) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn translation<S: Into<String>>(reason: S) -> Self {
        Self::Translation {
            reason: reason.into(),
        }
    }
}
