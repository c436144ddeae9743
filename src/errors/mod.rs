//! Centralized error handling for the adapted repository layer
//!
//! # Error Categories
//!
//! - **Expression Errors**: unsupported tree shapes, unresolvable members,
//!   malformed include factories, duplicate mappings
//! - **Evaluation Errors**: running a tree against a record
//! - **Data Source Errors**: opaque pass-through failures of the collaborator
//! - **Repository Errors**: the facade, wrapping all of the above
//!
//! # Usage
//!
//! ```rust
//! use adapted_repo::errors::{ExpressionError, ExpressionResult};
//!
//! fn example() -> ExpressionResult<()> {
//!     Err(ExpressionError::unsupported_shape("multi-parameter lambda"))
//! }
//! assert!(example().is_err());
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for expression rewriting Results
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Convenience type alias for evaluation Results
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Convenience type alias for data source Results
pub type DataSourceResult<T> = Result<T, DataSourceError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;
