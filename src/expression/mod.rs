//! Expression trees and the engine that rewrites, fuses and runs them.
//!
//! - [`ast`]: node types and builders
//! - [`visitor`]: tree-to-tree traversal
//! - [`mapping`] / [`rewrite`]: re-target a lambda onto mapped types
//! - [`includes`]: include-path flattening and projection fusion
//! - [`eval`] / [`compile`]: interpreted and compiled evaluation
//! - [`typed`]: entity-typed wrappers used by repositories

pub mod ast;
pub mod compile;
pub mod eval;
pub mod includes;
pub mod mapping;
pub mod rewrite;
pub mod typed;
pub mod visitor;

pub use ast::{BinaryOp, Expr, IntoExpr, Lambda, Parameter, UnaryOp};
pub use compile::CompiledLambda;
pub use includes::{fuse, flatten_include_paths, FusedProjection, IncludePath, ProjectionWithIncludes};
pub use mapping::{TypeMapping, TypeMappingBuilder};
pub use rewrite::{rewrite, ReplaceTypeVisitor};
pub use typed::{IncludeFactory, Predicate, Projection};
pub use visitor::{ExpressionVisitor, ParameterRebinder};

/// Truncate a string for logging, keeping it on a char boundary.
pub(crate) fn truncate_for_log(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
