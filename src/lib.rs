//! Generic repository and unit-of-work layer driven by expression trees.
//!
//! Predicates and projections are explicit trees ([`expression`]) that can
//! be rewritten onto structurally similar types, fused with include paths,
//! combined as [`specification`]s and handed to a [`data_source`] through
//! the [`repositories`] facade.

pub mod config;
pub mod data_source;
pub mod errors;
pub mod expression;
pub mod model;
pub mod repositories;
pub mod sample;
pub mod specification;
