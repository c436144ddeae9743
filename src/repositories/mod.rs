//! Repository pattern implementation over queryable data sources
//!
//! This module provides the generic query and unit-of-work contract that
//! application code programs against, separating it from whichever data
//! source executes the expression trees.
//!
//! # Architecture
//!
//! - [`DataSourceRepository`]: entity type stored as-is in a data source
//! - [`AdaptedRepository`]: domain type served over a mapped data type
//! - [`BlockingRepository`]: synchronous wrapper for either
//!
//! # Usage
//!
//! ```rust,ignore
//! use adapted_repo::repositories::{DataSourceRepository, Repository, RepositorySettings};
//! use adapted_repo::sample::{self, Order};
//!
//! async fn example(source: std::sync::Arc<MemoryDataSource>) -> RepositoryResult<()> {
//!     let orders = DataSourceRepository::<Order, _>::new(source, RepositorySettings::default());
//!     let usa = orders.find_by(&sample::ships_to("USA")).await?;
//!     Ok(())
//! }
//! ```

pub mod adapted;
pub mod blocking;
pub mod data_source;
pub mod traits;

// Re-export main traits and types
pub use adapted::AdaptedRepository;
pub use blocking::BlockingRepository;
pub use data_source::{DataSourceRepository, RepositorySettings};
pub use traits::*;
