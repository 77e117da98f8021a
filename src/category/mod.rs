//! The category tree: lookup, caching, and every mutation of categories.
//!
//! [`CategoryStore`] is the entry point. Reads go through a shared
//! [`TreeCache`]; every mutation purges that cache before returning.

pub mod cache;
mod error;
mod model;
mod node;
pub mod permission;
mod store;
pub mod visibility;

pub use cache::{Adjacency, TreeCache};
pub use error::{CategoryError, Result};
pub use model::Category;
pub use node::{CategoryUpdate, NewCategory};
pub use permission::{AllowAll, Capability, Grants, PermissionChecker, Scope};
pub use store::{Access, CategoryStore, Strictness, DEFAULT_CATEGORY_NAME};
