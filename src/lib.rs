//! Course category tree.
//!
//! A SQLite-backed tree of course categories with a shared lookup cache,
//! cascading visibility, and a paginated, depth-limited view that can be
//! rendered to a nested structure and expanded lazily.
//!
//! ```no_run
//! use std::sync::Arc;
//! use coursecat::category::{AllowAll, CategoryStore, NewCategory, TreeCache};
//! use coursecat::storage::Database;
//! use coursecat::tree::{CategoryView, DisplayOptions, TreeRenderer};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let db = Database::open("coursecat.db").await?;
//! let store = CategoryStore::new(db, Arc::new(TreeCache::default()), Arc::new(AllowAll));
//!
//! let science = store.create(NewCategory::named("Science", 0)).await?;
//! store.create(NewCategory::named("Physics", science.id)).await?;
//!
//! let root = store.require(0).await?;
//! let view = CategoryView::new(store.clone(), root, DisplayOptions::default());
//! let tree = TreeRenderer::new().render(&view).await?;
//! println!("{}", serde_json::to_string_pretty(&tree)?);
//! # Ok(())
//! # }
//! ```

pub mod category;
pub mod config;
pub mod storage;
pub mod tree;
pub mod util;
