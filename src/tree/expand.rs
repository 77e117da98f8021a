//! Lazy expansion of placeholder nodes.
//!
//! A node rendered with `isLoaded = false` is filled in later by one fetch
//! keyed by `(categoryId, depth, showCourses)`. The fetch is a pure read, so
//! it can be retried or cancelled freely; [`LazyTree`] makes sure each
//! placeholder has at most one fetch in flight and grafts the result in
//! without touching its siblings.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::options::{DisplayOptions, ShowCourses};
use super::render::{RenderedCategory, TreeRenderer};
use super::view::CategoryView;
use crate::category::{CategoryError, CategoryStore};

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error(transparent)]
    Category(#[from] CategoryError),

    #[error("Malformed expansion JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expansion of category {0} was cancelled")]
    Cancelled(i64),

    #[error("Expansion task failed: {0}")]
    Task(String),
}

/// What the consumer sends to load one placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionRequest {
    pub category_id: i64,
    /// Depth of the placeholder in the tree it was rendered in.
    pub depth: i64,
    #[serde(default)]
    pub show_courses: ShowCourses,
}

impl ExpansionRequest {
    pub fn from_json(body: &str) -> Result<Self, ExpandError> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Render the subtree fragment for a placeholder: the node itself loaded,
/// its children one level deeper as placeholders again.
///
/// `base` supplies paging, search and summary settings; depth and course
/// mode come from the request.
pub async fn load_fragment(
    store: &CategoryStore,
    base: &DisplayOptions,
    request: &ExpansionRequest,
) -> Result<RenderedCategory, CategoryError> {
    let category = store.require(request.category_id).await?;
    let options = DisplayOptions {
        show_courses: request.show_courses,
        subcategory_depth: request.depth.max(1),
        ..base.clone()
    };
    let view =
        CategoryView::with_depth(store.clone(), category, Arc::new(options), request.depth);

    tracing::debug!(
        category_id = request.category_id,
        depth = request.depth,
        show_courses = %request.show_courses,
        "Loading tree fragment"
    );
    TreeRenderer::new().render(&view).await
}

/// Request/response form of [`load_fragment`]: JSON in, JSON out.
pub async fn fragment_json(
    store: &CategoryStore,
    base: &DisplayOptions,
    body: &str,
) -> Result<String, ExpandError> {
    let request = ExpansionRequest::from_json(body)?;
    let fragment = load_fragment(store, base, &request).await?;
    Ok(serde_json::to_string(&fragment)?)
}

/// A fragment fetch running in the background.
#[derive(Debug)]
pub struct PendingExpansion {
    category_id: i64,
    generation: u64,
    handle: JoinHandle<Result<RenderedCategory, CategoryError>>,
}

impl PendingExpansion {
    pub fn category_id(&self) -> i64 {
        self.category_id
    }

    fn abort(self) {
        self.handle.abort();
    }

    /// Wait for the fragment.
    pub async fn finish(self) -> Result<Fragment, ExpandError> {
        match self.handle.await {
            Ok(Ok(tree)) => Ok(Fragment {
                generation: self.generation,
                tree,
            }),
            Ok(Err(err)) => Err(err.into()),
            Err(err) if err.is_cancelled() => Err(ExpandError::Cancelled(self.category_id)),
            Err(err) => Err(ExpandError::Task(err.to_string())),
        }
    }
}

/// A loaded fragment, tagged with the request that produced it.
#[derive(Debug, Clone)]
pub struct Fragment {
    generation: u64,
    pub tree: RenderedCategory,
}

/// A rendered tree whose placeholders can be expanded in place.
pub struct LazyTree {
    store: CategoryStore,
    options: Arc<DisplayOptions>,
    root: RenderedCategory,
    /// Category id → generation of the fetch currently expected for it.
    pending: HashMap<i64, u64>,
    generation: u64,
}

impl LazyTree {
    pub fn new(store: CategoryStore, options: DisplayOptions, root: RenderedCategory) -> Self {
        Self {
            store,
            options: Arc::new(options),
            root,
            pending: HashMap::new(),
            generation: 0,
        }
    }

    /// Render `view` and wrap the result.
    pub async fn render(view: &CategoryView) -> Result<Self, CategoryError> {
        let root = TreeRenderer::new().render(view).await?;
        Ok(Self::new(view.store().clone(), view.options().clone(), root))
    }

    pub fn tree(&self) -> &RenderedCategory {
        &self.root
    }

    pub fn into_tree(self) -> RenderedCategory {
        self.root
    }

    pub fn is_pending(&self, category_id: i64) -> bool {
        self.pending.contains_key(&category_id)
    }

    /// Start fetching a placeholder. Returns `None` if the node is unknown,
    /// already loaded, or already being fetched.
    pub fn begin_expand(&mut self, category_id: i64) -> Option<PendingExpansion> {
        let node = self.root.find(category_id)?;
        if node.is_loaded || self.pending.contains_key(&category_id) {
            return None;
        }

        let request = ExpansionRequest {
            category_id,
            depth: node.depth,
            show_courses: self.options.show_courses,
        };
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        self.pending.insert(category_id, generation);

        let store = self.store.clone();
        let options = Arc::clone(&self.options);
        let handle = tokio::spawn(async move { load_fragment(&store, &options, &request).await });

        tracing::debug!(category_id, generation, "Spawned expansion task");
        Some(PendingExpansion {
            category_id,
            generation,
            handle,
        })
    }

    /// Graft a finished fragment. Fragments from abandoned or superseded
    /// fetches are dropped; returns whether the tree changed.
    pub fn complete(&mut self, fragment: Fragment) -> bool {
        let id = fragment.tree.id;
        if self.pending.get(&id) != Some(&fragment.generation) {
            tracing::debug!(category_id = id, "Discarding stale fragment");
            return false;
        }
        self.pending.remove(&id);
        self.root.graft(fragment.tree)
    }

    /// Forget an in-flight fetch so the node can be requested again.
    pub fn abandon(&mut self, category_id: i64) {
        self.pending.remove(&category_id);
    }

    /// Stop a fetch started by [`begin_expand`](Self::begin_expand). The
    /// tree is left as it was and the node can be expanded again.
    pub fn cancel(&mut self, pending: PendingExpansion) {
        let category_id = pending.category_id;
        if self.pending.get(&category_id) == Some(&pending.generation) {
            self.pending.remove(&category_id);
        }
        pending.abort();
        tracing::debug!(category_id, "Expansion cancelled");
    }

    /// Fetch and graft one placeholder. Returns false when there was
    /// nothing to expand.
    pub async fn expand(&mut self, category_id: i64) -> Result<bool, ExpandError> {
        let Some(pending) = self.begin_expand(category_id) else {
            return Ok(false);
        };
        match pending.finish().await {
            Ok(fragment) => Ok(self.complete(fragment)),
            Err(err) => {
                self.abandon(category_id);
                Err(err)
            }
        }
    }
}
