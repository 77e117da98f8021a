use std::collections::HashMap;
use std::sync::Arc;

use super::cache::{Adjacency, TreeCache};
use super::error::{CategoryError, Result};
use super::model::Category;
use super::permission::{Capability, PermissionChecker, Scope};
use crate::storage::{CategoryRecord, Database, NewCategoryRow, DEFAULT_CATEGORY_SETTING};

/// Name given to the category synthesized when the tree is empty.
pub const DEFAULT_CATEGORY_NAME: &str = "Miscellaneous";

/// What to do when the requested id does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Fail with [`CategoryError::NotFound`].
    MustExist,
    /// Return `Ok(None)`.
    IgnoreMissing,
}

/// Whether lookups honour the viewer's visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Hidden categories the viewer may not see behave as missing.
    Checked,
    /// Administrative access: every existing category resolves.
    Unchecked,
}

/// Lookup and cached traversal of the category tree.
///
/// Cheap to clone; clones share the database pool and the [`TreeCache`].
#[derive(Clone)]
pub struct CategoryStore {
    pub(crate) db: Database,
    cache: Arc<TreeCache>,
    permissions: Arc<dyn PermissionChecker>,
    default_name: Arc<str>,
}

impl std::fmt::Debug for CategoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryStore")
            .field("cache", &self.cache)
            .field("viewer", &self.permissions.viewer_id())
            .finish()
    }
}

impl CategoryStore {
    pub fn new(
        db: Database,
        cache: Arc<TreeCache>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            db,
            cache,
            permissions,
            default_name: Arc::from(DEFAULT_CATEGORY_NAME),
        }
    }

    /// Name used if an empty tree has to be bootstrapped.
    pub fn with_default_category_name(mut self, name: &str) -> Self {
        self.default_name = Arc::from(name);
        self
    }

    /// Same database and cache, acting for a different viewer.
    pub fn for_viewer(&self, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self {
            permissions,
            ..self.clone()
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn permissions(&self) -> &dyn PermissionChecker {
        self.permissions.as_ref()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Resolve a category by id.
    ///
    /// Id `0` always resolves to [`Category::root`], whatever the viewer's
    /// permissions. With [`Strictness::MustExist`] the result is never
    /// `Ok(None)`.
    pub async fn get(
        &self,
        id: i64,
        strictness: Strictness,
        access: Access,
    ) -> Result<Option<Category>> {
        if id == Category::ROOT_ID {
            return Ok(Some(Category::root()));
        }

        let found = match self.lookup(id).await? {
            Some(category) if access == Access::Unchecked || self.is_uservisible(&category) => {
                Some(category)
            }
            Some(_) => {
                tracing::debug!(category_id = id, "Category hidden from viewer");
                None
            }
            None => None,
        };

        match (found, strictness) {
            (Some(category), _) => Ok(Some(category)),
            (None, Strictness::IgnoreMissing) => Ok(None),
            (None, Strictness::MustExist) => Err(CategoryError::NotFound(id)),
        }
    }

    /// [`get`](Self::get) with `MustExist` and visibility checks.
    pub async fn require(&self, id: i64) -> Result<Category> {
        self.get(id, Strictness::MustExist, Access::Checked)
            .await?
            .ok_or(CategoryError::NotFound(id))
    }

    /// [`get`](Self::get) with `MustExist`, ignoring visibility.
    pub async fn require_unchecked(&self, id: i64) -> Result<Category> {
        self.get(id, Strictness::MustExist, Access::Unchecked)
            .await?
            .ok_or(CategoryError::NotFound(id))
    }

    async fn lookup(&self, id: i64) -> Result<Option<Category>> {
        let all = self.get_all_ids().await?;
        if !all.contains_key(&id) {
            return Ok(None);
        }
        Ok(self.record(id).await?.map(|r| Category::from(r.as_ref())))
    }

    /// Fetch a row through the record cache.
    pub(crate) async fn record(&self, id: i64) -> Result<Option<Arc<CategoryRecord>>> {
        if let Some(record) = self.cache.record(id) {
            return Ok(Some(record));
        }
        let generation = self.cache.generation();
        let Some(record) = self.db.get_category(id).await? else {
            return Ok(None);
        };
        let record = Arc::new(record);
        self.cache.store_record(generation, Arc::clone(&record));
        Ok(Some(record))
    }

    /// Resolve several ids, keeping their order and skipping unknown ones.
    /// Cache misses are loaded in one batch.
    pub async fn get_many(&self, ids: &[i64], access: Access) -> Result<Vec<Category>> {
        let mut found: HashMap<i64, Arc<CategoryRecord>> = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in ids {
            match self.cache.record(id) {
                Some(record) => {
                    found.insert(id, record);
                }
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            let generation = self.cache.generation();
            for record in self.db.get_categories(&missing).await? {
                let record = Arc::new(record);
                self.cache.store_record(generation, Arc::clone(&record));
                found.insert(record.id, record);
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| found.get(id))
            .map(|record| Category::from(record.as_ref()))
            .filter(|category| access == Access::Unchecked || self.is_uservisible(category))
            .collect())
    }

    // ========================================================================
    // Adjacency Map
    // ========================================================================

    /// Parent → children map for the whole tree, built once per cache
    /// generation. Entry `0` lists the top-level categories.
    ///
    /// An empty tree is not valid: if there are no categories at all, a
    /// default one is created and recorded as the default category.
    pub async fn get_all_ids(&self) -> Result<Arc<Adjacency>> {
        if let Some(all) = self.cache.all_ids() {
            return Ok(all);
        }

        let mut generation = self.cache.generation();
        let mut pairs = self.db.category_parent_pairs().await?;
        if pairs.is_empty() {
            let created = self.bootstrap_default_category().await?;
            generation = self.cache.generation();
            pairs = vec![(created.id, Category::ROOT_ID)];
        }

        let all = Arc::new(build_adjacency(&pairs));
        tracing::debug!(categories = pairs.len(), "Rebuilt category adjacency map");
        self.cache.store_all_ids(generation, Arc::clone(&all));
        Ok(all)
    }

    /// Drop every cached adjacency entry and record.
    pub fn purge_cache(&self) {
        self.cache.purge();
    }

    async fn bootstrap_default_category(&self) -> Result<CategoryRecord> {
        let record = self
            .db
            .insert_category(&NewCategoryRow {
                name: self.default_name.to_string(),
                idnumber: None,
                description: None,
                descriptionformat: 0,
                parent: Category::ROOT_ID,
                parent_path: String::new(),
                parent_depth: 0,
                visible: true,
                visibleold: true,
                timemodified: chrono::Utc::now().timestamp(),
            })
            .await?;
        self.db
            .set_setting(DEFAULT_CATEGORY_SETTING, &record.id.to_string())
            .await?;
        self.cache.purge();
        tracing::warn!(
            category_id = record.id,
            name = %record.name,
            "No categories found, created default category"
        );
        Ok(record)
    }

    /// Direct child ids of `id`, in sort order, regardless of visibility.
    pub async fn children_ids(&self, id: i64) -> Result<Vec<i64>> {
        let all = self.get_all_ids().await?;
        Ok(all.get(&id).cloned().unwrap_or_default())
    }

    /// Every id below `id`, parents before children.
    pub async fn descendant_ids(&self, id: i64) -> Result<Vec<i64>> {
        let all = self.get_all_ids().await?;
        Ok(descendants_of(&all, id))
    }

    /// Direct children the viewer can see, in sort order.
    pub async fn get_children(&self, category: &Category) -> Result<Vec<Category>> {
        let ids = self.children_ids(category.id).await?;
        self.get_many(&ids, Access::Checked).await
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// Whether the viewer holds `capability` in `category`, directly or
    /// through the system scope or any ancestor.
    pub fn has_capability(&self, capability: Capability, category: &Category) -> bool {
        self.permissions.can(capability, Scope::System)
            || category
                .path_ids()
                .into_iter()
                .any(|id| self.permissions.can(capability, Scope::Category(id)))
    }

    /// Whether the viewer may see `category` at all.
    pub fn is_uservisible(&self, category: &Category) -> bool {
        category.is_root()
            || category.visible
            || self.has_capability(Capability::ViewHiddenCategories, category)
    }

    /// A category is effectively visible when it and every ancestor are.
    pub async fn is_effectively_visible(&self, category: &Category) -> Result<bool> {
        if !category.visible {
            return Ok(false);
        }
        let ancestors = self.get_many(&category.parent_ids(), Access::Unchecked).await?;
        Ok(ancestors.iter().all(|a| a.visible))
    }

    // ========================================================================
    // Naming
    // ========================================================================

    /// Ancestor ids of `category`, top-level first.
    pub fn get_parents(&self, category: &Category) -> Vec<i64> {
        category.parent_ids()
    }

    /// Names from the top-level ancestor down, e.g. `Science / Physics`.
    pub async fn nested_name(&self, category: &Category, separator: &str) -> Result<String> {
        if category.is_root() {
            return Ok(category.formatted_name());
        }
        let chain = self.get_many(&category.path_ids(), Access::Unchecked).await?;
        Ok(chain
            .iter()
            .map(Category::formatted_name)
            .collect::<Vec<_>>()
            .join(separator))
    }

    /// Every category the viewer can see, in tree order, with its nested
    /// name. Subtrees under a category the viewer cannot see are skipped.
    pub async fn make_categories_list(&self, separator: &str) -> Result<Vec<(i64, String)>> {
        let all = self.get_all_ids().await?;
        let ids = descendants_of(&all, Category::ROOT_ID);
        let categories: HashMap<i64, Category> = self
            .get_many(&ids, Access::Unchecked)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut list = Vec::with_capacity(ids.len());
        let mut names: HashMap<i64, String> = HashMap::new();
        for id in ids {
            let Some(category) = categories.get(&id) else {
                continue;
            };
            if !self.is_uservisible(category) {
                continue;
            }
            let name = if category.parent == Category::ROOT_ID {
                category.formatted_name()
            } else {
                match names.get(&category.parent) {
                    Some(parent_name) => {
                        format!("{parent_name}{separator}{}", category.formatted_name())
                    }
                    // Parent was skipped as invisible.
                    None => continue,
                }
            };
            names.insert(id, name.clone());
            list.push((id, name));
        }
        Ok(list)
    }
}

/// Build the adjacency map from `(id, parent)` pairs already in sibling order.
pub(crate) fn build_adjacency(pairs: &[(i64, i64)]) -> Adjacency {
    let mut all: Adjacency = HashMap::with_capacity(pairs.len() + 1);
    all.entry(Category::ROOT_ID).or_default();
    for &(id, parent) in pairs {
        all.entry(id).or_default();
        all.entry(parent).or_default().push(id);
    }
    all
}

/// Preorder walk below `id`, excluding `id` itself.
pub(crate) fn descendants_of(all: &Adjacency, id: i64) -> Vec<i64> {
    let mut out = Vec::new();
    let mut stack: Vec<i64> = all
        .get(&id)
        .map(|children| children.iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some(next) = stack.pop() {
        out.push(next);
        if let Some(children) = all.get(&next) {
            stack.extend(children.iter().rev().copied());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::permission::{AllowAll, Grants};

    async fn test_store() -> CategoryStore {
        let db = Database::open(":memory:").await.unwrap();
        CategoryStore::new(db, Arc::new(TreeCache::default()), Arc::new(AllowAll))
    }

    #[test]
    fn test_build_adjacency_includes_leaves() {
        let all = build_adjacency(&[(1, 0), (2, 1), (3, 0)]);
        assert_eq!(all[&0], vec![1, 3]);
        assert_eq!(all[&1], vec![2]);
        assert!(all[&2].is_empty());
        assert!(all[&3].is_empty());
    }

    #[test]
    fn test_descendants_preorder() {
        let all = build_adjacency(&[(1, 0), (4, 0), (2, 1), (3, 2), (5, 1)]);
        assert_eq!(descendants_of(&all, 0), vec![1, 2, 3, 5, 4]);
        assert_eq!(descendants_of(&all, 1), vec![2, 3, 5]);
        assert!(descendants_of(&all, 3).is_empty());
    }

    #[tokio::test]
    async fn test_root_always_resolves() {
        let store = test_store().await;
        let locked_out = store.for_viewer(Arc::new(Grants::new(None)));

        let root = locked_out
            .get(0, Strictness::MustExist, Access::Checked)
            .await
            .unwrap()
            .unwrap();
        assert!(root.is_root());
        assert_eq!(root.depth, 0);
        assert_eq!(root.path, "");
        assert!(root.visible);
    }

    #[tokio::test]
    async fn test_empty_tree_bootstraps_default_category() {
        let store = test_store().await;

        let all = store.get_all_ids().await.unwrap();
        assert_eq!(all[&0].len(), 1);
        let id = all[&0][0];

        let category = store.require(id).await.unwrap();
        assert_eq!(category.name, DEFAULT_CATEGORY_NAME);
        assert_eq!(store.database().default_category_id().await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_missing_id_strictness() {
        let store = test_store().await;

        let err = store
            .get(999, Strictness::MustExist, Access::Checked)
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryError::NotFound(999)));

        let none = store
            .get(999, Strictness::IgnoreMissing, Access::Checked)
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
