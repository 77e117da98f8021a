use super::error::{CategoryError, Result};
use super::model::Category;
use super::permission::Capability;
use super::store::{Access, CategoryStore, Strictness};
use super::visibility::{plan_hide, plan_show};
use crate::storage::{
    CategoryFieldChanges, DeletedContent, DescriptionFormat, NewCategoryRow, ReparentRow,
    SiblingOrder, DEFAULT_CATEGORY_SETTING,
};
use crate::util::strip_control_chars;

const MAX_NAME_CHARS: usize = 255;
const MAX_IDNUMBER_CHARS: usize = 100;

/// Input for [`CategoryStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub idnumber: Option<String>,
    pub description: Option<String>,
    pub description_format: DescriptionFormat,
    /// `0` creates a top-level category.
    pub parent: i64,
    /// `None` inherits from the parent.
    pub visible: Option<bool>,
}

impl NewCategory {
    pub fn named(name: impl Into<String>, parent: i64) -> Self {
        Self {
            name: name.into(),
            parent,
            ..Self::default()
        }
    }
}

/// Input for [`CategoryStore::update`]. `None` leaves a field unchanged;
/// `Some(None)` clears an optional column.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub idnumber: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub description_format: Option<DescriptionFormat>,
    pub parent: Option<i64>,
    pub visible: Option<bool>,
}

impl CategoryStore {
    // ========================================================================
    // Create / Update
    // ========================================================================

    /// Create a category at the end of its parent's children.
    ///
    /// A category created under a hidden parent is stored hidden, remembering
    /// the requested visibility for when the parent is shown.
    pub async fn create(&self, data: NewCategory) -> Result<Category> {
        let name = validate_name(&data.name)?;
        let idnumber = self.validate_idnumber(data.idnumber.as_deref(), None).await?;
        let parent = self.require_unchecked(data.parent).await?;

        let requested = data.visible.unwrap_or(parent.visible);
        let record = self
            .db
            .insert_category(&NewCategoryRow {
                name,
                idnumber,
                description: data.description,
                descriptionformat: data.description_format.code(),
                parent: parent.id,
                parent_path: parent.path.clone(),
                parent_depth: parent.depth,
                visible: requested && parent.visible,
                visibleold: requested,
                timemodified: now(),
            })
            .await?;

        self.db.fix_sortorder().await?;
        self.purge_cache();

        tracing::info!(
            category_id = record.id,
            parent = parent.id,
            name = %record.name,
            "Category created"
        );
        self.require_unchecked(record.id).await
    }

    /// Apply field, visibility and parent changes, in that order.
    ///
    /// Visibility is applied before the move, so moving into a hidden parent
    /// wins over an explicit request to show.
    pub async fn update(&self, id: i64, data: CategoryUpdate) -> Result<Category> {
        let category = self.require_editable(id).await?;

        let mut changes = CategoryFieldChanges::default();
        if let Some(name) = &data.name {
            let name = validate_name(name)?;
            if name != category.name {
                changes.name = Some(name);
            }
        }
        if let Some(idnumber) = &data.idnumber {
            let idnumber = self
                .validate_idnumber(idnumber.as_deref(), Some(category.id))
                .await?;
            if idnumber != category.idnumber {
                changes.idnumber = Some(idnumber);
            }
        }
        if let Some(description) = data.description {
            if description != category.description {
                changes.description = Some(description);
            }
        }
        if let Some(format) = data.description_format {
            if format != category.description_format {
                changes.descriptionformat = Some(format.code());
            }
        }

        let (visible, parent) = (data.visible, data.parent);
        let applied = async {
            let mut changed = self
                .db
                .update_category_fields(category.id, &changes, now())
                .await?;

            if let Some(visible) = visible {
                changed |= if visible {
                    self.show_raw(&category).await?
                } else {
                    self.hide_raw(&category, false).await?
                };
            }

            if let Some(parent) = parent {
                // Visibility may have changed above; the move must see it.
                self.purge_cache();
                let current = self.require_unchecked(category.id).await?;
                changed |= self.change_parent_raw(&current, parent).await?;
            }
            Ok::<_, CategoryError>(changed)
        }
        .await;

        self.purge_cache();
        if applied? {
            tracing::info!(category_id = id, "Category updated");
        }
        self.require_unchecked(id).await
    }

    // ========================================================================
    // Move
    // ========================================================================

    /// Move a category, with its subtree, under `new_parent`.
    ///
    /// Returns false when `new_parent` already is the parent.
    pub async fn change_parent(&self, id: i64, new_parent: i64) -> Result<bool> {
        let category = self.require_editable(id).await?;
        let moved = self.change_parent_raw(&category, new_parent).await;
        self.purge_cache();
        moved
    }

    async fn change_parent_raw(&self, category: &Category, new_parent: i64) -> Result<bool> {
        if new_parent == category.parent {
            return Ok(false);
        }
        if new_parent == category.id {
            return Err(CategoryError::Cycle {
                id: category.id,
                new_parent,
            });
        }

        let parent = self.require_unchecked(new_parent).await?;
        if parent.path_ids().contains(&category.id) {
            return Err(CategoryError::Cycle {
                id: category.id,
                new_parent,
            });
        }

        let hide = if !parent.visible && category.visible {
            let descendants = self.db.descendant_visibility(&category.path).await?;
            plan_hide(category.visibility_state(), &descendants, true)
        } else {
            None
        };

        self.db
            .reparent_category(
                &ReparentRow {
                    id: category.id,
                    old_path: category.path.clone(),
                    old_depth: category.depth,
                    new_parent: parent.id,
                    new_parent_path: parent.path.clone(),
                    new_parent_depth: parent.depth,
                    timemodified: now(),
                },
                hide.as_ref(),
            )
            .await?;
        self.db.fix_sortorder().await?;

        tracing::info!(
            category_id = category.id,
            from = category.parent,
            to = parent.id,
            hidden = hide.is_some(),
            "Category moved"
        );
        Ok(true)
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    /// Hide a category and everything below it. Returns whether anything
    /// changed.
    pub async fn hide(&self, id: i64) -> Result<bool> {
        let category = self.require_editable(id).await?;
        let changed = self.hide_raw(&category, false).await?;
        if changed {
            self.purge_cache();
        }
        Ok(changed)
    }

    /// Show a category and restore the descendants its hide cascaded to.
    /// Returns whether anything changed.
    pub async fn show(&self, id: i64) -> Result<bool> {
        let category = self.require_editable(id).await?;
        let changed = self.show_raw(&category).await?;
        if changed {
            self.purge_cache();
        }
        Ok(changed)
    }

    async fn hide_raw(&self, category: &Category, visible_old: bool) -> Result<bool> {
        let descendants = self.db.descendant_visibility(&category.path).await?;
        let Some(plan) = plan_hide(category.visibility_state(), &descendants, visible_old) else {
            return Ok(false);
        };
        self.db.apply_visibility_plan(&plan, now()).await?;
        tracing::info!(
            category_id = category.id,
            categories = plan.categories.len(),
            "Category hidden"
        );
        Ok(true)
    }

    async fn show_raw(&self, category: &Category) -> Result<bool> {
        let descendants = self.db.descendant_visibility(&category.path).await?;
        let Some(plan) = plan_show(category.visibility_state(), &descendants) else {
            return Ok(false);
        };
        self.db.apply_visibility_plan(&plan, now()).await?;
        tracing::info!(
            category_id = category.id,
            categories = plan.categories.len(),
            "Category shown"
        );
        Ok(true)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete a category with every subcategory and course below it.
    ///
    /// Runs as one transaction; on [`CategoryError::CascadeFailure`] nothing
    /// has been deleted.
    pub async fn delete_full(&self, id: i64) -> Result<DeletedContent> {
        let category = self.require_editable(id).await?;

        let deleted = self.db.delete_category_tree(category.id, &category.path).await?;
        self.db.fix_sortorder().await?;

        if let Some(default) = self.db.default_category_id().await? {
            if deleted.categories.contains(&default) {
                self.repoint_default_category(category.parent).await?;
            }
        }
        self.purge_cache();

        tracing::info!(
            category_id = id,
            categories = deleted.categories.len(),
            courses = deleted.courses.len(),
            "Category deleted with content"
        );
        Ok(deleted)
    }

    /// Move the direct children and courses of a category to `new_parent`,
    /// then delete the emptied category.
    ///
    /// Permission checks are the caller's job, see
    /// [`can_move_content_to`](Self::can_move_content_to). The steps are not
    /// one transaction: a failure part way leaves the content already moved
    /// where it is.
    pub async fn delete_move(&self, id: i64, new_parent: i64) -> Result<()> {
        let category = self.require_editable(id).await?;
        let target = self.require_unchecked(new_parent).await?;
        if target.id == category.id || category.is_ancestor_of(&target) {
            return Err(CategoryError::Cycle {
                id: category.id,
                new_parent,
            });
        }

        let course_ids = self.db.course_ids_in_category(category.id).await?;
        if !course_ids.is_empty() && target.is_root() {
            return Err(CategoryError::validation(
                "parent",
                "courses cannot be moved to the top level",
            ));
        }

        // Each step commits on its own, so the cache is purged even when a
        // later step fails.
        let moved = async {
            for child_id in self.children_ids(category.id).await? {
                let child = self.require_unchecked(child_id).await?;
                self.change_parent_raw(&child, target.id).await?;
            }

            if !course_ids.is_empty() {
                self.db
                    .move_courses(&course_ids, target.id, target.visible)
                    .await?;
                self.db.fix_sortorder().await?;
            }

            self.db.delete_category_row(category.id).await?;
            self.db.fix_sortorder().await?;

            if self.db.default_category_id().await? == Some(category.id) {
                self.repoint_default_category(target.id).await?;
            }
            Ok::<_, CategoryError>(())
        }
        .await;
        self.purge_cache();
        moved?;

        tracing::info!(
            category_id = id,
            moved_to = target.id,
            courses = course_ids.len(),
            "Category deleted, content moved"
        );
        Ok(())
    }

    async fn repoint_default_category(&self, to: i64) -> Result<()> {
        if to == Category::ROOT_ID {
            self.db.unset_setting(DEFAULT_CATEGORY_SETTING).await?;
        } else {
            self.db
                .set_setting(DEFAULT_CATEGORY_SETTING, &to.to_string())
                .await?;
        }
        tracing::debug!(category_id = to, "Default category repointed");
        Ok(())
    }

    // ========================================================================
    // Permission Predicates
    // ========================================================================

    /// Whether the viewer may delete the category and everything below it:
    /// category management on every category, course deletion wherever
    /// there are courses.
    pub async fn can_delete_full(&self, id: i64) -> Result<bool> {
        let category = self.require_unchecked(id).await?;
        if category.is_root() {
            return Ok(false);
        }

        let mut ids = vec![category.id];
        ids.extend(self.descendant_ids(category.id).await?);
        for node in self.get_many(&ids, Access::Unchecked).await? {
            if !self.has_capability(Capability::ManageCategories, &node) {
                return Ok(false);
            }
            if self.db.count_courses_in_category(node.id).await? > 0
                && !self.has_capability(Capability::DeleteCourse, &node)
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether [`delete_move`](Self::delete_move) to `new_parent` is allowed.
    ///
    /// `new_parent` must exist and lie outside the category's subtree, the
    /// viewer must manage every category in the subtree, and must be able
    /// to receive whatever content is about to land in `new_parent`.
    pub async fn can_move_content_to(&self, id: i64, new_parent: i64) -> Result<bool> {
        let category = self.require_unchecked(id).await?;
        if category.is_root() {
            return Ok(false);
        }
        let Some(target) = self
            .get(new_parent, Strictness::IgnoreMissing, Access::Unchecked)
            .await?
        else {
            return Ok(false);
        };
        if target.id == category.id || category.is_ancestor_of(&target) {
            return Ok(false);
        }

        let mut ids = vec![category.id];
        ids.extend(self.descendant_ids(category.id).await?);
        for node in self.get_many(&ids, Access::Unchecked).await? {
            if !self.has_capability(Capability::ManageCategories, &node) {
                return Ok(false);
            }
        }

        if self.db.count_courses_in_category(category.id).await? > 0
            && (target.is_root() || !self.has_capability(Capability::CreateCourse, &target))
        {
            return Ok(false);
        }
        if !self.children_ids(category.id).await?.is_empty()
            && !self.has_capability(Capability::ManageCategories, &target)
        {
            return Ok(false);
        }
        Ok(true)
    }

    // ========================================================================
    // Courses and Ordering
    // ========================================================================

    /// Move courses into a category. Courses landing in a hidden category are
    /// hidden too. Returns how many courses moved.
    pub async fn move_courses(&self, course_ids: &[i64], category_id: i64) -> Result<u64> {
        let target = self.require_editable(category_id).await?;
        let moved = self
            .db
            .move_courses(course_ids, target.id, target.visible)
            .await?;
        if moved > 0 {
            self.db.fix_sortorder().await?;
            tracing::info!(category_id, courses = moved, "Courses moved");
        }
        Ok(moved)
    }

    /// Swap a category with its previous (`up`) or next sibling.
    ///
    /// Returns false when it is already first or last.
    pub async fn change_sortorder_by_one(&self, id: i64, up: bool) -> Result<bool> {
        let category = self.require_editable(id).await?;
        let siblings = self.children_ids(category.parent).await?;
        let Some(position) = siblings.iter().position(|&s| s == category.id) else {
            return Ok(false);
        };

        let neighbour = if up {
            position.checked_sub(1).and_then(|p| siblings.get(p))
        } else {
            siblings.get(position + 1)
        };
        let Some(&neighbour) = neighbour else {
            return Ok(false);
        };

        self.db.swap_category_sortorder(category.id, neighbour).await?;
        self.purge_cache();
        tracing::info!(category_id = id, swapped_with = neighbour, "Category reordered");
        Ok(true)
    }

    /// Renumber the direct children of a category (or of the root) by name
    /// or idnumber.
    pub async fn resort_subcategories(&self, id: i64, order: SiblingOrder) -> Result<()> {
        let category = self.require_unchecked(id).await?;
        self.db.resort_child_categories(category.id, order).await?;
        self.purge_cache();
        tracing::info!(category_id = id, ?order, "Subcategories resorted");
        Ok(())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    async fn require_editable(&self, id: i64) -> Result<Category> {
        let category = self.require_unchecked(id).await?;
        if category.is_root() {
            return Err(CategoryError::validation(
                "id",
                "the top of the tree cannot be modified",
            ));
        }
        Ok(category)
    }

    /// Trimmed idnumber, or `None` when blank. Uniqueness is case-sensitive.
    async fn validate_idnumber(
        &self,
        idnumber: Option<&str>,
        except_id: Option<i64>,
    ) -> Result<Option<String>> {
        let Some(idnumber) = idnumber.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        if idnumber.chars().count() > MAX_IDNUMBER_CHARS {
            return Err(CategoryError::validation(
                "idnumber",
                format!("must be at most {MAX_IDNUMBER_CHARS} characters"),
            ));
        }
        if self.db.category_idnumber_taken(idnumber, except_id).await? {
            return Err(CategoryError::validation(
                "idnumber",
                format!("\"{idnumber}\" is already used by another category"),
            ));
        }
        Ok(Some(idnumber.to_string()))
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = strip_control_chars(name).trim().to_string();
    if name.is_empty() {
        return Err(CategoryError::validation("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(CategoryError::validation(
            "name",
            format!("must be at most {MAX_NAME_CHARS} characters"),
        ));
    }
    Ok(name)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
