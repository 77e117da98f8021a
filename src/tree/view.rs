use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::options::{DisplayOptions, PagingOptions, ShowCourses};
use crate::category::{Access, Capability, Category, CategoryStore, Result};
use crate::storage::{CourseContact, CourseFilter, CourseRecord};
use crate::util::{html_to_text, shorten_text, strip_control_chars};

/// A course as listed under a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseListing {
    pub id: i64,
    pub category: i64,
    pub fullname: String,
    pub shortname: String,
    pub visible: bool,
    /// Plain-text excerpt; only for expanded listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Only for expanded listings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<CourseContact>,
    /// Name of the course's category, for `expanded-with-category-label`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_label: Option<String>,
}

/// One category together with the options it is displayed with.
///
/// Views are cheap to create and hold no data until asked. Fetching
/// children records their total count, so calling a `*_count` method after
/// the matching fetch costs no query.
pub struct CategoryView {
    store: CategoryStore,
    category: Category,
    options: Arc<DisplayOptions>,
    depth: i64,
    /// Whether this is the view the tree is rendered from.
    top_level: bool,
    categories_count: OnceLock<usize>,
    courses_count: OnceLock<usize>,
}

impl std::fmt::Debug for CategoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryView")
            .field("category", &self.category.id)
            .field("depth", &self.depth)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl CategoryView {
    /// View rooted at `category`, at depth 0.
    pub fn new(store: CategoryStore, category: Category, options: DisplayOptions) -> Self {
        Self::with_depth(store, category, Arc::new(options), 0)
    }

    /// View rendered from `category`, which sits `depth` levels below the
    /// root of an earlier rendering.
    pub fn with_depth(
        store: CategoryStore,
        category: Category,
        options: Arc<DisplayOptions>,
        depth: i64,
    ) -> Self {
        Self {
            store,
            category,
            options,
            depth,
            top_level: true,
            categories_count: OnceLock::new(),
            courses_count: OnceLock::new(),
        }
    }

    fn child(&self, category: Category) -> Self {
        Self {
            top_level: false,
            ..Self::with_depth(
                self.store.clone(),
                category,
                Arc::clone(&self.options),
                self.depth + 1,
            )
        }
    }

    pub fn store(&self) -> &CategoryStore {
        &self.store
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn options(&self) -> &DisplayOptions {
        &self.options
    }

    /// Levels below the view the tree was rendered from.
    pub fn depth(&self) -> i64 {
        self.depth
    }

    /// Paging of this view's subcategory list.
    pub fn category_paging(&self) -> PagingOptions {
        self.options
            .categories
            .for_level(self.category.id, self.top_level)
    }

    /// Paging of this view's course list.
    pub fn course_paging(&self) -> PagingOptions {
        self.options
            .courses
            .for_level(self.category.id, self.top_level)
    }

    /// Whether this level's content is materialized. Views deeper than
    /// `subcategory_depth` are placeholders for lazy expansion.
    pub fn is_loaded(&self) -> bool {
        self.options.subcategory_depth <= 0 || self.depth <= self.options.subcategory_depth
    }

    // ========================================================================
    // Subcategories
    // ========================================================================

    async fn visible_children(&self) -> Result<Vec<Category>> {
        if self.options.omit_subcategories || self.options.active_search().is_some() {
            return Ok(Vec::new());
        }
        self.store.get_children(&self.category).await
    }

    /// The page of direct subcategories the viewer can see, one level deeper.
    pub async fn get_child_categories(&self) -> Result<Vec<CategoryView>> {
        let children = self.visible_children().await?;
        let _ = self.categories_count.set(children.len());

        Ok(self
            .category_paging()
            .window(children)
            .into_iter()
            .map(|child| self.child(child))
            .collect())
    }

    /// Total visible subcategories, ignoring paging.
    pub async fn get_child_categories_count(&self) -> Result<usize> {
        if let Some(&count) = self.categories_count.get() {
            return Ok(count);
        }
        let count = self.visible_children().await?.len();
        let _ = self.categories_count.set(count);
        Ok(count)
    }

    // ========================================================================
    // Courses
    // ========================================================================

    /// Filter for this view's courses, or `None` when it lists none.
    async fn course_filter(&self) -> Result<Option<CourseFilter>> {
        let search = self.options.active_search();
        if !self.options.show_courses.lists_courses() && search.is_none() {
            return Ok(None);
        }

        let enrolled_user = if self.options.enrolled_only {
            match self.store.permissions().viewer_id() {
                Some(user) => Some(user),
                None => return Ok(None),
            }
        } else {
            None
        };

        let scope = if self.options.omit_subcategories || search.is_some() {
            let mut ids = Vec::new();
            if !self.category.is_root() {
                ids.push(self.category.id);
            }
            ids.extend(self.store.descendant_ids(self.category.id).await?);
            self.store.get_many(&ids, Access::Checked).await?
        } else if self.category.is_root() {
            Vec::new()
        } else {
            vec![self.category.clone()]
        };
        if scope.is_empty() {
            return Ok(None);
        }

        let hidden_allowed_in = scope
            .iter()
            .filter(|c| self.store.has_capability(Capability::ViewHiddenCourses, c))
            .map(|c| c.id)
            .collect();

        Ok(Some(CourseFilter {
            categories: scope.iter().map(|c| c.id).collect(),
            hidden_allowed_in,
            enrolled_user,
            text: search.and_then(|s| s.text.clone()),
            tag: search.and_then(|s| s.tag.clone()),
            module: search.and_then(|s| s.module.clone()),
        }))
    }

    /// The page of courses to list under this view.
    ///
    /// Direct courses normally; the whole subtree's when subcategories are
    /// omitted or a search is active. Summaries and contacts are only
    /// fetched for expanded modes.
    pub async fn get_child_courses(&self) -> Result<Vec<CourseListing>> {
        let Some(filter) = self.course_filter().await? else {
            let _ = self.courses_count.set(0);
            return Ok(Vec::new());
        };

        let db = self.store.database();
        let paging = self.course_paging();
        let details = self.options.show_courses.with_details();
        let rows = db
            .list_courses(
                &filter,
                details,
                paging.limit.map(|l| l as i64),
                paging.offset as i64,
            )
            .await?;

        // A short page tells us the total without a second query.
        let fetched = rows.len();
        let last_page = paging.limit.map_or(true, |limit| fetched < limit);
        let total = if last_page && (fetched > 0 || paging.offset == 0) {
            paging.offset + fetched
        } else {
            usize::try_from(db.count_courses(&filter).await?).unwrap_or(0)
        };
        let _ = self.courses_count.set(total);

        let mut contacts: HashMap<i64, Vec<CourseContact>> = HashMap::new();
        if details {
            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            for contact in db.course_contacts(&ids).await? {
                contacts.entry(contact.course_id).or_default().push(contact);
            }
        }

        let labels = if self.options.show_courses == ShowCourses::ExpandedWithCategoryLabel {
            self.category_labels(&rows).await?
        } else {
            HashMap::new()
        };

        let width = self.options.summary_width;
        Ok(rows
            .into_iter()
            .map(|row| CourseListing {
                summary: row
                    .summary
                    .as_deref()
                    .map(|s| html_to_text(&strip_control_chars(s)))
                    .filter(|s| !s.is_empty())
                    .map(|s| shorten_text(&s, width).into_owned()),
                contacts: contacts.remove(&row.id).unwrap_or_default(),
                category_label: labels.get(&row.category).cloned(),
                id: row.id,
                category: row.category,
                fullname: strip_control_chars(&row.fullname).into_owned(),
                shortname: strip_control_chars(&row.shortname).into_owned(),
                visible: row.visible,
            })
            .collect())
    }

    async fn category_labels(&self, rows: &[CourseRecord]) -> Result<HashMap<i64, String>> {
        let mut ids: Vec<i64> = rows.iter().map(|r| r.category).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(self
            .store
            .get_many(&ids, Access::Unchecked)
            .await?
            .into_iter()
            .map(|c| (c.id, c.formatted_name()))
            .collect())
    }

    /// Total courses this view would list, ignoring paging.
    pub async fn get_child_courses_count(&self) -> Result<usize> {
        if let Some(&count) = self.courses_count.get() {
            return Ok(count);
        }
        let count = match self.course_filter().await? {
            Some(filter) => {
                usize::try_from(self.store.database().count_courses(&filter).await?).unwrap_or(0)
            }
            None => 0,
        };
        let _ = self.courses_count.set(count);
        Ok(count)
    }
}
