//! Turns a [`CategoryView`] into a nested, serializable structure.
//!
//! The renderer decides nothing about what is shown; it only records the
//! state the view reports as explicit flags on each node.
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use super::options::PagingOptions;
use super::view::{CategoryView, CourseListing};
use crate::category::Result;

/// Navigation attached to a list that has more items than it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PagingControl {
    #[serde(rename_all = "camelCase")]
    PageBar {
        base_url: String,
        /// Zero-based.
        page: usize,
        per_page: usize,
        total: usize,
    },
    ViewMore { url: String },
}

impl PagingControl {
    /// Control for a list of `total` items shown through `paging`, if any.
    pub fn for_list(paging: &PagingOptions, total: usize) -> Option<Self> {
        let per_page = paging.limit?;
        if total <= per_page || per_page == 0 {
            return None;
        }
        if let Some(base_url) = &paging.base_url {
            return Some(PagingControl::PageBar {
                base_url: base_url.clone(),
                page: paging.offset / per_page,
                per_page,
                total,
            });
        }
        paging
            .view_more_url
            .as_ref()
            .map(|url| PagingControl::ViewMore { url: url.clone() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedCourse {
    pub id: i64,
    pub name: String,
    pub shortname: String,
    pub is_dimmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_label: Option<String>,
}

impl From<CourseListing> for RenderedCourse {
    fn from(course: CourseListing) -> Self {
        Self {
            id: course.id,
            name: course.fullname,
            shortname: course.shortname,
            is_dimmed: !course.visible,
            summary: course.summary,
            contacts: course
                .contacts
                .into_iter()
                .map(|c| format!("{}: {}", c.role, c.full_name))
                .collect(),
            category_label: course.category_label,
        }
    }
}

/// One category node in the rendered tree. Subcategories come before
/// courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedCategory {
    pub id: i64,
    pub name: String,
    pub depth: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub has_children: bool,
    pub is_collapsed_by_default: bool,
    pub is_dimmed: bool,
    pub is_loaded: bool,
    pub categories: Vec<RenderedCategory>,
    pub courses: Vec<RenderedCourse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_paging: Option<PagingControl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_paging: Option<PagingControl>,
}

impl RenderedCategory {
    pub fn find(&self, id: i64) -> Option<&RenderedCategory> {
        if self.id == id {
            return Some(self);
        }
        self.categories.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: i64) -> Option<&mut RenderedCategory> {
        if self.id == id {
            return Some(self);
        }
        self.categories.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Replace the node with the fragment's id by the fragment, leaving
    /// every other node untouched. Returns false if no node matches.
    pub fn graft(&mut self, fragment: RenderedCategory) -> bool {
        match self.find_mut(fragment.id) {
            Some(node) => {
                *node = fragment;
                true
            }
            None => false,
        }
    }

    /// Preorder walk over this node and every rendered descendant.
    pub fn walk(&self) -> Vec<&RenderedCategory> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.categories.iter().rev());
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeRenderer {
    /// Attach each loaded category's formatted description.
    pub with_descriptions: bool,
}

impl TreeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_descriptions(mut self) -> Self {
        self.with_descriptions = true;
        self
    }

    /// Render `view` and, while views stay loaded, everything below it.
    pub fn render<'a>(&'a self, view: &'a CategoryView) -> BoxFuture<'a, Result<RenderedCategory>> {
        async move {
            let category = view.category();
            let loaded = view.is_loaded();

            let mut categories = Vec::new();
            let mut courses = Vec::new();
            let mut category_paging = None;
            let mut course_paging = None;

            if loaded {
                for child in view.get_child_categories().await? {
                    categories.push(self.render(&child).await?);
                }
                courses = view
                    .get_child_courses()
                    .await?
                    .into_iter()
                    .map(RenderedCourse::from)
                    .collect();

                category_paging = PagingControl::for_list(
                    &view.category_paging(),
                    view.get_child_categories_count().await?,
                );
                course_paging = PagingControl::for_list(
                    &view.course_paging(),
                    view.get_child_courses_count().await?,
                );
            }

            let has_children = view.get_child_categories_count().await? > 0
                || view.get_child_courses_count().await? > 0;
            let has_content = !categories.is_empty() || !courses.is_empty();

            tracing::trace!(
                category_id = category.id,
                depth = view.depth(),
                loaded,
                "Rendered category"
            );

            Ok(RenderedCategory {
                id: category.id,
                name: category.formatted_name(),
                depth: view.depth(),
                description: if loaded && self.with_descriptions {
                    category.formatted_description()
                } else {
                    None
                },
                has_children,
                is_collapsed_by_default: has_children && !has_content,
                is_dimmed: !category.visible,
                is_loaded: loaded,
                categories,
                courses,
                category_paging,
                course_paging,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, children: Vec<RenderedCategory>) -> RenderedCategory {
        RenderedCategory {
            id,
            name: format!("Cat {id}"),
            depth: 0,
            description: None,
            has_children: !children.is_empty(),
            is_collapsed_by_default: false,
            is_dimmed: false,
            is_loaded: true,
            categories: children,
            courses: Vec::new(),
            category_paging: None,
            course_paging: None,
        }
    }

    #[test]
    fn test_paging_control_choice() {
        let mut paging = PagingOptions::limited(10);
        assert_eq!(PagingControl::for_list(&paging, 10), None);
        assert_eq!(PagingControl::for_list(&paging, 11), None);

        paging.view_more_url = Some("/course/index.php?categoryid=3".to_string());
        assert!(matches!(
            PagingControl::for_list(&paging, 11),
            Some(PagingControl::ViewMore { .. })
        ));

        paging.base_url = Some("/course/index.php?categoryid=3".to_string());
        paging.offset = 20;
        assert_eq!(
            PagingControl::for_list(&paging, 35),
            Some(PagingControl::PageBar {
                base_url: "/course/index.php?categoryid=3".to_string(),
                page: 2,
                per_page: 10,
                total: 35,
            })
        );
        assert_eq!(PagingControl::for_list(&PagingOptions::default(), 1000), None);
    }

    #[test]
    fn test_graft_replaces_only_target() {
        let mut tree = node(0, vec![node(1, vec![node(3, vec![])]), node(2, vec![])]);
        let mut fragment = node(3, vec![node(4, vec![])]);
        fragment.depth = 2;

        assert!(tree.graft(fragment));
        assert_eq!(tree.find(3).unwrap().categories[0].id, 4);
        assert_eq!(tree.find(2).unwrap().name, "Cat 2");
        assert!(!tree.graft(node(99, vec![])));
    }

    #[test]
    fn test_walk_is_preorder() {
        let tree = node(0, vec![node(1, vec![node(3, vec![])]), node(2, vec![])]);
        let ids: Vec<i64> = tree.walk().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(node(5, vec![])).unwrap();
        assert_eq!(json["isLoaded"], true);
        assert_eq!(json["hasChildren"], false);
        assert!(json.get("categoryPaging").is_none());

        let control = PagingControl::ViewMore {
            url: "/more".to_string(),
        };
        let json = serde_json::to_value(control).unwrap();
        assert_eq!(json["kind"], "viewMore");
    }
}
