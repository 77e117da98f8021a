use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How courses are listed under each category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShowCourses {
    /// Categories only.
    None,
    /// Course names only.
    #[default]
    Collapsed,
    /// Names with summary and contacts.
    Expanded,
    /// As `Expanded`, each course labelled with its category.
    ExpandedWithCategoryLabel,
}

impl ShowCourses {
    pub fn lists_courses(self) -> bool {
        self != ShowCourses::None
    }

    /// Whether summaries and contacts are fetched.
    pub fn with_details(self) -> bool {
        matches!(
            self,
            ShowCourses::Expanded | ShowCourses::ExpandedWithCategoryLabel
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShowCourses::None => "none",
            ShowCourses::Collapsed => "collapsed",
            ShowCourses::Expanded => "expanded",
            ShowCourses::ExpandedWithCategoryLabel => "expanded-with-category-label",
        }
    }
}

impl fmt::Display for ShowCourses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShowCourses {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ShowCourses::None),
            "collapsed" => Ok(ShowCourses::Collapsed),
            "expanded" => Ok(ShowCourses::Expanded),
            "expanded-with-category-label" | "expanded_with_category_label" => {
                Ok(ShowCourses::ExpandedWithCategoryLabel)
            }
            other => Err(format!(
                "unknown show-courses mode '{other}' (expected none, collapsed, expanded or expanded-with-category-label)"
            )),
        }
    }
}

/// Placeholder in paging URLs, replaced by the id of the category whose
/// list the control belongs to.
pub const CATEGORY_ID_PLACEHOLDER: &str = "{id}";

/// Paging for one list (categories or courses).
///
/// `offset` applies to the level the tree is rendered from; nested lists
/// always start at their first item and keep only `limit`. Nested levels
/// keep a URL only if it contains [`CATEGORY_ID_PLACEHOLDER`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingOptions {
    /// `None` lists everything.
    pub limit: Option<usize>,
    pub offset: usize,
    /// Rendered as a page bar when more items exist than are shown.
    pub base_url: Option<String>,
    /// Rendered as a single "view more" link when there is no `base_url`.
    pub view_more_url: Option<String>,
}

impl PagingOptions {
    pub fn limited(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// The paging applied to the lists of `category_id`.
    pub(crate) fn for_level(&self, category_id: i64, top_level: bool) -> PagingOptions {
        let id = category_id.to_string();
        let url_for = |url: &Option<String>| {
            url.as_deref()
                .filter(|u| top_level || u.contains(CATEGORY_ID_PLACEHOLDER))
                .map(|u| u.replace(CATEGORY_ID_PLACEHOLDER, &id))
        };
        PagingOptions {
            limit: self.limit,
            offset: if top_level { self.offset } else { 0 },
            base_url: url_for(&self.base_url),
            view_more_url: url_for(&self.view_more_url),
        }
    }

    pub(crate) fn window<T>(&self, items: Vec<T>) -> Vec<T> {
        let take = self.limit.unwrap_or(usize::MAX);
        items.into_iter().skip(self.offset).take(take).collect()
    }
}

/// Course search filters. When present, courses are searched across the
/// whole subtree instead of listed per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub text: Option<String>,
    pub tag: Option<String>,
    pub module: Option<String>,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty())
            && self.tag.is_none()
            && self.module.is_none()
    }
}

/// Declarative options shared by every view in one rendered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayOptions {
    pub show_courses: ShowCourses,
    /// Levels below the rendered root that are loaded; deeper categories
    /// are placeholders. `0` loads everything.
    pub subcategory_depth: i64,
    /// List the courses of the whole subtree without category grouping.
    pub omit_subcategories: bool,
    /// Only courses the viewer is enrolled in.
    pub enrolled_only: bool,
    pub categories: PagingOptions,
    pub courses: PagingOptions,
    pub search: Option<SearchCriteria>,
    /// Display columns of course summary excerpts.
    pub summary_width: usize,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_courses: ShowCourses::default(),
            subcategory_depth: 2,
            omit_subcategories: false,
            enrolled_only: false,
            categories: PagingOptions::default(),
            courses: PagingOptions::default(),
            search: None,
            summary_width: 200,
        }
    }
}

impl DisplayOptions {
    pub(crate) fn active_search(&self) -> Option<&SearchCriteria> {
        self.search.as_ref().filter(|s| !s.is_empty())
    }
}
