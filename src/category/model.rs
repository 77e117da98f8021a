use pulldown_cmark::{html, Parser};
use serde::Serialize;

use crate::storage::{CategoryRecord, DescriptionFormat, VisibilityState};
use crate::util::strip_control_chars;

/// A category in the course tree.
///
/// Always fully loaded from its row; there is no partially-populated state.
/// The top of the tree is the synthetic [`Category::root`], which has no row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub idnumber: Option<String>,
    pub description: Option<String>,
    pub description_format: DescriptionFormat,
    /// `0` for top-level categories.
    pub parent: i64,
    pub sort_order: i64,
    /// Explicit flag; a category under a hidden ancestor has it off too.
    pub visible: bool,
    /// Visibility to restore when the ancestor that hid this category is shown.
    pub visible_old: bool,
    pub depth: i64,
    /// Ancestor ids down to and including this one, e.g. `/1/7/42`.
    pub path: String,
    pub time_modified: i64,
}

impl Category {
    pub const ROOT_ID: i64 = 0;

    /// The pseudo-category every top-level category hangs from.
    pub fn root() -> Self {
        Self {
            id: Self::ROOT_ID,
            name: "Top".to_string(),
            idnumber: None,
            description: None,
            description_format: DescriptionFormat::default(),
            parent: Self::ROOT_ID,
            sort_order: 0,
            visible: true,
            visible_old: true,
            depth: 0,
            path: String::new(),
            time_modified: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == Self::ROOT_ID
    }

    /// Ids on the path, top-level first, including this category.
    pub fn path_ids(&self) -> Vec<i64> {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| segment.parse().ok())
            .collect()
    }

    /// Ancestor ids, top-level first, excluding this category and the root.
    pub fn parent_ids(&self) -> Vec<i64> {
        let mut ids = self.path_ids();
        ids.pop();
        ids
    }

    /// Whether `other` sits somewhere below this category.
    pub fn is_ancestor_of(&self, other: &Category) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.path_ids().contains(&self.id) && other.id != self.id
    }

    pub fn visibility_state(&self) -> VisibilityState {
        VisibilityState {
            id: self.id,
            visible: self.visible,
            visibleold: self.visible_old,
        }
    }

    /// Name safe to print: control characters removed.
    pub fn formatted_name(&self) -> String {
        strip_control_chars(&self.name).trim().to_string()
    }

    /// Description rendered to HTML according to its format.
    pub fn formatted_description(&self) -> Option<String> {
        let text = self.description.as_deref()?;
        if text.trim().is_empty() {
            return None;
        }
        let text = strip_control_chars(text);
        let rendered = match self.description_format {
            DescriptionFormat::Moodle | DescriptionFormat::Html => text.into_owned(),
            DescriptionFormat::Plain => escape_html(&text).replace('\n', "<br />"),
            DescriptionFormat::Markdown => {
                let mut out = String::with_capacity(text.len() * 3 / 2);
                html::push_html(&mut out, Parser::new(&text));
                out
            }
        };
        Some(rendered)
    }
}

impl From<&CategoryRecord> for Category {
    fn from(record: &CategoryRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            idnumber: record.idnumber.clone(),
            description: record.description.clone(),
            description_format: DescriptionFormat::from_code(record.descriptionformat),
            parent: record.parent,
            sort_order: record.sortorder,
            visible: record.visible,
            visible_old: record.visibleold,
            depth: record.depth,
            path: record.path.clone(),
            time_modified: record.timemodified,
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, path: &str) -> Category {
        Category {
            id,
            path: path.to_string(),
            depth: path.matches('/').count() as i64,
            name: format!("Cat {id}"),
            ..Category::root()
        }
    }

    #[test]
    fn test_root_shape() {
        let root = Category::root();
        assert!(root.is_root());
        assert_eq!(root.depth, 0);
        assert_eq!(root.path, "");
        assert!(root.visible);
        assert!(root.path_ids().is_empty());
    }

    #[test]
    fn test_path_ids_and_parents() {
        let cat = category(42, "/1/7/42");
        assert_eq!(cat.path_ids(), vec![1, 7, 42]);
        assert_eq!(cat.parent_ids(), vec![1, 7]);
    }

    #[test]
    fn test_is_ancestor_of() {
        let science = category(1, "/1");
        let physics = category(2, "/1/2");
        let art = category(3, "/3");

        assert!(science.is_ancestor_of(&physics));
        assert!(!physics.is_ancestor_of(&science));
        assert!(!science.is_ancestor_of(&art));
        assert!(!science.is_ancestor_of(&science));
        assert!(Category::root().is_ancestor_of(&art));
    }

    #[test]
    fn test_formatted_name_strips_escapes() {
        let mut cat = category(1, "/1");
        cat.name = "\x1b[31mScience\x1b[0m ".to_string();
        assert_eq!(cat.formatted_name(), "Science");
    }

    #[test]
    fn test_formatted_description_by_format() {
        let mut cat = category(1, "/1");
        assert_eq!(cat.formatted_description(), None);

        cat.description = Some("a < b\nc".to_string());
        cat.description_format = DescriptionFormat::Plain;
        assert_eq!(cat.formatted_description().unwrap(), "a &lt; b<br />c");

        cat.description = Some("**bold**".to_string());
        cat.description_format = DescriptionFormat::Markdown;
        assert_eq!(
            cat.formatted_description().unwrap().trim(),
            "<p><strong>bold</strong></p>"
        );

        cat.description = Some("<p>kept</p>".to_string());
        cat.description_format = DescriptionFormat::Html;
        assert_eq!(cat.formatted_description().unwrap(), "<p>kept</p>");
    }
}
