use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The category database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A course could not be removed during a cascading delete; the whole
    /// delete was rolled back.
    #[error("Course {course_id} in category {category_id} could not be deleted")]
    CourseDeleteFailed { category_id: i64, course_id: i64 },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Category Rows
// ============================================================================

/// How a category description is stored and must be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionFormat {
    /// Legacy rich text, rendered as-is.
    #[default]
    Moodle,
    Html,
    Plain,
    Markdown,
}

impl DescriptionFormat {
    pub fn code(self) -> i64 {
        match self {
            DescriptionFormat::Moodle => 0,
            DescriptionFormat::Html => 1,
            DescriptionFormat::Plain => 2,
            DescriptionFormat::Markdown => 4,
        }
    }

    /// Unknown codes fall back to the legacy format.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => DescriptionFormat::Html,
            2 => DescriptionFormat::Plain,
            4 => DescriptionFormat::Markdown,
            _ => DescriptionFormat::Moodle,
        }
    }
}

/// Full `course_categories` row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub idnumber: Option<String>,
    pub description: Option<String>,
    pub descriptionformat: i64,
    pub parent: i64,
    pub sortorder: i64,
    pub visible: bool,
    pub visibleold: bool,
    pub depth: i64,
    pub path: String,
    pub timemodified: i64,
}

/// Values for a row about to be inserted. `depth`, `path` and `sortorder`
/// are computed by the storage layer.
#[derive(Debug, Clone)]
pub struct NewCategoryRow {
    pub name: String,
    pub idnumber: Option<String>,
    pub description: Option<String>,
    pub descriptionformat: i64,
    pub parent: i64,
    pub parent_path: String,
    pub parent_depth: i64,
    pub visible: bool,
    /// Visibility to restore once every hidden ancestor is shown again.
    pub visibleold: bool,
    pub timemodified: i64,
}

/// Column-level changes for an existing row. `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct CategoryFieldChanges {
    pub name: Option<String>,
    pub idnumber: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub descriptionformat: Option<i64>,
}

impl CategoryFieldChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.idnumber.is_none()
            && self.description.is_none()
            && self.descriptionformat.is_none()
    }
}

/// Visibility flags of one category, as read before a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct VisibilityState {
    pub id: i64,
    pub visible: bool,
    pub visibleold: bool,
}

/// One row update produced by a visibility plan.
pub type VisibilityChange = VisibilityState;

/// What happens to the courses of the categories touched by a visibility plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseVisibilityAction {
    /// `visibleold = visible, visible = 0`
    Hide,
    /// `visible = visibleold`
    Restore,
}

/// Batch of visibility writes computed before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPlan {
    pub categories: Vec<VisibilityChange>,
    /// Categories whose courses follow the cascade.
    pub course_categories: Vec<i64>,
    pub courses: CourseVisibilityAction,
}

// ============================================================================
// Course Rows
// ============================================================================

/// `courses` row as listed inside a category.
///
/// `summary` is only selected for expanded listings.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CourseRecord {
    pub id: i64,
    pub category: i64,
    pub sortorder: i64,
    pub fullname: String,
    pub shortname: String,
    pub idnumber: Option<String>,
    pub summary: Option<String>,
    pub visible: bool,
    pub visibleold: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub category: i64,
    pub fullname: String,
    pub shortname: String,
    pub idnumber: Option<String>,
    pub summary: Option<String>,
    pub visible: bool,
}

/// A person listed against a course (teacher, manager, ...).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseContact {
    pub course_id: i64,
    pub role: String,
    pub full_name: String,
}

/// Filters applied to a course listing or count.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    /// Categories to list from, in display order.
    pub categories: Vec<i64>,
    /// Categories in which hidden courses may be listed.
    pub hidden_allowed_in: Vec<i64>,
    /// Restrict to courses this user is enrolled in.
    pub enrolled_user: Option<i64>,
    /// Free text matched against fullname, shortname and summary.
    pub text: Option<String>,
    pub tag: Option<String>,
    pub module: Option<String>,
}

/// Result of a cascading delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedContent {
    pub categories: Vec<i64>,
    pub courses: Vec<i64>,
}
