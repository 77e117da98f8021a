mod categories;
mod courses;
mod schema;
mod settings;
mod types;

pub use categories::{ReparentRow, SiblingOrder};
pub use schema::Database;
pub use settings::DEFAULT_CATEGORY_SETTING;
pub use types::{
    CategoryFieldChanges, CategoryRecord, CourseContact, CourseFilter, CourseRecord,
    CourseVisibilityAction, DatabaseError, DeletedContent, DescriptionFormat, NewCategoryRow,
    NewCourse, VisibilityChange, VisibilityPlan, VisibilityState,
};
