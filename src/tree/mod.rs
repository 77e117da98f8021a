//! Paginated, depth-limited display of the category tree.
//!
//! - [`CategoryView`] decides what each level contains under a set of
//!   [`DisplayOptions`]
//! - [`TreeRenderer`] walks views into a nested [`RenderedCategory`]
//! - [`LazyTree`] expands placeholder nodes on demand

mod expand;
mod options;
mod render;
mod view;

pub use expand::{
    fragment_json, load_fragment, ExpandError, ExpansionRequest, Fragment, LazyTree,
    PendingExpansion,
};
pub use options::{
    DisplayOptions, PagingOptions, SearchCriteria, ShowCourses, CATEGORY_ID_PLACEHOLDER,
};
pub use render::{PagingControl, RenderedCategory, RenderedCourse, TreeRenderer};
pub use view::{CategoryView, CourseListing};
