//! Capability checks consumed by the category store.
//!
//! The store never decides who may do what; it asks a [`PermissionChecker`].
//! Grants on a category apply to its whole subtree, so the store checks the
//! system scope and then every category on the path down to the target.
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Create, edit, move and delete categories.
    ManageCategories,
    /// See categories whose `visible` flag is off.
    ViewHiddenCategories,
    /// See courses whose `visible` flag is off.
    ViewHiddenCourses,
    CreateCourse,
    DeleteCourse,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::ManageCategories => "category:manage",
            Capability::ViewHiddenCategories => "category:viewhiddencategories",
            Capability::ViewHiddenCourses => "course:viewhiddencourses",
            Capability::CreateCourse => "course:create",
            Capability::DeleteCourse => "course:delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    System,
    Category(i64),
}

pub trait PermissionChecker: Send + Sync {
    fn can(&self, capability: Capability, scope: Scope) -> bool;

    /// User on whose behalf lookups run, for enrolment filters.
    fn viewer_id(&self) -> Option<i64> {
        None
    }
}

/// Site administrator: every capability everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn can(&self, _capability: Capability, _scope: Scope) -> bool {
        true
    }
}

/// Explicit grant list for a single user.
#[derive(Debug, Clone, Default)]
pub struct Grants {
    user_id: Option<i64>,
    granted: HashSet<(Capability, Scope)>,
}

impl Grants {
    pub fn new(user_id: Option<i64>) -> Self {
        Self {
            user_id,
            granted: HashSet::new(),
        }
    }

    pub fn grant(mut self, capability: Capability, scope: Scope) -> Self {
        self.granted.insert((capability, scope));
        self
    }
}

impl PermissionChecker for Grants {
    fn can(&self, capability: Capability, scope: Scope) -> bool {
        self.granted.contains(&(capability, scope))
    }

    fn viewer_id(&self) -> Option<i64> {
        self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grants_are_exact() {
        let grants = Grants::new(Some(4)).grant(Capability::ManageCategories, Scope::Category(2));

        assert!(grants.can(Capability::ManageCategories, Scope::Category(2)));
        assert!(!grants.can(Capability::ManageCategories, Scope::Category(3)));
        assert!(!grants.can(Capability::ManageCategories, Scope::System));
        assert!(!grants.can(Capability::DeleteCourse, Scope::Category(2)));
        assert_eq!(grants.viewer_id(), Some(4));
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.can(Capability::DeleteCourse, Scope::System));
        assert_eq!(AllowAll.viewer_id(), None);
    }
}
