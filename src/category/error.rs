use thiserror::Error;

use crate::storage::DatabaseError;

/// Errors raised by category lookups and mutations.
#[derive(Debug, Error)]
pub enum CategoryError {
    /// The category does not exist, or is hidden from the current viewer.
    #[error("Category {0} not found")]
    NotFound(i64),

    /// A name or idnumber constraint was violated.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The move would make the category its own ancestor.
    #[error("Cannot move category {id} under {new_parent}: a category cannot be moved into itself or its own subcategory")]
    Cycle { id: i64, new_parent: i64 },

    /// A course could not be deleted while deleting a category tree.
    #[error("Failed to delete course {course_id} while deleting category {category_id}")]
    CascadeFailure { category_id: i64, course_id: i64 },

    #[error(transparent)]
    Database(DatabaseError),
}

impl CategoryError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CategoryError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Errors caused by the request itself, which the caller should report
    /// back to the user rather than treat as a failure of the system.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CategoryError::NotFound(_)
                | CategoryError::Validation { .. }
                | CategoryError::Cycle { .. }
        )
    }
}

impl From<DatabaseError> for CategoryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::CourseDeleteFailed {
                category_id,
                course_id,
            } => CategoryError::CascadeFailure {
                category_id,
                course_id,
            },
            other => CategoryError::Database(other),
        }
    }
}

impl From<sqlx::Error> for CategoryError {
    fn from(err: sqlx::Error) -> Self {
        CategoryError::Database(DatabaseError::Other(err))
    }
}

pub type Result<T, E = CategoryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_failure_maps_from_storage() {
        let err: CategoryError = DatabaseError::CourseDeleteFailed {
            category_id: 3,
            course_id: 9,
        }
        .into();
        assert!(matches!(
            err,
            CategoryError::CascadeFailure {
                category_id: 3,
                course_id: 9
            }
        ));
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_user_errors() {
        assert!(CategoryError::NotFound(1).is_user_error());
        assert!(CategoryError::validation("name", "empty").is_user_error());
        assert!(CategoryError::Cycle {
            id: 1,
            new_parent: 2
        }
        .is_user_error());
        assert!(!CategoryError::Database(DatabaseError::InstanceLocked).is_user_error());
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = CategoryError::validation("idnumber", "already used by another category");
        assert_eq!(
            err.to_string(),
            "Invalid idnumber: already used by another category"
        );
    }
}
