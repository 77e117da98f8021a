use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::{
    CategoryFieldChanges, CategoryRecord, CourseVisibilityAction, DatabaseError, DeletedContent,
    NewCategoryRow, VisibilityPlan, VisibilityState,
};

const CATEGORY_COLUMNS: &str = "id, name, idnumber, description, descriptionformat, parent, \
     sortorder, visible, visibleold, depth, path, timemodified";

/// Column used when renumbering a sibling group alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingOrder {
    Name,
    IdNumber,
}

/// Where a category is being moved to.
#[derive(Debug, Clone)]
pub struct ReparentRow {
    pub id: i64,
    pub old_path: String,
    pub old_depth: i64,
    pub new_parent: i64,
    pub new_parent_path: String,
    pub new_parent_depth: i64,
    pub timemodified: i64,
}

impl Database {
    // ========================================================================
    // Category Reads
    // ========================================================================

    /// Fetch one category row.
    pub async fn get_category(&self, id: i64) -> Result<Option<CategoryRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, CategoryRecord>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM course_categories WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Batch-fetch category rows. Missing ids are skipped.
    ///
    /// Chunks at 500 ids per query to stay below SQLite bind-parameter limits.
    pub async fn get_categories(&self, ids: &[i64]) -> Result<Vec<CategoryRecord>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        const CHUNK_SIZE: usize = 500;
        let mut result = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
                "SELECT {CATEGORY_COLUMNS} FROM course_categories WHERE id IN ("
            ));
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows: Vec<CategoryRecord> =
                builder.build_query_as().fetch_all(&self.pool).await?;
            result.extend(rows);
        }

        Ok(result)
    }

    /// Every `(id, parent)` pair, siblings in sort order.
    pub async fn category_parent_pairs(&self) -> Result<Vec<(i64, i64)>, DatabaseError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT id, parent FROM course_categories ORDER BY parent, sortorder, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Whether another category already uses `idnumber` (case-sensitive).
    pub async fn category_idnumber_taken(
        &self,
        idnumber: &str,
        except_id: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM course_categories WHERE idnumber = ? AND id != ?",
        )
        .bind(idnumber)
        .bind(except_id.unwrap_or(0))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Visibility flags of every category strictly below `path`.
    pub async fn descendant_visibility(
        &self,
        path: &str,
    ) -> Result<Vec<VisibilityState>, DatabaseError> {
        let rows = sqlx::query_as::<_, VisibilityState>(
            "SELECT id, visible, visibleold FROM course_categories WHERE path LIKE ? ORDER BY depth, sortorder",
        )
        .bind(format!("{path}/%"))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Ids of every category strictly below `path`, deepest first.
    pub async fn descendant_ids(&self, path: &str) -> Result<Vec<i64>, DatabaseError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM course_categories WHERE path LIKE ? ORDER BY depth DESC, id",
        )
        .bind(format!("{path}/%"))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ========================================================================
    // Category Writes
    // ========================================================================

    /// Insert a category at the end of its sibling group and fill in its path.
    ///
    /// The path can only be computed once the id is known, so insert and path
    /// update share one transaction.
    pub async fn insert_category(
        &self,
        row: &NewCategoryRow,
    ) -> Result<CategoryRecord, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let sortorder = next_sibling_sortorder(&mut *tx, row.parent).await?;
        let depth = row.parent_depth + 1;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO course_categories
                (name, idnumber, description, descriptionformat, parent, sortorder,
                 visible, visibleold, depth, path, timemodified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, '', ?)
            RETURNING id
        "#,
        )
        .bind(&row.name)
        .bind(&row.idnumber)
        .bind(&row.description)
        .bind(row.descriptionformat)
        .bind(row.parent)
        .bind(sortorder)
        .bind(row.visible)
        .bind(row.visibleold)
        .bind(depth)
        .bind(row.timemodified)
        .fetch_one(&mut *tx)
        .await?;

        let path = format!("{}/{}", row.parent_path, id);
        sqlx::query("UPDATE course_categories SET path = ? WHERE id = ?")
            .bind(&path)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let record = sqlx::query_as::<_, CategoryRecord>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM course_categories WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Write the given column changes and stamp `timemodified`.
    ///
    /// Returns false when there was nothing to write.
    pub async fn update_category_fields(
        &self,
        id: i64,
        changes: &CategoryFieldChanges,
        timemodified: i64,
    ) -> Result<bool, DatabaseError> {
        if changes.is_empty() {
            return Ok(false);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE course_categories SET timemodified = ");
        builder.push_bind(timemodified);
        if let Some(name) = &changes.name {
            builder.push(", name = ").push_bind(name.clone());
        }
        if let Some(idnumber) = &changes.idnumber {
            builder.push(", idnumber = ").push_bind(idnumber.clone());
        }
        if let Some(description) = &changes.description {
            builder.push(", description = ").push_bind(description.clone());
        }
        if let Some(format) = changes.descriptionformat {
            builder.push(", descriptionformat = ").push_bind(format);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a precomputed visibility plan as one batch.
    pub async fn apply_visibility_plan(
        &self,
        plan: &VisibilityPlan,
        timemodified: i64,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        apply_visibility_in(&mut *tx, plan, timemodified).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Move a category (and its whole subtree) under a new parent.
    ///
    /// The category lands at the end of its new sibling group. Descendant
    /// paths are rewritten by prefix and their depths shifted by the same
    /// delta. `then_hide`, when given, is applied in the same transaction.
    pub async fn reparent_category(
        &self,
        row: &ReparentRow,
        then_hide: Option<&VisibilityPlan>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        reparent_in(&mut *tx, row).await?;
        if let Some(plan) = then_hide {
            apply_visibility_in(&mut *tx, plan, row.timemodified).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Renumber every sibling group of categories to `1..n`, and every
    /// category's courses to `1..n`, keeping their relative order.
    pub async fn fix_sortorder(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE course_categories SET sortorder = (
                SELECT ranked.rn FROM (
                    SELECT id, ROW_NUMBER() OVER (PARTITION BY parent ORDER BY sortorder, id) AS rn
                    FROM course_categories
                ) AS ranked
                WHERE ranked.id = course_categories.id
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE courses SET sortorder = (
                SELECT ranked.rn FROM (
                    SELECT id, ROW_NUMBER() OVER (PARTITION BY category ORDER BY sortorder, id) AS rn
                    FROM courses
                ) AS ranked
                WHERE ranked.id = courses.id
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Exchange the sort positions of two categories.
    pub async fn swap_category_sortorder(&self, a: i64, b: i64) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let (sort_a,): (i64,) =
            sqlx::query_as("SELECT sortorder FROM course_categories WHERE id = ?")
                .bind(a)
                .fetch_one(&mut *tx)
                .await?;
        let (sort_b,): (i64,) =
            sqlx::query_as("SELECT sortorder FROM course_categories WHERE id = ?")
                .bind(b)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query("UPDATE course_categories SET sortorder = ? WHERE id = ?")
            .bind(sort_b)
            .bind(a)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE course_categories SET sortorder = ? WHERE id = ?")
            .bind(sort_a)
            .bind(b)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Renumber the direct children of `parent` by the given column.
    pub async fn resort_child_categories(
        &self,
        parent: i64,
        order: SiblingOrder,
    ) -> Result<(), DatabaseError> {
        // Ties (and missing idnumbers) keep their previous relative order.
        let order_by = match order {
            SiblingOrder::Name => "name COLLATE NOCASE, sortorder, id",
            SiblingOrder::IdNumber => "idnumber IS NULL, idnumber, sortorder, id",
        };

        sqlx::query(&format!(
            r#"
            UPDATE course_categories SET sortorder = (
                SELECT ranked.rn FROM (
                    SELECT id, ROW_NUMBER() OVER (ORDER BY {order_by}) AS rn
                    FROM course_categories WHERE parent = ?1
                ) AS ranked
                WHERE ranked.id = course_categories.id
            )
            WHERE parent = ?1
        "#
        ))
        .bind(parent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a category with every descendant category and course.
    ///
    /// Deepest categories go first, and each category's courses are removed
    /// before the category itself. Runs in one transaction: if any course
    /// cannot be deleted, nothing is deleted and
    /// `DatabaseError::CourseDeleteFailed` is returned.
    pub async fn delete_category_tree(
        &self,
        id: i64,
        path: &str,
    ) -> Result<DeletedContent, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let mut order: Vec<i64> = sqlx::query_as::<_, (i64,)>(
            "SELECT id FROM course_categories WHERE path LIKE ? ORDER BY depth DESC, id",
        )
        .bind(format!("{path}/%"))
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(id,)| id)
        .collect();
        order.push(id);

        let mut deleted = DeletedContent::default();
        for category_id in order {
            let course_ids: Vec<(i64,)> =
                sqlx::query_as("SELECT id FROM courses WHERE category = ? ORDER BY sortorder")
                    .bind(category_id)
                    .fetch_all(&mut *tx)
                    .await?;

            for (course_id,) in course_ids {
                let result = sqlx::query("DELETE FROM courses WHERE id = ?")
                    .bind(course_id)
                    .execute(&mut *tx)
                    .await?;
                if result.rows_affected() != 1 {
                    // Dropping `tx` rolls everything back.
                    return Err(DatabaseError::CourseDeleteFailed {
                        category_id,
                        course_id,
                    });
                }
                deleted.courses.push(course_id);
            }

            sqlx::query("DELETE FROM course_categories WHERE id = ?")
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
            deleted.categories.push(category_id);
        }

        tx.commit().await?;
        Ok(deleted)
    }

    /// Delete a single category row. Callers empty it first.
    pub async fn delete_category_row(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM course_categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Transaction Helpers
// ============================================================================

async fn next_sibling_sortorder(
    conn: &mut SqliteConnection,
    parent: i64,
) -> Result<i64, sqlx::Error> {
    let (max,): (Option<i64>,) =
        sqlx::query_as("SELECT MAX(sortorder) FROM course_categories WHERE parent = ?")
            .bind(parent)
            .fetch_one(&mut *conn)
            .await?;
    Ok(max.unwrap_or(0) + 1)
}

async fn reparent_in(conn: &mut SqliteConnection, row: &ReparentRow) -> Result<(), sqlx::Error> {
    let new_path = format!("{}/{}", row.new_parent_path, row.id);
    let new_depth = row.new_parent_depth + 1;
    let depth_delta = new_depth - row.old_depth;
    let sortorder = next_sibling_sortorder(conn, row.new_parent).await?;

    sqlx::query(
        r#"
        UPDATE course_categories
        SET parent = ?, path = ?, depth = ?, sortorder = ?, timemodified = ?
        WHERE id = ?
    "#,
    )
    .bind(row.new_parent)
    .bind(&new_path)
    .bind(new_depth)
    .bind(sortorder)
    .bind(row.timemodified)
    .bind(row.id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE course_categories
        SET path = ? || substr(path, ?), depth = depth + ?
        WHERE path LIKE ?
    "#,
    )
    .bind(&new_path)
    .bind(row.old_path.len() as i64 + 1)
    .bind(depth_delta)
    .bind(format!("{}/%", row.old_path))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn apply_visibility_in(
    conn: &mut SqliteConnection,
    plan: &VisibilityPlan,
    timemodified: i64,
) -> Result<(), sqlx::Error> {
    for change in &plan.categories {
        sqlx::query(
            "UPDATE course_categories SET visible = ?, visibleold = ?, timemodified = ? WHERE id = ?",
        )
        .bind(change.visible)
        .bind(change.visibleold)
        .bind(timemodified)
        .bind(change.id)
        .execute(&mut *conn)
        .await?;
    }

    if plan.course_categories.is_empty() {
        return Ok(());
    }

    let set_clause = match plan.courses {
        CourseVisibilityAction::Hide => "UPDATE courses SET visibleold = visible, visible = 0",
        CourseVisibilityAction::Restore => "UPDATE courses SET visible = visibleold",
    };
    for chunk in plan.course_categories.chunks(500) {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(set_clause);
        builder.push(", timemodified = ").push_bind(timemodified);
        builder.push(" WHERE category IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        builder.build().execute(&mut *conn).await?;
    }

    Ok(())
}
