use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{CourseContact, CourseFilter, CourseRecord, DatabaseError, NewCourse};

impl Database {
    // ========================================================================
    // Course Writes
    // ========================================================================

    /// Insert a course at the end of its category, returning its ID.
    pub async fn insert_course(&self, course: &NewCourse) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO courses
                (category, sortorder, fullname, shortname, idnumber, summary,
                 visible, visibleold, timecreated, timemodified)
            VALUES (
                ?,
                (SELECT COALESCE(MAX(sortorder), 0) + 1 FROM courses WHERE category = ?),
                ?, ?, ?, ?, ?, ?, ?, ?
            )
            RETURNING id
        "#,
        )
        .bind(course.category)
        .bind(course.category)
        .bind(&course.fullname)
        .bind(&course.shortname)
        .bind(&course.idnumber)
        .bind(&course.summary)
        .bind(course.visible)
        .bind(course.visible)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn add_course_contact(
        &self,
        course_id: i64,
        role: &str,
        full_name: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO course_contacts (course_id, role, full_name) VALUES (?, ?, ?)")
            .bind(course_id)
            .bind(role)
            .bind(full_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_course_tag(&self, course_id: i64, tag: &str) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR IGNORE INTO course_tags (course_id, tag) VALUES (?, ?)")
            .bind(course_id)
            .bind(tag)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_course_module(
        &self,
        course_id: i64,
        module: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR IGNORE INTO course_modules (course_id, module) VALUES (?, ?)")
            .bind(course_id)
            .bind(module)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn enrol_user(&self, course_id: i64, user_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR IGNORE INTO enrolments (course_id, user_id) VALUES (?, ?)")
            .bind(course_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move courses into `category`, appending them after its existing courses.
    ///
    /// Courses moved into a hidden category are hidden, with their previous
    /// visibility kept in `visibleold` so that showing the category restores it.
    /// Returns the number of courses moved.
    pub async fn move_courses(
        &self,
        course_ids: &[i64],
        category: i64,
        category_visible: bool,
    ) -> Result<u64, DatabaseError> {
        if course_ids.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut moved = 0;

        for course_id in course_ids {
            let result = sqlx::query(
                r#"
                UPDATE courses SET
                    category = ?1,
                    sortorder = (SELECT COALESCE(MAX(sortorder), 0) + 1 FROM courses WHERE category = ?1),
                    visibleold = CASE WHEN ?2 THEN visibleold ELSE visible END,
                    visible = CASE WHEN ?2 THEN visible ELSE 0 END,
                    timemodified = ?3
                WHERE id = ?4 AND category != ?1
            "#,
            )
            .bind(category)
            .bind(category_visible)
            .bind(now)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;
            moved += result.rows_affected();
        }

        tx.commit().await?;
        Ok(moved)
    }

    // ========================================================================
    // Course Reads
    // ========================================================================

    /// Ids of the courses directly inside `category`, in sort order.
    pub async fn course_ids_in_category(&self, category: i64) -> Result<Vec<i64>, DatabaseError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM courses WHERE category = ? ORDER BY sortorder, id")
                .bind(category)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Number of courses (hidden or not) directly inside `category`.
    pub async fn count_courses_in_category(&self, category: i64) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM courses WHERE category = ?")
            .bind(category)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// List courses matching `filter`, ordered by the position of their
    /// category in `filter.categories`, then by course sort order.
    ///
    /// `with_summary` selects the summary column; without it the column is
    /// returned as NULL. `limit = None` lists everything after `offset`.
    pub async fn list_courses(
        &self,
        filter: &CourseFilter,
        with_summary: bool,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<CourseRecord>, DatabaseError> {
        if filter.categories.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT c.id, c.category, c.sortorder, c.fullname, c.shortname, c.idnumber, CASE WHEN ",
        );
        builder
            .push_bind(with_summary)
            .push(" THEN c.summary ELSE NULL END AS summary, c.visible, c.visibleold FROM courses c");
        push_course_filter(&mut builder, filter);

        builder.push(" ORDER BY CASE c.category");
        for (position, category) in filter.categories.iter().enumerate() {
            builder
                .push(" WHEN ")
                .push_bind(*category)
                .push(" THEN ")
                .push_bind(position as i64);
        }
        builder.push(" END, c.sortorder, c.id LIMIT ");
        builder.push_bind(limit.unwrap_or(-1));
        builder.push(" OFFSET ").push_bind(offset);

        let rows: Vec<CourseRecord> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Count courses matching `filter`.
    pub async fn count_courses(&self, filter: &CourseFilter) -> Result<i64, DatabaseError> {
        if filter.categories.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM courses c");
        push_course_filter(&mut builder, filter);

        let (count,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Contacts for the given courses, grouped in course order.
    pub async fn course_contacts(
        &self,
        course_ids: &[i64],
    ) -> Result<Vec<CourseContact>, DatabaseError> {
        if course_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = Vec::new();
        for chunk in course_ids.chunks(500) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "SELECT course_id, role, full_name FROM course_contacts WHERE course_id IN (",
            );
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY course_id, id");

            let rows: Vec<CourseContact> = builder.build_query_as().fetch_all(&self.pool).await?;
            result.extend(rows);
        }
        Ok(result)
    }
}

/// Append the `WHERE` clause shared by course listing and counting.
fn push_course_filter(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, filter: &CourseFilter) {
    builder.push(" WHERE c.category IN (");
    let mut separated = builder.separated(", ");
    for id in &filter.categories {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    builder.push(" AND (c.visible = 1");
    if !filter.hidden_allowed_in.is_empty() {
        builder.push(" OR c.category IN (");
        let mut separated = builder.separated(", ");
        for id in &filter.hidden_allowed_in {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
    }
    builder.push(")");

    if let Some(user_id) = filter.enrolled_user {
        builder
            .push(" AND c.id IN (SELECT course_id FROM enrolments WHERE user_id = ")
            .push_bind(user_id)
            .push(")");
    }

    if let Some(text) = filter.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = format!("%{}%", escape_like(text));
        builder
            .push(" AND (c.fullname LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR c.shortname LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR c.summary LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }

    if let Some(tag) = &filter.tag {
        builder
            .push(" AND c.id IN (SELECT course_id FROM course_tags WHERE tag = ")
            .push_bind(tag.clone())
            .push(")");
    }

    if let Some(module) = &filter.module {
        builder
            .push(" AND c.id IN (SELECT course_id FROM course_modules WHERE module = ")
            .push_bind(module.clone())
            .push(")");
    }
}

/// Search text is matched literally; `%` and `_` are not wildcards.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
