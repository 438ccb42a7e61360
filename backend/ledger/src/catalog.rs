//! Departments, courses and complaint categories.
//!
//! Reference data changes rarely and is only ever inserted, never edited,
//! by the seed loader.
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use crate::{
    database::{Store, stamp},
    error::Result,
    records::{Category, Course, Department, NewCategory, NewCourse, NewDepartment},
};

const DEPARTMENT_SELECT: &str = "SELECT id, name, code, description, head_name, email, phone, location
     FROM departments";

const COURSE_SELECT: &str = "SELECT c.id, c.name, c.code, c.duration_years, c.department_id,
            c.degree_type, d.name AS department_name
     FROM courses c LEFT JOIN departments d ON d.id = c.department_id";

const CATEGORY_SELECT: &str = "SELECT c.id, c.name, c.description, c.department_id,
            d.name AS department_name, c.priority_level, c.typical_resolution_days
     FROM complaint_categories c LEFT JOIN departments d ON d.id = c.department_id";

fn department(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get("id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        description: row.get("description")?,
        head_name: row.get("head_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        location: row.get("location")?,
    })
}

pub(crate) fn course(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get("id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        duration_years: row.get("duration_years")?,
        department_id: row.get("department_id")?,
        degree_type: row.get("degree_type")?,
        department_name: row.get("department_name")?,
    })
}

pub(crate) fn category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        department_id: row.get("department_id")?,
        department_name: row.get("department_name")?,
        priority_level: row.get("priority_level")?,
        typical_resolution_days: row.get("typical_resolution_days")?,
    })
}

pub(crate) fn course_by_id(conn: &rusqlite::Connection, id: i64) -> Result<Option<Course>> {
    Ok(conn
        .query_row(&format!("{COURSE_SELECT} WHERE c.id = ?1"), [id], course)
        .optional()?)
}

pub(crate) fn category_by_id(conn: &rusqlite::Connection, id: i64) -> Result<Option<Category>> {
    Ok(conn
        .query_row(&format!("{CATEGORY_SELECT} WHERE c.id = ?1"), [id], category)
        .optional()?)
}

impl Store {
    pub async fn list_departments(&self) -> Result<Vec<Department>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{DEPARTMENT_SELECT} ORDER BY id"))?;
            let rows = stmt.query_map([], department)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{COURSE_SELECT} ORDER BY c.id"))?;
            let rows = stmt.query_map([], course)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{CATEGORY_SELECT} ORDER BY c.id"))?;
            let rows = stmt.query_map([], category)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    pub async fn list_courses_by_department(&self, department_id: i64) -> Result<Vec<Course>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{COURSE_SELECT} WHERE c.department_id = ?1 ORDER BY c.id"
            ))?;
            let rows = stmt.query_map([department_id], course)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    pub async fn list_categories_by_department(&self, department_id: i64) -> Result<Vec<Category>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{CATEGORY_SELECT} WHERE c.department_id = ?1 ORDER BY c.id"
            ))?;
            let rows = stmt.query_map([department_id], category)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    pub async fn get_course(&self, id: i64) -> Result<Option<Course>> {
        self.with_conn(move |conn| course_by_id(conn, id)).await
    }

    pub async fn get_category(&self, id: i64) -> Result<Option<Category>> {
        self.with_conn(move |conn| category_by_id(conn, id)).await
    }

    pub async fn department_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))?)
        })
        .await
    }

    /// Returns `true` when inserted, `false` when a department with the code exists.
    pub async fn insert_department_if_absent(&self, new: NewDepartment) -> Result<bool> {
        self.write(move |tx| {
            let inserted = tx.execute(
                "INSERT INTO departments
                     (name, code, description, head_name, email, phone, location, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(code) DO NOTHING",
                params![
                    new.name,
                    new.code,
                    new.description,
                    new.head_name,
                    new.email,
                    new.phone,
                    new.location,
                    stamp(&Utc::now()),
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    /// Returns `true` when inserted, `false` when a course with the code exists.
    pub async fn insert_course_if_absent(&self, new: NewCourse) -> Result<bool> {
        self.write(move |tx| {
            let inserted = tx.execute(
                "INSERT INTO courses
                     (name, code, duration_years, department_id, degree_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(code) DO NOTHING",
                params![
                    new.name,
                    new.code,
                    new.duration_years,
                    new.department_id,
                    new.degree_type,
                    stamp(&Utc::now()),
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    /// Categories carry no unique column; the name identifies them.
    pub async fn insert_category_if_absent(&self, new: NewCategory) -> Result<bool> {
        self.write(move |tx| {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM complaint_categories WHERE name = ?1",
                    [&new.name],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if exists {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO complaint_categories
                     (name, description, department_id, priority_level,
                      typical_resolution_days, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.name,
                    new.description,
                    new.department_id,
                    new.priority_level,
                    new.typical_resolution_days,
                    stamp(&Utc::now()),
                ],
            )?;
            Ok(true)
        })
        .await
    }
}
