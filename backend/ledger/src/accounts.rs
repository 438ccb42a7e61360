//! Students and administrators.
use chrono::{Datelike, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::{
    catalog::course_by_id,
    database::{Store, date_text, opt_date_column, opt_time_column, stamp, time_column},
    error::{LedgerError, Result},
    ids,
    mirror::{OutboxKind, enqueue},
    records::{ImportedStudent, NewAdmin, Role, StudentProfile, User},
};

const USER_SELECT: &str = "SELECT * FROM users";

pub(crate) fn user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        unique_id: row.get("unique_id")?,
        student_id: row.get("student_id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        role: row.get("role")?,
        course_id: row.get("course_id")?,
        course_name: row.get("course_name")?,
        department_id: row.get("department_id")?,
        department_name: row.get("department_name")?,
        year: row.get("year")?,
        semester: row.get("semester")?,
        roll_number: row.get("roll_number")?,
        admission_year: row.get("admission_year")?,
        address: row.get("address")?,
        parent_name: row.get("parent_name")?,
        parent_phone: row.get("parent_phone")?,
        hostel_room: row.get("hostel_room")?,
        blood_group: row.get("blood_group")?,
        date_of_birth: opt_date_column(row, "date_of_birth")?,
        gender: row.get("gender")?,
        category: row.get("category")?,
        designation: row.get("designation")?,
        is_active: row.get("is_active")?,
        last_login: opt_time_column(row, "last_login")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
        password_hash: row.get("password_hash")?,
    })
}

pub(crate) fn user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    Ok(conn
        .query_row(&format!("{USER_SELECT} WHERE id = ?1"), [id], user)
        .optional()?)
}

/// Looks up `admin_id` and insists it belongs to an administrator.
pub(crate) fn require_admin(conn: &Connection, admin_id: i64) -> Result<User> {
    match user_by_id(conn, admin_id)? {
        Some(admin) if admin.role == Role::Admin => Ok(admin),
        _ => Err(LedgerError::Forbidden("Invalid admin".to_string())),
    }
}

fn exists(conn: &Connection, sql: &str, value: &str) -> Result<bool> {
    Ok(conn.query_row(sql, [value], |_| Ok(()))
        .optional()?
        .is_some())
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<u32> {
    let count: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

fn insert_student(
    conn: &Connection,
    student_id: &str,
    course_name: Option<&str>,
    department_id: Option<i64>,
    department_name: Option<&str>,
    profile: &StudentProfile,
) -> Result<i64> {
    let now = stamp(&Utc::now());

    conn.execute(
        "INSERT INTO users (
             unique_id, student_id, name, email, phone, role, course_id, course_name,
             department_id, department_name, year, semester, roll_number, admission_year,
             address, parent_name, parent_phone, hostel_room, blood_group, date_of_birth,
             gender, category, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, 1, ?23, ?23)",
        params![
            Uuid::new_v4().to_string(),
            student_id,
            profile.name,
            profile.email,
            profile.phone,
            Role::Student,
            profile.course_id,
            course_name,
            department_id,
            department_name,
            profile.year,
            profile.semester,
            profile.roll_number,
            profile.admission_year,
            profile.address,
            profile.parent_name,
            profile.parent_phone,
            profile.hostel_room,
            profile.blood_group,
            profile.date_of_birth.as_ref().map(date_text),
            profile.gender,
            profile.category,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn register(conn: &Connection, profile: &StudentProfile) -> Result<User> {
    if exists(conn, "SELECT 1 FROM users WHERE email = ?1", &profile.email)? {
        return Err(LedgerError::validation("Email already registered"));
    }
    if let Some(roll_number) = &profile.roll_number {
        if exists(conn, "SELECT 1 FROM users WHERE roll_number = ?1", roll_number)? {
            return Err(LedgerError::validation("Roll number already exists"));
        }
    }

    let course = match profile.course_id {
        Some(id) => course_by_id(conn, id)?,
        None => None,
    };

    let this_year = Utc::now().year();
    let admission_year = profile.admission_year.unwrap_or(this_year);
    let mut sequence = match &course {
        Some(course) => count(
            conn,
            "SELECT COUNT(*) FROM users
             WHERE course_id = ?1 AND admission_year = ?2 AND role = 'student'",
            params![course.id, admission_year],
        )?,
        None => count(conn, "SELECT COUNT(*) FROM users WHERE role = 'student'", [])?,
    } + 1;

    // Roster imports may already hold the counted ID.
    let student_id = loop {
        let candidate = match &course {
            Some(course) => ids::student_id(admission_year, &course.code, sequence),
            None => ids::fallback_student_id(this_year, sequence),
        };
        if !exists(conn, "SELECT 1 FROM users WHERE student_id = ?1", &candidate)? {
            break candidate;
        }
        sequence += 1;
    };

    let department_id = profile
        .department_id
        .or_else(|| course.as_ref().map(|c| c.department_id));
    let id = insert_student(
        conn,
        &student_id,
        course.as_ref().map(|c| c.name.as_str()),
        department_id,
        course.as_ref().and_then(|c| c.department_name.as_deref()),
        profile,
    )?;
    enqueue(conn, OutboxKind::StudentCreated, id)?;

    user_by_id(conn, id)?.ok_or_else(|| LedgerError::not_found("User not found"))
}

impl Store {
    /// Assigns a student ID and records the student for the CSV mirror.
    pub async fn register_student(&self, profile: StudentProfile) -> Result<User> {
        self.write(move |tx| register(tx, &profile)).await
    }

    /// Inserts a student from an existing roster unless the student ID is taken.
    ///
    /// Imported students already live in the roster file, so nothing is
    /// queued for the mirror.
    pub async fn insert_student_if_absent(&self, student: ImportedStudent) -> Result<bool> {
        self.write(move |tx| {
            if exists(
                tx,
                "SELECT 1 FROM users WHERE student_id = ?1",
                &student.student_id,
            )? || exists(tx, "SELECT 1 FROM users WHERE email = ?1", &student.profile.email)?
            {
                return Ok(false);
            }

            insert_student(
                tx,
                &student.student_id,
                student.course_name.as_deref(),
                student.profile.department_id,
                student.department_name.as_deref(),
                &student.profile,
            )?;
            Ok(true)
        })
        .await
    }

    /// Creates the administrator unless one with the email exists.
    pub async fn ensure_admin(&self, admin: NewAdmin) -> Result<bool> {
        self.write(move |tx| {
            if exists(tx, "SELECT 1 FROM users WHERE email = ?1", &admin.email)? {
                return Ok(false);
            }

            let now = stamp(&Utc::now());
            tx.execute(
                "INSERT INTO users (unique_id, name, email, role, designation, department_id,
                                    password_hash, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
                params![
                    Uuid::new_v4().to_string(),
                    admin.name,
                    admin.email,
                    Role::Admin,
                    admin.designation,
                    admin.department_id,
                    admin.password_hash,
                    now,
                ],
            )?;
            Ok(true)
        })
        .await
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.with_conn(move |conn| user_by_id(conn, id)).await
    }

    pub async fn find_by_student_id(&self, student_id: String) -> Result<Option<User>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("{USER_SELECT} WHERE student_id = ?1"),
                    [&student_id],
                    user,
                )
                .optional()?)
        })
        .await
    }

    pub async fn find_admin_by_email(&self, email: String) -> Result<Option<User>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("{USER_SELECT} WHERE email = ?1 AND role = 'admin'"),
                    [&email],
                    user,
                )
                .optional()?)
        })
        .await
    }

    pub async fn touch_last_login(&self, id: i64) -> Result<()> {
        self.write(move |tx| {
            tx.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                params![stamp(&Utc::now()), id],
            )?;
            Ok(())
        })
        .await
    }
}
