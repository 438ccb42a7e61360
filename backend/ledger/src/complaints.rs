//! # Complaint Lifecycle
//!
//! `Pending -> In Progress -> Resolved | Rejected`, though administrators may
//! move a complaint between any two states.
//!
//! - Entering `Resolved` stamps `resolved_at` and `actual_resolution_date`
//! - Leaving `Resolved` clears both so resolution stats only count live resolutions
//! - Every change bumps `updated_at` and queues a mirror update
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter, types::Value};

use crate::{
    accounts::{require_admin, user_by_id},
    catalog::category_by_id,
    database::{Store, opt_time_column, stamp, time_column},
    error::{LedgerError, Result},
    ids,
    mirror::{OutboxKind, csv_time, enqueue},
    records::{
        BulkAction, Comment, Complaint, ExportRow, NewComplaint, Notification, Priority, Role,
        SearchFilter, Status,
    },
};

const DEFAULT_RESOLUTION_DAYS: i64 = 7;
const NOTIFICATION_LIMIT: i64 = 10;

const COMPLAINT_SELECT: &str = "SELECT c.id, c.complaint_id, c.title, c.description,
            c.category_id, cat.name AS category_name,
            c.department_id, d.name AS department_name,
            c.status, c.priority, c.student_id,
            s.name AS student_name, s.student_id AS student_unique_id,
            c.urgency_level, c.expected_resolution_date, c.actual_resolution_date,
            c.assigned_to, a.name AS assigned_admin_name,
            c.created_at, c.updated_at, c.resolved_at
     FROM complaints c
     LEFT JOIN complaint_categories cat ON cat.id = c.category_id
     LEFT JOIN departments d ON d.id = c.department_id
     LEFT JOIN users s ON s.id = c.student_id
     LEFT JOIN users a ON a.id = c.assigned_to";

fn complaint(row: &Row<'_>) -> rusqlite::Result<Complaint> {
    Ok(Complaint {
        id: row.get("id")?,
        complaint_id: row.get("complaint_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        category_id: row.get("category_id")?,
        category_name: row.get("category_name")?,
        department_id: row.get("department_id")?,
        department_name: row.get("department_name")?,
        status: row.get("status")?,
        priority: row.get("priority")?,
        student_id: row.get("student_id")?,
        student_name: row.get("student_name")?,
        student_unique_id: row.get("student_unique_id")?,
        urgency_level: row.get("urgency_level")?,
        expected_resolution_date: opt_time_column(row, "expected_resolution_date")?,
        actual_resolution_date: opt_time_column(row, "actual_resolution_date")?,
        assigned_to: row.get("assigned_to")?,
        assigned_admin_name: row.get("assigned_admin_name")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
        resolved_at: opt_time_column(row, "resolved_at")?,
    })
}

fn complaint_by_id(conn: &Connection, id: i64) -> Result<Option<Complaint>> {
    Ok(conn
        .query_row(&format!("{COMPLAINT_SELECT} WHERE c.id = ?1"), [id], complaint)
        .optional()?)
}

fn require_complaint(conn: &Connection, id: i64) -> Result<Complaint> {
    complaint_by_id(conn, id)?.ok_or_else(|| LedgerError::not_found("Complaint not found"))
}

fn query_complaints(
    conn: &Connection,
    filter_sql: &str,
    params: Vec<Value>,
) -> Result<Vec<Complaint>> {
    let mut stmt = conn.prepare(&format!(
        "{COMPLAINT_SELECT} {filter_sql} ORDER BY c.created_at DESC, c.id DESC"
    ))?;
    let rows = stmt.query_map(params_from_iter(params), complaint)?;

    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Complaints filed so far in the month of `at`, plus one. Only meaningful
/// inside the write transaction that inserts the complaint.
fn next_complaint_sequence(conn: &Connection, at: DateTime<Utc>) -> Result<u32> {
    let (month_start, month_end) = ids::month_bounds(at);
    let same_month: i64 = conn.query_row(
        "SELECT COUNT(*) FROM complaints WHERE created_at >= ?1 AND created_at < ?2",
        params![stamp(&month_start), stamp(&month_end)],
        |row| row.get(0),
    )?;

    Ok(u32::try_from(same_month + 1).unwrap_or(u32::MAX))
}

fn create(conn: &Connection, new: &NewComplaint) -> Result<Complaint> {
    if user_by_id(conn, new.user_id)?.is_none() {
        return Err(LedgerError::not_found("User not found"));
    }

    let category = category_by_id(conn, new.category_id)?;
    let priority = category
        .as_ref()
        .map(|c| c.priority_level)
        .unwrap_or_default();
    let resolution_days = category
        .as_ref()
        .map(|c| c.typical_resolution_days)
        .unwrap_or(DEFAULT_RESOLUTION_DAYS);

    let now = Utc::now();
    let sequence = next_complaint_sequence(conn, now)?;
    let complaint_id = ids::complaint_id(now.year(), now.month(), sequence);

    conn.execute(
        "INSERT INTO complaints (
             complaint_id, title, description, category_id, department_id, status, priority,
             student_id, urgency_level, expected_resolution_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            complaint_id,
            new.title,
            new.description,
            new.category_id,
            new.department_id,
            Status::Pending,
            priority,
            new.user_id,
            new.urgency_level,
            stamp(&(now + Duration::days(resolution_days))),
            stamp(&now),
        ],
    )?;
    let id = conn.last_insert_rowid();
    enqueue(conn, OutboxKind::ComplaintCreated, id)?;

    require_complaint(conn, id)
}

/// Writes `status` and the resolution columns it implies.
fn apply_status(conn: &Connection, id: i64, status: Status) -> Result<()> {
    let now = stamp(&Utc::now());
    let resolved_at = (status == Status::Resolved).then(|| now.clone());

    conn.execute(
        "UPDATE complaints
         SET status = ?1, updated_at = ?2, resolved_at = ?3, actual_resolution_date = ?3
         WHERE id = ?4",
        params![status, now, resolved_at, id],
    )?;
    Ok(())
}

fn insert_comment(
    conn: &Connection,
    complaint_id: i64,
    admin_id: i64,
    admin_name: &str,
    text: &str,
) -> Result<Comment> {
    let now = Utc::now();

    conn.execute(
        "INSERT INTO comments (complaint_id, admin_id, admin_name, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![complaint_id, admin_id, admin_name, text, stamp(&now)],
    )?;

    Ok(Comment {
        id: conn.last_insert_rowid(),
        complaint_id,
        admin_id,
        admin_name: admin_name.to_string(),
        text: text.to_string(),
        created_at: now,
    })
}

fn comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        complaint_id: row.get("complaint_id")?,
        admin_id: row.get("admin_id")?,
        admin_name: row.get("admin_name")?,
        text: row.get("text")?,
        created_at: time_column(row, "created_at")?,
    })
}

/// `LIKE` pattern matching `needle` literally anywhere.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    format!("%{escaped}%")
}

fn day_start(date: NaiveDate) -> String {
    stamp(&date.and_time(NaiveTime::MIN).and_utc())
}

impl Store {
    /// Files a complaint: priority and due date come from the category, the
    /// ID from the count of complaints filed this month.
    pub async fn create_complaint(&self, new: NewComplaint) -> Result<Complaint> {
        self.write(move |tx| create(tx, &new)).await
    }

    pub async fn get_complaint(&self, id: i64) -> Result<Option<Complaint>> {
        self.with_conn(move |conn| complaint_by_id(conn, id)).await
    }

    /// Newest first, optionally only those filed by `user_id`.
    pub async fn list_complaints(&self, user_id: Option<i64>) -> Result<Vec<Complaint>> {
        self.with_conn(move |conn| match user_id {
            Some(user_id) => query_complaints(
                conn,
                "WHERE c.student_id = ?1",
                vec![Value::Integer(user_id)],
            ),
            None => query_complaints(conn, "", Vec::new()),
        })
        .await
    }

    /// Moves a complaint to `status`. When an administrator supplies a note,
    /// it is kept as a comment on the complaint.
    pub async fn update_status(
        &self,
        id: i64,
        status: Status,
        admin_comment: Option<String>,
        admin_id: Option<i64>,
    ) -> Result<Complaint> {
        self.write(move |tx| {
            require_complaint(tx, id)?;
            apply_status(tx, id, status)?;

            if let (Some(note), Some(admin_id)) = (admin_comment.as_deref(), admin_id) {
                if let Some(admin) = user_by_id(tx, admin_id)?.filter(|u| u.role == Role::Admin) {
                    let text = format!("Status changed to {status}. {note}");
                    insert_comment(tx, id, admin.id, &admin.name, &text)?;
                }
            }

            enqueue(tx, OutboxKind::ComplaintUpdated, id)?;
            require_complaint(tx, id)
        })
        .await
    }

    pub async fn update_priority(&self, id: i64, priority: Priority) -> Result<Complaint> {
        self.write(move |tx| {
            let changed = tx.execute(
                "UPDATE complaints SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                params![priority, stamp(&Utc::now()), id],
            )?;
            if changed == 0 {
                return Err(LedgerError::not_found("Complaint not found"));
            }

            enqueue(tx, OutboxKind::ComplaintUpdated, id)?;
            require_complaint(tx, id)
        })
        .await
    }

    /// Applies one action to every listed complaint that exists.
    pub async fn bulk_update(&self, ids: Vec<i64>, action: BulkAction) -> Result<usize> {
        self.write(move |tx| {
            if let BulkAction::Assign(admin_id) = action {
                require_admin(tx, admin_id)?;
            }

            let mut updated = 0;
            for &id in &ids {
                if complaint_by_id(tx, id)?.is_none() {
                    continue;
                }

                match action {
                    BulkAction::Status(status) => apply_status(tx, id, status)?,
                    BulkAction::Priority(priority) => {
                        tx.execute(
                            "UPDATE complaints SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                            params![priority, stamp(&Utc::now()), id],
                        )?;
                    }
                    BulkAction::Assign(admin_id) => {
                        tx.execute(
                            "UPDATE complaints SET assigned_to = ?1, updated_at = ?2 WHERE id = ?3",
                            params![admin_id, stamp(&Utc::now()), id],
                        )?;
                    }
                }
                enqueue(tx, OutboxKind::ComplaintUpdated, id)?;
                updated += 1;
            }

            if updated == 0 {
                return Err(LedgerError::not_found("No complaints found"));
            }
            Ok(updated)
        })
        .await
    }

    pub async fn add_comment(
        &self,
        complaint_id: i64,
        admin_id: i64,
        text: String,
    ) -> Result<Comment> {
        self.write(move |tx| {
            let admin = require_admin(tx, admin_id)?;
            require_complaint(tx, complaint_id)?;

            insert_comment(tx, complaint_id, admin.id, &admin.name, &text)
        })
        .await
    }

    /// Oldest first.
    pub async fn list_comments(&self, complaint_id: i64) -> Result<Vec<Comment>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM comments WHERE complaint_id = ?1 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map([complaint_id], comment)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    pub async fn search(&self, filter: SearchFilter) -> Result<Vec<Complaint>> {
        self.with_conn(move |conn| {
            let mut clauses = Vec::new();
            let mut values = Vec::new();

            if let Some(query) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                values.push(Value::Text(contains_pattern(query)));
                let n = values.len();
                clauses.push(format!(
                    "(c.title LIKE ?{n} ESCAPE '\\' OR c.description LIKE ?{n} ESCAPE '\\')"
                ));
            }
            if let Some(status) = filter.status {
                values.push(Value::Text(status.as_str().to_string()));
                clauses.push(format!("c.status = ?{}", values.len()));
            }
            if let Some(priority) = filter.priority {
                values.push(Value::Text(priority.as_str().to_string()));
                clauses.push(format!("c.priority = ?{}", values.len()));
            }
            if let Some(department_id) = filter.department_id {
                values.push(Value::Integer(department_id));
                clauses.push(format!("c.department_id = ?{}", values.len()));
            }
            if let Some(from) = filter.date_from {
                values.push(Value::Text(day_start(from)));
                clauses.push(format!("c.created_at >= ?{}", values.len()));
            }
            if let Some(to) = filter.date_to.and_then(|d| d.succ_opt()) {
                values.push(Value::Text(day_start(to)));
                clauses.push(format!("c.created_at < ?{}", values.len()));
            }

            let filter_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            query_complaints(conn, &filter_sql, values)
        })
        .await
    }

    pub async fn export_rows(&self) -> Result<Vec<ExportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.complaint_id, s.student_id, s.name AS student_name, s.email,
                        s.course_name, d.name AS department, c.title, c.description,
                        cat.name AS category, c.status, c.priority, c.urgency_level,
                        c.created_at, c.updated_at, c.resolved_at
                 FROM complaints c
                 JOIN users s ON s.id = c.student_id
                 LEFT JOIN departments d ON d.id = c.department_id
                 LEFT JOIN complaint_categories cat ON cat.id = c.category_id
                 ORDER BY c.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ExportRow {
                    complaint_id: row.get("complaint_id")?,
                    student_id: row.get("student_id")?,
                    student_name: row.get("student_name")?,
                    email: row.get("email")?,
                    course: row.get("course_name")?,
                    department: row
                        .get::<_, Option<String>>("department")?
                        .unwrap_or_default(),
                    title: row.get("title")?,
                    description: row.get("description")?,
                    category: row.get::<_, Option<String>>("category")?.unwrap_or_default(),
                    status: row.get("status")?,
                    priority: row.get("priority")?,
                    urgency_level: row.get("urgency_level")?,
                    created_at: csv_time(&time_column(row, "created_at")?),
                    updated_at: csv_time(&time_column(row, "updated_at")?),
                    resolved_at: opt_time_column(row, "resolved_at")?
                        .as_ref()
                        .map(csv_time)
                        .unwrap_or_default(),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    /// Students hear about their complaints touched this week; administrators
    /// about complaints still pending from the last day.
    pub async fn notifications(&self, user_id: i64) -> Result<Vec<Notification>> {
        self.with_conn(move |conn| {
            let user = user_by_id(conn, user_id)?
                .ok_or_else(|| LedgerError::not_found("User not found"))?;
            let now = Utc::now();

            let mut notifications = match user.role {
                Role::Student => query_complaints(
                    conn,
                    "WHERE c.student_id = ?1 AND c.updated_at > ?2",
                    vec![
                        Value::Integer(user.id),
                        Value::Text(stamp(&(now - Duration::days(7)))),
                    ],
                )?
                .into_iter()
                .map(|c| Notification {
                    id: format!("complaint_{}", c.id),
                    kind: "complaint_update",
                    title: format!("Complaint {} Updated", c.complaint_id),
                    message: format!("Status changed to {}", c.status),
                    timestamp: c.updated_at,
                    read: false,
                })
                .collect::<Vec<_>>(),
                Role::Admin => query_complaints(
                    conn,
                    "WHERE c.status = ?1 AND c.created_at > ?2",
                    vec![
                        Value::Text(Status::Pending.as_str().to_string()),
                        Value::Text(stamp(&(now - Duration::days(1)))),
                    ],
                )?
                .into_iter()
                .map(|c| Notification {
                    id: format!("new_complaint_{}", c.id),
                    kind: "new_complaint",
                    title: "New Complaint Received".to_string(),
                    message: format!(
                        "{} - {}",
                        c.title,
                        c.student_name.as_deref().unwrap_or("Unknown student")
                    ),
                    timestamp: c.created_at,
                    read: false,
                })
                .collect::<Vec<_>>(),
            };

            notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            notifications.truncate(NOTIFICATION_LIMIT as usize);
            Ok(notifications)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_patterns_escape_wildcards() {
        assert_eq!(contains_pattern("wifi"), "%wifi%");
        assert_eq!(contains_pattern("100%_done"), "%100\\%\\_done%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_day_start_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(day_start(date), "2026-10-19T00:00:00.000000Z");
    }
}
