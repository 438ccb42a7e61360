//! # CSV Mirror
//!
//! Spreadsheet copies of the students and complaints tables.
//!
//! ## Files
//! - `students.csv`: one row per registered student, append only
//! - `student_complaints.csv`: one row per complaint, status columns rewritten on update
//!
//! ## Consistency
//! The database is the source of truth. Every write that must show up in a
//! spreadsheet records a `mirror_outbox` row in the same transaction. The
//! mirror drains the outbox in id order, re-reads the subject from the
//! database, writes the file, and only then marks the row applied.
//!
//! - A crash between the file write and the mark replays the row; appends skip
//!   keys already present so replays are harmless
//! - A failing row stops the drain so later rows never overtake it
//! - [`Mirror::rebuild`] regenerates both files from the database
use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    database::{Store, opt_date_column, opt_time_column, stamp, time_column},
    error::{LedgerError, Result},
};

pub const STUDENTS_CSV: &str = "students.csv";
pub const COMPLAINTS_CSV: &str = "student_complaints.csv";

const DRAIN_BATCH: usize = 256;
const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxKind {
    StudentCreated,
    ComplaintCreated,
    ComplaintUpdated,
}

impl OutboxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxKind::StudentCreated => "student.created",
            OutboxKind::ComplaintCreated => "complaint.created",
            OutboxKind::ComplaintUpdated => "complaint.updated",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "student.created" => Some(OutboxKind::StudentCreated),
            "complaint.created" => Some(OutboxKind::ComplaintCreated),
            "complaint.updated" => Some(OutboxKind::ComplaintUpdated),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutboxEntry {
    pub id: i64,
    pub kind: Option<OutboxKind>,
    pub subject_id: i64,
}

pub(crate) fn enqueue(conn: &Connection, kind: OutboxKind, subject_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO mirror_outbox (kind, subject_id, created_at) VALUES (?1, ?2, ?3)",
        params![kind.as_str(), subject_id, stamp(&Utc::now())],
    )?;
    Ok(())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRow {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub course_id: String,
    pub course_name: String,
    pub department_id: String,
    pub department_name: String,
    pub year: String,
    pub semester: String,
    pub roll_number: String,
    pub admission_year: String,
    pub address: String,
    pub parent_name: String,
    pub parent_phone: String,
    pub hostel_room: String,
    pub blood_group: String,
    pub date_of_birth: String,
    pub gender: String,
    pub category: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRow {
    pub complaint_id: String,
    pub student_id: String,
    pub student_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub department: String,
    pub status: String,
    pub priority: String,
    pub urgency_level: String,
    pub created_at: String,
    pub updated_at: String,
    pub resolved_at: String,
    pub admin_comments: String,
}

pub fn csv_time(at: &DateTime<Utc>) -> String {
    at.format(CSV_TIME_FORMAT).to_string()
}

fn text<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn student_row(row: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        student_id: text(row.get::<_, Option<String>>("student_id")?),
        name: row.get("name")?,
        email: row.get("email")?,
        phone: text(row.get::<_, Option<String>>("phone")?),
        course_id: text(row.get::<_, Option<i64>>("course_id")?),
        course_name: text(row.get::<_, Option<String>>("course_name")?),
        department_id: text(row.get::<_, Option<i64>>("department_id")?),
        department_name: text(row.get::<_, Option<String>>("department_name")?),
        year: text(row.get::<_, Option<i64>>("year")?),
        semester: text(row.get::<_, Option<i64>>("semester")?),
        roll_number: text(row.get::<_, Option<String>>("roll_number")?),
        admission_year: text(row.get::<_, Option<i64>>("admission_year")?),
        address: text(row.get::<_, Option<String>>("address")?),
        parent_name: text(row.get::<_, Option<String>>("parent_name")?),
        parent_phone: text(row.get::<_, Option<String>>("parent_phone")?),
        hostel_room: text(row.get::<_, Option<String>>("hostel_room")?),
        blood_group: text(row.get::<_, Option<String>>("blood_group")?),
        date_of_birth: text(opt_date_column(row, "date_of_birth")?),
        gender: text(row.get::<_, Option<String>>("gender")?),
        category: text(row.get::<_, Option<String>>("category")?),
    })
}

const COMPLAINT_ROW_SELECT: &str = "SELECT c.complaint_id, s.student_id, s.name AS student_name,
            c.title, c.description, cat.name AS category, d.name AS department,
            c.status, c.priority, c.urgency_level, c.created_at, c.updated_at, c.resolved_at
     FROM complaints c
     LEFT JOIN users s ON s.id = c.student_id
     LEFT JOIN complaint_categories cat ON cat.id = c.category_id
     LEFT JOIN departments d ON d.id = c.department_id";

fn complaint_row(row: &Row<'_>) -> rusqlite::Result<ComplaintRow> {
    Ok(ComplaintRow {
        complaint_id: row.get("complaint_id")?,
        student_id: text(row.get::<_, Option<String>>("student_id")?),
        student_name: text(row.get::<_, Option<String>>("student_name")?),
        title: row.get("title")?,
        description: row.get("description")?,
        category: text(row.get::<_, Option<String>>("category")?),
        department: text(row.get::<_, Option<String>>("department")?),
        status: row.get("status")?,
        priority: row.get("priority")?,
        urgency_level: row.get::<_, i64>("urgency_level")?.to_string(),
        created_at: csv_time(&time_column(row, "created_at")?),
        updated_at: csv_time(&time_column(row, "updated_at")?),
        resolved_at: text(opt_time_column(row, "resolved_at")?.as_ref().map(csv_time)),
        admin_comments: String::new(),
    })
}

impl Store {
    pub async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, subject_id FROM mirror_outbox
                 WHERE applied_at IS NULL ORDER BY id LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], |row| {
                Ok(OutboxEntry {
                    id: row.get(0)?,
                    kind: OutboxKind::parse(&row.get::<_, String>(1)?),
                    subject_id: row.get(2)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    pub async fn pending_outbox_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM mirror_outbox WHERE applied_at IS NULL",
                [],
                |row| row.get(0),
            )?)
        })
        .await
    }

    pub async fn mark_applied(&self, outbox_id: i64) -> Result<()> {
        self.write(move |tx| {
            tx.execute(
                "UPDATE mirror_outbox SET applied_at = ?1 WHERE id = ?2",
                params![stamp(&Utc::now()), outbox_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn student_row(&self, user_id: i64) -> Result<Option<StudentRow>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row("SELECT * FROM users WHERE id = ?1", [user_id], student_row)
                .optional()?)
        })
        .await
    }

    pub async fn complaint_row(&self, id: i64) -> Result<Option<ComplaintRow>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("{COMPLAINT_ROW_SELECT} WHERE c.id = ?1"),
                    [id],
                    complaint_row,
                )
                .optional()?)
        })
        .await
    }

    /// Every mirrored row plus the outbox high-water mark they reflect.
    async fn mirror_snapshot(&self) -> Result<(i64, Vec<StudentRow>, Vec<ComplaintRow>)> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let high_water: i64 =
                tx.query_row("SELECT COALESCE(MAX(id), 0) FROM mirror_outbox", [], |row| {
                    row.get(0)
                })?;

            let students = {
                let mut stmt = tx.prepare(
                    "SELECT * FROM users WHERE role = 'student' AND student_id IS NOT NULL ORDER BY id",
                )?;
                let rows = stmt.query_map([], student_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            let complaints = {
                let mut stmt = tx.prepare(&format!("{COMPLAINT_ROW_SELECT} ORDER BY c.id"))?;
                let rows = stmt.query_map([], complaint_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.commit()?;

            Ok((high_water, students, complaints))
        })
        .await
    }

    async fn mark_applied_through(&self, high_water: i64) -> Result<()> {
        self.write(move |tx| {
            tx.execute(
                "UPDATE mirror_outbox SET applied_at = ?1 WHERE id <= ?2 AND applied_at IS NULL",
                params![stamp(&Utc::now()), high_water],
            )?;
            Ok(())
        })
        .await
    }
}

pub struct Mirror {
    dir: PathBuf,
    lock: Mutex<()>,
    wake: Notify,
}

impl Mirror {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            lock: Mutex::new(()),
            wake: Notify::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Asks the worker to drain soon.
    pub fn notify(&self) {
        self.wake.notify_one();
    }

    /// Applies pending outbox rows to the CSV files, returning how many were applied.
    pub async fn drain(&self, store: &Store) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut applied = 0;

        loop {
            let entries = store.pending_outbox(DRAIN_BATCH).await?;
            if entries.is_empty() {
                return Ok(applied);
            }

            for entry in entries {
                self.apply(store, &entry).await?;
                store.mark_applied(entry.id).await?;
                applied += 1;
            }
        }
    }

    async fn apply(&self, store: &Store, entry: &OutboxEntry) -> Result<()> {
        let Some(kind) = entry.kind else {
            warn!("Skipping outbox entry {} of unknown kind", entry.id);
            return Ok(());
        };

        match kind {
            OutboxKind::StudentCreated => {
                let Some(row) = store.student_row(entry.subject_id).await? else {
                    return Ok(());
                };
                let path = self.dir.join(STUDENTS_CSV);
                blocking(move || {
                    append_unique(&path, &row, |r: &StudentRow| r.student_id == row.student_id)
                })
                .await
            }
            OutboxKind::ComplaintCreated => {
                let Some(row) = store.complaint_row(entry.subject_id).await? else {
                    return Ok(());
                };
                let path = self.dir.join(COMPLAINTS_CSV);
                blocking(move || {
                    append_unique(&path, &row, |r: &ComplaintRow| {
                        r.complaint_id == row.complaint_id
                    })
                })
                .await
            }
            OutboxKind::ComplaintUpdated => {
                let Some(row) = store.complaint_row(entry.subject_id).await? else {
                    return Ok(());
                };
                let path = self.dir.join(COMPLAINTS_CSV);
                blocking(move || update_complaint(&path, &row)).await
            }
        }
    }

    /// Rewrites both files from the database and marks the outbox applied.
    pub async fn rebuild(&self, store: &Store) -> Result<()> {
        let _guard = self.lock.lock().await;
        let (high_water, students, complaints) = store.mirror_snapshot().await?;
        let (student_count, complaint_count) = (students.len(), complaints.len());

        let dir = self.dir.clone();
        blocking(move || {
            write_all(&dir.join(STUDENTS_CSV), &students)?;
            write_all(&dir.join(COMPLAINTS_CSV), &complaints)
        })
        .await?;
        store.mark_applied_through(high_water).await?;

        info!("Rebuilt CSV mirror: {student_count} students, {complaint_count} complaints");
        Ok(())
    }

    pub async fn read_all_complaints(&self) -> Result<Vec<ComplaintRow>> {
        let path = self.dir.join(COMPLAINTS_CSV);
        blocking(move || read_rows(&path)).await
    }

    pub async fn read_student_complaints(&self, student_id: &str) -> Result<Vec<ComplaintRow>> {
        let mut rows = self.read_all_complaints().await?;
        rows.retain(|row| row.student_id == student_id);

        Ok(rows)
    }
}

/// Drains on every notify and at least once per `interval`.
pub fn spawn_mirror_worker(mirror: Arc<Mirror>, store: Store, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = mirror.wake.notified() => {},
            }

            match mirror.drain(&store).await {
                Ok(0) => {}
                Ok(applied) => info!("Mirrored {applied} change(s) to CSV"),
                Err(e) => warn!("CSV mirror drain failed, will retry: {e}"),
            }
        }
    })
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

fn is_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if is_empty(path) {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;

    Ok(rows)
}

/// Appends `row` unless a row matching `same` is already present.
pub fn append_unique<T, F>(path: &Path, row: &T, same: F) -> Result<()>
where
    T: Serialize + DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let fresh = is_empty(path);
    if !fresh && read_rows::<T>(path)?.iter().any(same) {
        return Ok(());
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(fresh)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;

    Ok(())
}

/// Copies the lifecycle columns of `current` onto the matching row, appending
/// it when the file never saw the complaint.
pub fn update_complaint(path: &Path, current: &ComplaintRow) -> Result<()> {
    let mut rows: Vec<ComplaintRow> = read_rows(path)?;

    match rows
        .iter_mut()
        .find(|row| row.complaint_id == current.complaint_id)
    {
        Some(row) => {
            row.status = current.status.clone();
            row.priority = current.priority.clone();
            row.updated_at = current.updated_at.clone();
            row.resolved_at = current.resolved_at.clone();
        }
        None => rows.push(current.clone()),
    }

    write_all(path, &rows)
}

/// Replaces the file through a sibling temp file so readers never see half a write.
pub fn write_all<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_writer(File::create(&tmp)?);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path).map_err(LedgerError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complaint(id: &str, student: &str) -> ComplaintRow {
        ComplaintRow {
            complaint_id: id.to_string(),
            student_id: student.to_string(),
            student_name: "Asha".to_string(),
            title: "Broken projector".to_string(),
            description: "Room 204, flickers, \"unusable\"".to_string(),
            category: "Infrastructure".to_string(),
            department: "Civil Engineering".to_string(),
            status: "Pending".to_string(),
            priority: "Medium".to_string(),
            urgency_level: "2".to_string(),
            created_at: "2026-10-01 09:00:00".to_string(),
            updated_at: "2026-10-01 09:00:00".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_append_writes_header_once_and_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMPLAINTS_CSV);
        let same = |id: &'static str| move |r: &ComplaintRow| r.complaint_id == id;

        append_unique(&path, &complaint("CMP2026100001", "24BCA001"), same("CMP2026100001")).unwrap();
        append_unique(&path, &complaint("CMP2026100002", "24BCA002"), same("CMP2026100002")).unwrap();
        append_unique(&path, &complaint("CMP2026100001", "24BCA001"), same("CMP2026100001")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("complaint_id,").count(), 1);

        let rows: Vec<ComplaintRow> = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "Room 204, flickers, \"unusable\"");
    }

    #[test]
    fn test_update_replaces_lifecycle_columns_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMPLAINTS_CSV);
        let mut original = complaint("CMP2026100001", "24BCA001");
        original.admin_comments = "called the vendor".to_string();
        write_all(&path, &[original]).unwrap();

        let mut current = complaint("CMP2026100001", "24BCA001");
        current.title = "changed in db".to_string();
        current.status = "Resolved".to_string();
        current.priority = "High".to_string();
        current.updated_at = "2026-10-02 10:00:00".to_string();
        current.resolved_at = "2026-10-02 10:00:00".to_string();
        update_complaint(&path, &current).unwrap();

        let rows: Vec<ComplaintRow> = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "Resolved");
        assert_eq!(rows[0].priority, "High");
        assert_eq!(rows[0].resolved_at, "2026-10-02 10:00:00");
        assert_eq!(rows[0].title, "Broken projector");
        assert_eq!(rows[0].admin_comments, "called the vendor");
    }

    #[test]
    fn test_update_appends_unknown_complaint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMPLAINTS_CSV);

        update_complaint(&path, &complaint("CMP2026100009", "24BCA009")).unwrap();

        let rows: Vec<ComplaintRow> = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].complaint_id, "CMP2026100009");
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<StudentRow> = read_rows(&dir.path().join(STUDENTS_CSV)).unwrap();

        assert!(rows.is_empty());
    }

    #[test]
    fn test_outbox_kinds_round_trip_names() {
        for kind in [
            OutboxKind::StudentCreated,
            OutboxKind::ComplaintCreated,
            OutboxKind::ComplaintUpdated,
        ] {
            assert_eq!(OutboxKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OutboxKind::parse("complaint.deleted"), None);
    }
}
