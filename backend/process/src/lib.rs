//! # Seeding
//!
//! Fills the complaint desk's reference data and student roster.
//!
//! ## Sources
//!
//! CSV files in the data directory, read in foreign-key order:
//! 1. `departments.csv`: skipped when the code exists
//! 2. `courses.csv`: skipped when the code exists
//! 3. `complaint_categories.csv`: skipped when the name exists
//! 4. `students.csv`: skipped when the student ID or email exists
//!
//! A missing file is reported and skipped. A row that fails to parse or
//! insert is reported and skipped; the rest of the file still loads.
//!
//! When the departments table is still empty afterwards, the built-in
//! college departments, courses and categories in [`defaults`] are inserted.
//!
//! ## Notes
//! - Students imported here already live in `students.csv`, so nothing is
//!   queued for the CSV mirror. Registering through the API is what appends.
//! - `students.csv` is both a seed source and the mirror's output file, so
//!   re-running the loader against the mirror directory is harmless.
use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use ledger::{
    Store,
    records::{ImportedStudent, NewCategory, NewCourse, NewDepartment},
};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

pub mod defaults;
pub mod models;
pub mod utils;

use models::{CATEGORIES_FILE, COURSES_FILE, DEPARTMENTS_FILE, STUDENTS_FILE, StudentRecord};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub inserted: usize,
    pub existing: usize,
    pub failed: usize,
}

impl Tally {
    fn record(&mut self, outcome: ledger::Result<bool>, what: &str) {
        match outcome {
            Ok(true) => self.inserted += 1,
            Ok(false) => self.existing += 1,
            Err(e) => {
                warn!("Failed to insert {what}: {e}");
                self.failed += 1;
            }
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} existing, {} failed",
            self.inserted, self.existing, self.failed
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub departments: Tally,
    pub courses: Tally,
    pub categories: Tally,
    pub students: Tally,
    pub defaults_applied: bool,
}

/// Loads every CSV source, then the built-in defaults if nothing provided departments.
pub async fn seed(store: &Store, data_dir: &Path) -> Result<SeedReport> {
    let mut report = load_all(store, data_dir).await?;
    report.defaults_applied = seed_defaults(store).await?;

    Ok(report)
}

pub async fn load_all(store: &Store, data_dir: &Path) -> Result<SeedReport> {
    info!("Loading seed data from {}", data_dir.display());

    let pb = ProgressBar::new(4);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let mut report = SeedReport::default();

    pb.set_message(DEPARTMENTS_FILE);
    for row in read_file::<NewDepartment>(&data_dir.join(DEPARTMENTS_FILE)) {
        let outcome = store.insert_department_if_absent(row).await;
        report.departments.record(outcome, "department");
    }
    pb.inc(1);

    pb.set_message(COURSES_FILE);
    for row in read_file::<NewCourse>(&data_dir.join(COURSES_FILE)) {
        let outcome = store.insert_course_if_absent(row).await;
        report.courses.record(outcome, "course");
    }
    pb.inc(1);

    pb.set_message(CATEGORIES_FILE);
    for row in read_file::<NewCategory>(&data_dir.join(CATEGORIES_FILE)) {
        let outcome = store.insert_category_if_absent(row).await;
        report.categories.record(outcome, "category");
    }
    pb.inc(1);

    pb.set_message(STUDENTS_FILE);
    for record in read_file::<StudentRecord>(&data_dir.join(STUDENTS_FILE)) {
        let outcome = store
            .insert_student_if_absent(ImportedStudent::from(record))
            .await;
        report.students.record(outcome, "student");
    }
    pb.inc(1);

    pb.finish_with_message("Done");

    info!("Departments: {}", report.departments);
    info!("Courses: {}", report.courses);
    info!("Categories: {}", report.categories);
    info!("Students: {}", report.students);

    Ok(report)
}

/// Inserts the built-in reference data when no departments exist yet.
pub async fn seed_defaults(store: &Store) -> Result<bool> {
    if store.department_count().await? > 0 {
        return Ok(false);
    }

    info!("No departments found, inserting built-in reference data");
    for department in defaults::departments() {
        store.insert_department_if_absent(department).await?;
    }
    for course in defaults::courses() {
        store.insert_course_if_absent(course).await?;
    }
    for category in defaults::categories() {
        store.insert_category_if_absent(category).await?;
    }

    Ok(true)
}

/// Parses every row of `path`, reporting and dropping the ones that fail.
/// A missing or unreadable file yields no rows.
fn read_file<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("Skipping {}: {e}", path.display());
            return Vec::new();
        }
    };

    reader
        .deserialize()
        .enumerate()
        .filter_map(|(line, row)| {
            row.map_err(|e| warn!("Skipping {} row {}: {e}", path.display(), line + 2))
                .ok()
        })
        .collect()
}

/// Where the loader looks when nothing else is configured.
pub fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
