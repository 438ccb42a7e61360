use chrono::NaiveDate;
use ledger::records::{ImportedStudent, StudentProfile};
use serde::Deserialize;

use crate::utils::{clean, clean_opt};

pub const DEPARTMENTS_FILE: &str = "departments.csv";
pub const COURSES_FILE: &str = "courses.csv";
pub const CATEGORIES_FILE: &str = "complaint_categories.csv";
pub const STUDENTS_FILE: &str = "students.csv";

/// One line of `students.csv`, the roster the desk started from.
///
/// Numbers and dates that fail to parse are read as missing.
#[derive(Debug, Deserialize)]
pub struct StudentRecord {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub course_id: Option<i64>,
    pub course_name: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub year: Option<i64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub semester: Option<i64>,
    pub roll_number: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub admission_year: Option<i32>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub hostel_room: Option<String>,
    pub blood_group: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub category: Option<String>,
}

impl From<StudentRecord> for ImportedStudent {
    fn from(record: StudentRecord) -> Self {
        ImportedStudent {
            student_id: clean(&record.student_id),
            course_name: clean_opt(record.course_name),
            department_name: clean_opt(record.department_name),
            profile: StudentProfile {
                name: clean(&record.name),
                email: record.email.trim().to_lowercase(),
                phone: clean_opt(record.phone),
                course_id: record.course_id,
                department_id: record.department_id,
                year: record.year,
                semester: record.semester,
                roll_number: clean_opt(record.roll_number),
                admission_year: record.admission_year,
                address: clean_opt(record.address),
                parent_name: clean_opt(record.parent_name),
                parent_phone: clean_opt(record.parent_phone),
                hostel_room: clean_opt(record.hostel_room),
                blood_group: clean_opt(record.blood_group),
                date_of_birth: record.date_of_birth,
                gender: clean_opt(record.gender),
                category: clean_opt(record.category),
            },
        }
    }
}
