//! # Records
//!
//! Rows of the complaint desk as the rest of the system sees them.
//!
//! Enum columns are stored as the same strings the JSON API speaks, so a
//! spreadsheet opened next to the database reads identically.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(input: &str) -> Option<Self> {
                match input {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                $name::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} {text:?}", stringify!($name)).into())
                })
            }
        }
    };
}

text_enum!(Status {
    Pending => "Pending",
    InProgress => "In Progress",
    Resolved => "Resolved",
    Rejected => "Rejected",
});

text_enum!(Priority {
    Low => "Low",
    Medium => "Medium",
    High => "High",
    Critical => "Critical",
});

text_enum!(Role {
    Student => "student",
    Admin => "admin",
});

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub head_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewDepartment {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub head_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub duration_years: i64,
    pub department_id: i64,
    pub degree_type: String,
    pub department_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewCourse {
    pub name: String,
    pub code: String,
    pub duration_years: i64,
    pub department_id: i64,
    pub degree_type: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub department_id: i64,
    pub department_name: Option<String>,
    pub priority_level: Priority,
    pub typical_resolution_days: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub department_id: i64,
    pub priority_level: Priority,
    pub typical_resolution_days: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: i64,
    pub unique_id: String,
    pub student_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub course_id: Option<i64>,
    pub course_name: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub year: Option<i64>,
    pub semester: Option<i64>,
    pub roll_number: Option<String>,
    pub admission_year: Option<i32>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub hostel_room: Option<String>,
    pub blood_group: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub category: Option<String>,
    pub designation: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub password_hash: Option<String>,
}

/// Everything a student states about themselves at registration.
#[derive(Clone, Debug, Default)]
pub struct StudentProfile {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub course_id: Option<i64>,
    pub department_id: Option<i64>,
    pub year: Option<i64>,
    pub semester: Option<i64>,
    pub roll_number: Option<String>,
    pub admission_year: Option<i32>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub hostel_room: Option<String>,
    pub blood_group: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub category: Option<String>,
}

/// A student row imported from an existing roster, ID already assigned.
#[derive(Clone, Debug, Default)]
pub struct ImportedStudent {
    pub student_id: String,
    pub course_name: Option<String>,
    pub department_name: Option<String>,
    pub profile: StudentProfile,
}

#[derive(Clone, Debug)]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub designation: Option<String>,
    pub department_id: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Complaint {
    pub id: i64,
    pub complaint_id: String,
    pub title: String,
    pub description: String,
    pub category_id: i64,
    pub category_name: Option<String>,
    pub department_id: i64,
    pub department_name: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub student_id: i64,
    pub student_name: Option<String>,
    pub student_unique_id: Option<String>,
    pub urgency_level: i64,
    pub expected_resolution_date: Option<DateTime<Utc>>,
    pub actual_resolution_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<i64>,
    pub assigned_admin_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub category_id: i64,
    pub department_id: i64,
    pub user_id: i64,
    pub urgency_level: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Comment {
    pub id: i64,
    pub complaint_id: i64,
    pub admin_id: i64,
    pub admin_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct SearchFilter {
    pub query: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub department_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkAction {
    Status(Status),
    Priority(Priority),
    Assign(i64),
}

/// Flattened complaint for spreadsheet export, keyed by column title.
#[derive(Clone, Debug, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Complaint ID")]
    pub complaint_id: String,
    #[serde(rename = "Student ID")]
    pub student_id: Option<String>,
    #[serde(rename = "Student Name")]
    pub student_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Course")]
    pub course: Option<String>,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "Priority")]
    pub priority: Priority,
    #[serde(rename = "Urgency Level")]
    pub urgency_level: i64,
    #[serde(rename = "Created At")]
    pub created_at: String,
    #[serde(rename = "Updated At")]
    pub updated_at: String,
    #[serde(rename = "Resolved At")]
    pub resolved_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_match_wire_format() {
        assert_eq!(Status::InProgress.as_str(), "In Progress");
        assert_eq!(Status::parse("In Progress"), Some(Status::InProgress));
        assert_eq!(Status::parse("in progress"), None);
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"In Progress\""
        );
    }

    #[test]
    fn test_every_variant_parses_back() {
        for status in Status::ALL {
            assert_eq!(Status::parse(status.as_str()), Some(*status));
        }
        for priority in Priority::ALL {
            assert_eq!(Priority::parse(&priority.to_string()), Some(*priority));
        }
    }

    #[test]
    fn test_defaults_follow_new_complaint_rules() {
        assert_eq!(Status::default(), Status::Pending);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: 1,
            unique_id: "u".into(),
            student_id: None,
            name: "Admin".into(),
            email: "admin@college.edu".into(),
            phone: None,
            role: Role::Admin,
            course_id: None,
            course_name: None,
            department_id: None,
            department_name: None,
            year: None,
            semester: None,
            roll_number: None,
            admission_year: None,
            address: None,
            parent_name: None,
            parent_phone: None,
            hostel_room: None,
            blood_group: None,
            date_of_birth: None,
            gender: None,
            category: None,
            designation: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
            password_hash: Some("secret".into()),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "admin");
    }
}
