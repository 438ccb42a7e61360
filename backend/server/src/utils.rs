use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use ledger::{
    database::parse_date,
    records::{NewComplaint, StudentProfile},
};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

const MIN_PHONE_DIGITS: usize = 10;

/// Registration form. Numbers arrive as JSON numbers or numeric strings
/// depending on the client, so they are kept loose until validated.
#[derive(Debug, Default, Deserialize)]
pub struct Registration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub course_id: Option<Value>,
    pub department_id: Option<Value>,
    pub year: Option<Value>,
    pub semester: Option<Value>,
    pub roll_number: Option<String>,
    pub admission_year: Option<Value>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub hostel_room: Option<String>,
    pub blood_group: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComplaintForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Value>,
    pub department_id: Option<Value>,
    pub user_id: Option<Value>,
    pub urgency_level: Option<Value>,
}

/// `course_id` -> `Course Id`
pub fn field_title(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn required(field: &str) -> AppError {
    AppError::bad_request(format!("{} is required", field_title(field)))
}

fn text(field: &str, value: Option<&str>) -> Result<String, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| required(field))
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Integer from a JSON number or a numeric string; blank, zero and null are absent.
pub fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| *n != 0)
}

fn required_integer(field: &str, value: Option<&Value>) -> Result<i64, AppError> {
    match value {
        None | Some(Value::Null) => Err(required(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(required(field)),
        Some(v) => integer(Some(v))
            .ok_or_else(|| AppError::bad_request(format!("Invalid {}", field_title(field)))),
    }
}

pub fn valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn valid_phone(phone: &str) -> bool {
    let digits: String = phone.chars().filter(|c| *c != ' ' && *c != '-').collect();

    digits.len() >= MIN_PHONE_DIGITS && digits.chars().all(|c| c.is_ascii_digit())
}

impl Registration {
    /// Checks the form in field order and produces the profile to register.
    pub fn validate(self) -> Result<StudentProfile, AppError> {
        let name = text("name", self.name.as_deref())?;
        let email = text("email", self.email.as_deref())?;
        let phone = text("phone", self.phone.as_deref())?;
        let course_id = required_integer("course_id", self.course_id.as_ref())?;
        let year = required_integer("year", self.year.as_ref())?;
        let semester = required_integer("semester", self.semester.as_ref())?;
        let roll_number = text("roll_number", self.roll_number.as_deref())?;
        let admission_year = required_integer("admission_year", self.admission_year.as_ref())?;

        if !valid_email(&email) {
            return Err(AppError::bad_request("Invalid email format"));
        }
        if !valid_phone(&phone) {
            return Err(AppError::bad_request("Invalid phone number"));
        }

        let admission_year = i32::try_from(admission_year)
            .map_err(|_| AppError::bad_request("Invalid admission year"))?;
        let date_of_birth: Option<NaiveDate> =
            self.date_of_birth.as_deref().and_then(parse_date);

        Ok(StudentProfile {
            name,
            email,
            phone: Some(phone),
            course_id: Some(course_id),
            department_id: integer(self.department_id.as_ref()),
            year: Some(year),
            semester: Some(semester),
            roll_number: Some(roll_number),
            admission_year: Some(admission_year),
            address: optional_text(self.address),
            parent_name: optional_text(self.parent_name),
            parent_phone: optional_text(self.parent_phone),
            hostel_room: optional_text(self.hostel_room),
            blood_group: optional_text(self.blood_group),
            date_of_birth,
            gender: optional_text(self.gender),
            category: optional_text(self.category),
        })
    }
}

impl ComplaintForm {
    pub fn validate(self) -> Result<NewComplaint, AppError> {
        let (Some(title), Some(description)) = (
            optional_text(self.title),
            optional_text(self.description),
        ) else {
            return Err(AppError::bad_request("Title and description are required"));
        };

        let (Some(category_id), Some(department_id)) = (
            integer(self.category_id.as_ref()),
            integer(self.department_id.as_ref()),
        ) else {
            return Err(AppError::bad_request("Category and department are required"));
        };

        let user_id = integer(self.user_id.as_ref())
            .ok_or_else(|| AppError::bad_request("User ID required"))?;

        let urgency_level = match self.urgency_level.as_ref() {
            None | Some(Value::Null) => 1,
            value => integer(value)
                .filter(|u| (1..=5).contains(u))
                .ok_or_else(|| AppError::bad_request("Urgency level must be between 1 and 5"))?,
        };

        Ok(NewComplaint {
            title,
            description,
            category_id,
            department_id,
            user_id,
            urgency_level,
        })
    }
}

/// `complaints_export_20261019_201503.csv`
pub fn export_filename() -> String {
    format!("complaints_export_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn form() -> Registration {
        serde_json::from_value(json!({
            "name": "Asha Rao",
            "email": "asha@college.edu",
            "phone": "98765-43210",
            "course_id": "1",
            "year": 1,
            "semester": 2,
            "roll_number": "CSE001",
            "admission_year": 2024,
            "date_of_birth": "2006-05-17",
        }))
        .unwrap()
    }

    fn message(err: AppError) -> String {
        err.to_string()
    }

    #[test]
    fn test_field_titles() {
        assert_eq!(field_title("name"), "Name");
        assert_eq!(field_title("roll_number"), "Roll Number");
        assert_eq!(field_title("course_id"), "Course Id");
    }

    #[test]
    fn test_registration_accepts_loose_numbers() {
        let profile = form().validate().unwrap();

        assert_eq!(profile.course_id, Some(1));
        assert_eq!(profile.semester, Some(2));
        assert_eq!(profile.admission_year, Some(2024));
        assert_eq!(profile.date_of_birth, NaiveDate::from_ymd_opt(2006, 5, 17));
        assert_eq!(profile.address, None);
    }

    #[test]
    fn test_registration_reports_first_missing_field() {
        let err = Registration {
            roll_number: Some("  ".into()),
            ..form()
        }
        .validate()
        .unwrap_err();
        assert_eq!(message(err), "Roll Number is required");

        let err = Registration {
            course_id: Some(json!("")),
            ..form()
        }
        .validate()
        .unwrap_err();
        assert_eq!(message(err), "Course Id is required");

        let err = Registration {
            year: Some(json!("abc")),
            ..form()
        }
        .validate()
        .unwrap_err();
        assert_eq!(message(err), "Invalid Year");
    }

    #[test]
    fn test_registration_checks_formats() {
        let err = Registration {
            email: Some("asha@college".into()),
            ..form()
        }
        .validate()
        .unwrap_err();
        assert_eq!(message(err), "Invalid email format");

        let err = Registration {
            phone: Some("98 76-5".into()),
            ..form()
        }
        .validate()
        .unwrap_err();
        assert_eq!(message(err), "Invalid phone number");
    }

    #[test]
    fn test_phone_digits() {
        assert!(valid_phone("9876543210"));
        assert!(valid_phone("98765 43210"));
        assert!(valid_phone("91-98765-43210"));
        assert!(!valid_phone("+91 98765-43210"));
        assert!(!valid_phone("call-me-maybe"));
        assert!(!valid_phone("98765abcde"));
        assert!(!valid_phone("12345"));
    }

    #[test]
    fn test_complaint_form() {
        let form: ComplaintForm = serde_json::from_value(json!({
            "title": "Projector",
            "description": "Flickers",
            "category_id": 2,
            "department_id": "1",
            "user_id": 7,
        }))
        .unwrap();
        let new = form.validate().unwrap();
        assert_eq!(new.urgency_level, 1);
        assert_eq!(new.department_id, 1);

        let form: ComplaintForm = serde_json::from_value(json!({
            "title": "Projector",
            "description": "Flickers",
            "category_id": 2,
            "department_id": 1,
            "user_id": 7,
            "urgency_level": 9,
        }))
        .unwrap();
        assert!(form.validate().is_err());

        let err = ComplaintForm {
            title: Some("Projector".into()),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(message(err), "Title and description are required");
    }
}
