//! # Identifiers
//!
//! Human-readable IDs handed to students and printed on paperwork.
//!
//! - Complaint: `CMP{year}{month:02}{sequence:04}`, sequence restarts every month
//! - Student: `{yy}{COURSE}{sequence:03}`, sequence per course and admission year
//! - Student without a known course: `STU{year}{sequence:04}`
//!
//! Sequences come from counting existing rows, so callers must count and
//! insert inside the same write transaction.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

pub const COMPLAINT_PREFIX: &str = "CMP";
pub const FALLBACK_STUDENT_PREFIX: &str = "STU";

pub fn complaint_id(year: i32, month: u32, sequence: u32) -> String {
    format!("{COMPLAINT_PREFIX}{year}{month:02}{sequence:04}")
}

pub fn student_id(admission_year: i32, course_code: &str, sequence: u32) -> String {
    let year = admission_year.rem_euclid(100);

    format!("{year:02}{}{sequence:03}", course_token(course_code))
}

pub fn fallback_student_id(year: i32, sequence: u32) -> String {
    format!("{FALLBACK_STUDENT_PREFIX}{year}{sequence:04}")
}

/// `B.Tech CSE` -> `BTECHCSE`
pub fn course_token(course_code: &str) -> String {
    course_code
        .chars()
        .filter(|c| *c != ' ' && *c != '.')
        .collect::<String>()
        .to_uppercase()
}

/// Half-open `[first of month, first of next month)` range containing `at`.
pub fn month_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let (year, month) = (at.year(), at.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    (
        start_of(year, month),
        start_of(next_year, next_month),
    )
}

fn start_of(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complaint_ids_pad_month_and_sequence() {
        assert_eq!(complaint_id(2026, 3, 1), "CMP2026030001");
        assert_eq!(complaint_id(2026, 11, 42), "CMP2026110042");
    }

    #[test]
    fn test_sequences_past_padding_still_render() {
        assert_eq!(complaint_id(2026, 1, 12345), "CMP20260112345");
        assert_eq!(student_id(2024, "BCA", 1000), "24BCA1000");
    }

    #[test]
    fn test_student_ids_use_course_token() {
        assert_eq!(student_id(2024, "B.Tech CSE", 1), "24BTECHCSE001");
        assert_eq!(student_id(2023, "m.tech cse", 17), "23MTECHCSE017");
        assert_eq!(student_id(2005, "BCA", 3), "05BCA003");
    }

    #[test]
    fn test_fallback_ids() {
        assert_eq!(fallback_student_id(2026, 7), "STU20260007");
    }

    #[test]
    fn test_month_bounds_roll_over_december() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let (start, end) = month_bounds(at);

        assert_eq!(start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_month_bounds_contain_instant() {
        let at = Utc.with_ymd_and_hms(2026, 2, 14, 8, 30, 0).unwrap();
        let (start, end) = month_bounds(at);

        assert!(start <= at && at < end);
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }
}
