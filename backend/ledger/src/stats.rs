//! Dashboard aggregates.
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::{
    database::{Store, parse_stamp, stamp},
    error::Result,
    records::Status,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total: i64,
    pub pending: i64,
    pub resolved: i64,
    pub in_progress: i64,
    pub rejected: i64,
    pub today: i64,
    pub this_week: i64,
    pub this_month: i64,
    pub avg_resolution_hours: f64,
    pub departments: BTreeMap<String, i64>,
    pub categories: BTreeMap<String, i64>,
    pub priorities: BTreeMap<String, i64>,
    pub resolution_rate: f64,
}

/// Rounds half away from zero to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn resolution_rate(resolved: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(resolved as f64 / total as f64 * 100.0)
}

/// Mean of the given durations in hours, 0 when there are none.
pub fn average_hours(durations: &[Duration]) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    let seconds: i64 = durations.iter().map(Duration::num_seconds).sum();

    round1(seconds as f64 / 3600.0 / durations.len() as f64)
}

fn count_since(conn: &Connection, since: DateTime<Utc>) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM complaints WHERE created_at >= ?1",
        [stamp(&since)],
        |row| row.get(0),
    )?)
}

fn grouped(conn: &Connection, sql: &str) -> Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn collect(conn: &Connection, now: DateTime<Utc>) -> Result<Stats> {
    let by_status = grouped(
        conn,
        "SELECT status, COUNT(*) FROM complaints GROUP BY status",
    )?;
    let status_count = |status: Status| by_status.get(status.as_str()).copied().unwrap_or(0);
    let total = by_status.values().sum();
    let resolved = status_count(Status::Resolved);

    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();

    let mut stmt = conn.prepare(
        "SELECT created_at, resolved_at FROM complaints
         WHERE status = ?1 AND resolved_at IS NOT NULL",
    )?;
    let durations = stmt
        .query_map(params![Status::Resolved], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .filter_map(|(created, resolved)| Some(parse_stamp(&resolved)? - parse_stamp(&created)?))
        .collect::<Vec<_>>();

    Ok(Stats {
        total,
        pending: status_count(Status::Pending),
        resolved,
        in_progress: status_count(Status::InProgress),
        rejected: status_count(Status::Rejected),
        today: count_since(conn, midnight)?,
        this_week: count_since(conn, midnight - Duration::days(7))?,
        this_month: count_since(conn, midnight - Duration::days(30))?,
        avg_resolution_hours: average_hours(&durations),
        departments: grouped(
            conn,
            "SELECT d.name, COUNT(c.id) FROM complaints c
             JOIN departments d ON d.id = c.department_id GROUP BY d.name",
        )?,
        categories: grouped(
            conn,
            "SELECT cat.name, COUNT(c.id) FROM complaints c
             JOIN complaint_categories cat ON cat.id = c.category_id GROUP BY cat.name",
        )?,
        priorities: grouped(
            conn,
            "SELECT priority, COUNT(*) FROM complaints GROUP BY priority",
        )?,
        resolution_rate: resolution_rate(resolved, total),
    })
}

impl Store {
    pub async fn stats(&self) -> Result<Stats> {
        self.with_conn(|conn| collect(conn, Utc::now())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_keeps_one_decimal() {
        assert_eq!(round1(33.333), 33.3);
        assert_eq!(round1(66.66), 66.7);
        assert_eq!(round1(0.0), 0.0);
    }

    #[test]
    fn test_resolution_rate_handles_empty_desk() {
        assert_eq!(resolution_rate(0, 0), 0.0);
        assert_eq!(resolution_rate(1, 3), 33.3);
        assert_eq!(resolution_rate(2, 2), 100.0);
    }

    #[test]
    fn test_average_hours_over_durations() {
        assert_eq!(average_hours(&[]), 0.0);
        assert_eq!(
            average_hours(&[Duration::hours(2), Duration::minutes(90)]),
            1.8
        );
    }
}
