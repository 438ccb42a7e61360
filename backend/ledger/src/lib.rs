//! # Complaint Ledger
//!
//! Record keeping behind the college complaint desk.
//!
//! ## Data
//!
//! SQLite is the store of record:
//! - Reference data (departments, courses, complaint categories): seeded, read through a cache
//! - Users: students registering themselves, administrators created at startup
//! - Complaints and the comments administrators leave on them
//!
//! Two CSV files under the data directory mirror students and complaints for
//! whoever keeps the desk's spreadsheet:
//! - `students.csv`
//! - `student_complaints.csv`
//!
//! ## Keeping the Spreadsheet Honest
//!
//! A write that must show up in the spreadsheet also inserts a `mirror_outbox`
//! row in the same transaction. The mirror worker replays unapplied rows into
//! the CSV files and marks them applied once the file is written.
//!
//! 1. Handler commits the change and its outbox row together.
//!
//! 2. Handler pokes the worker.
//!
//! 3. Worker reads the current database row for each outbox entry and appends
//!    or rewrites the matching CSV line.
//!
//! 4. A failure leaves the entry unapplied. The next tick retries it, in order.
//!
//! A crash between the commit and the file write loses nothing; the entry is
//! still waiting at the next start.
//!
//! ## Identifiers
//!
//! See [`ids`]. Sequences are counted inside IMMEDIATE transactions, which
//! SQLite runs one at a time, so concurrent filings never share an ID.
pub mod accounts;
pub mod catalog;
pub mod complaints;
pub mod database;
pub mod error;
pub mod ids;
pub mod mirror;
pub mod password;
pub mod records;
pub mod stats;

pub use database::{RetryPolicy, Store};
pub use error::{LedgerError, Result};
pub use mirror::{ComplaintRow, Mirror, StudentRow, spawn_mirror_worker};
pub use stats::Stats;
