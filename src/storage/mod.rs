//! # Storage Module
//!
//! File-backed persistence. The controller keeps a single durable artifact,
//! the [`ActivityLog`]; gate state itself lives in memory and is rebuilt on
//! restart.
//!
//! ```rust,no_run
//! use chrono::FixedOffset;
//! use smsgate::storage::ActivityLog;
//!
//! let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
//! let log = ActivityLog::open("gate_log.txt", 100, offset);
//! log.append("Starting Gate Control");
//! for entry in log.tail(8) {
//!     println!("{}", entry);
//! }
//! ```

pub mod activity_log;

pub use activity_log::{ActivityLog, LogEntry};
