//! Data storage layer
//!
//! - `sqlite` - span storage, schema, and the one-time table reshape
//! - `topics` - in-process broadcast topics for live span fan-out

pub mod sqlite;
pub mod topics;

pub use sqlite::{SqliteError, SqlitePool, SqliteService};
pub use topics::{TopicError, TopicService};
