//! SQL storage for the expiry signal service.
//!
//! [`SQLStore`] is the seam the signal store is written against;
//! [`SqliteStore`] is the only backend.

pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::SQLError;
pub use sqlite::SqliteStore;
pub use traits::{Row, SQLStore, Value};
