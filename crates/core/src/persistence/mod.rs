//! Persistent record of instances, commits, saved artifacts and canvas metadata.

mod sqlite;
mod store;

pub use sqlite::SqlitePersistence;
pub use store::{Persistence, PersistenceError};
