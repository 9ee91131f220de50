// Database module
// SQLite is the queried relational engine, LanceDB holds the schema document vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::{SchemaSource, SqliteEngine};
