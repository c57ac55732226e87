//! Storage layer
//!
//! File-level concerns below the catalog:
//!
//! - **schema**: creating and versioning the library tables
//! - **persistence**: atomic writes and restorable backups for side files
//! - **unlock**: decrypting protected library files into a cached copy

pub mod persistence;
pub mod schema;
pub mod unlock;

pub use persistence::{atomic_write, FileBackup};
pub use schema::{init_schema, needs_init, DB_VERSION};
pub use unlock::{CipherParams, Unlocked, Unlocker};
