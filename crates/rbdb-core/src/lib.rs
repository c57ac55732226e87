//! rbdb core library
//!
//! Consistency-preserving access to a DJ library database. Every mutation
//! advances the library's update sequence number (USN) once per changed
//! row, and playlist changes keep the `masterPlaylists6.xml` mirror in step
//! with the playlist table.
//!
//! # Quick Start
//!
//! ```text
//! let mut db = Database::open("master.db", OpenOptions::default())?;
//!
//! // Typed reads
//! let track = db.get_content("178162577")?;
//!
//! // Playlist edits stamp USNs and update the mirror in one commit
//! db.add_to_playlist("2602250856", "178162577", None)?;
//!
//! // Several edits, one commit
//! db.transaction(|uow| {
//!     uow.update(Table::Content, "178162577", "Rating", 5)?;
//!     uow.autoincrement_usn()
//! })?;
//! ```
//!
//! # Modules
//!
//! - `database`: library handle (main entry point)
//! - `unit_of_work`: change tracking, flushing, commit and rollback
//! - `usn`: the local update sequence number ledger
//! - `playlist`: playlist and song ordering rules
//! - `mirror`: the master playlist XML document
//! - `catalog` / `models`: table catalog and typed rows
//! - `storage`: schema, atomic file writes, decryption of protected files
//! - `search`, `anlz`, `export`: read-only helpers
//! - `config` / `logging`: application configuration and tracing setup

pub mod anlz;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod logging;
pub mod mirror;
pub mod models;
pub mod playlist;
pub mod search;
pub mod storage;
pub mod unit_of_work;
pub mod usn;

#[cfg(test)]
mod fixtures;

pub use anlz::AnlzPaths;
pub use catalog::{Entity, Record, Table};
pub use config::Config;
pub use database::{Database, OpenOptions};
pub use error::{Error, Result};
pub use mirror::{MirrorChange, MirrorError, PlaylistMirror};
pub use models::{Album, Artist, Content, Genre, Key, Label, Playlist, PlaylistKind, SongPlaylist};
pub use storage::{CipherParams, Unlocker};
pub use unit_of_work::{Change, UnitOfWork};
