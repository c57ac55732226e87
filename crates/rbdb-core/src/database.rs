//! Library database handle
//!
//! The `Database` owns the SQLite connection and coordinates between:
//! - the unlock cache (protected files are opened through a decrypted copy)
//! - the playlist mirror next to the database file
//! - the analysis file tree under the share directory
//!
//! ## Usage
//!
//! ```ignore
//! let mut db = Database::open("master.db", OpenOptions::default())?;
//!
//! // Read rows
//! let track = db.get_content("178162577")?;
//!
//! // Mutate through the playlist engine (stamps USNs, updates the mirror)
//! let song = db.add_to_playlist("2602250856", "178162577", None)?;
//! ```
//!
//! Every mutation runs in its own [`UnitOfWork`]; callers needing several
//! edits in one commit use [`Database::transaction`].

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::anlz::{self, AnlzPaths};
use crate::catalog::{self, Entity, Table};
use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::export::{self, JsonRow};
use crate::mirror::{PlaylistMirror, MIRROR_FILE_NAME};
use crate::models::{Album, Artist, Content, Genre, Key, Label, Playlist, PlaylistKind, SongPlaylist};
use crate::playlist;
use crate::search;
use crate::storage::persistence::atomic_write;
use crate::storage::schema::{init_schema, needs_init};
use crate::storage::unlock::{is_plaintext, CipherParams, Unlocker};
use crate::unit_of_work::UnitOfWork;
use crate::usn;

/// How to open a library
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenOptions {
    /// Decrypt a protected file before opening it
    pub unlock: bool,
    /// Passphrase for protected files
    pub key: Option<String>,
    /// Where decrypted copies go (defaults to the user cache directory)
    pub cache_dir: Option<PathBuf>,
    /// Mirror document (defaults to `masterPlaylists6.xml` next to the database,
    /// or none when the database is opened through a decrypted copy)
    pub playlist_xml: Option<PathBuf>,
    /// Analysis file root (defaults to `share` next to the database)
    pub share_dir: Option<PathBuf>,
    /// Cipher settings of protected files
    pub cipher: CipherParams,
}

impl OpenOptions {
    /// Options for a protected file
    pub fn unlocked(key: impl Into<String>) -> Self {
        Self {
            unlock: true,
            key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// An open library database
pub struct Database {
    conn: Connection,
    /// File the caller asked for
    path: PathBuf,
    /// File actually opened (a decrypted copy for protected files)
    db_file: PathBuf,
    mirror: Option<PlaylistMirror>,
    share_dir: PathBuf,
}

impl Database {
    /// Open an existing library
    ///
    /// Fails with a format error when the file is protected but `unlock`
    /// is off, or when it lacks the library tables.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::FileNotFound { path });
        }
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let db_file = if options.unlock {
            let key = options
                .key
                .clone()
                .ok_or_else(|| Error::Decryption("no key configured for unlocking".to_string()))?;
            let cache_dir = options.cache_dir.clone().unwrap_or_else(config::default_cache_dir);
            let unlocked = Unlocker::new(cache_dir, key, options.cipher).unlock(&path)?;
            if unlocked.reused {
                info!("Using cached decrypted copy {:?}", unlocked.path);
            }
            unlocked.path
        } else {
            if !is_plaintext(&path)? {
                return Err(Error::Format {
                    path,
                    details: "not a plaintext SQLite file; open it with unlocking enabled".to_string(),
                });
            }
            path.clone()
        };

        let conn = Connection::open(&db_file)?;
        match needs_init(&conn) {
            Ok(false) => {}
            Ok(true) => {
                return Err(Error::Format {
                    path,
                    details: "missing library tables".to_string(),
                })
            }
            Err(e) => {
                return Err(Error::Format {
                    path,
                    details: format!("unreadable library: {e}"),
                })
            }
        }

        let mirror = Self::attach_mirror(&path, &db_file, &base_dir, &options)?;

        let share_dir = options.share_dir.clone().unwrap_or_else(|| base_dir.join("share"));

        info!("Opened library {:?}", path);
        Ok(Self {
            conn,
            path,
            db_file,
            mirror,
            share_dir,
        })
    }

    /// Load the playlist mirror for the opened file
    ///
    /// A decrypted copy lives apart from the library, so the sidecar next to
    /// the library is not attached to it unless `playlist_xml` names one.
    fn attach_mirror(
        path: &Path,
        db_file: &Path,
        base_dir: &Path,
        options: &OpenOptions,
    ) -> Result<Option<PlaylistMirror>> {
        let xml_path = match options.playlist_xml {
            Some(ref xml_path) => xml_path.clone(),
            None if db_file != path => {
                warn!(
                    "Editing decrypted copy {:?}; the mirror beside {:?} will not be updated",
                    db_file, path
                );
                return Ok(None);
            }
            None => base_dir.join(MIRROR_FILE_NAME),
        };

        if xml_path.is_file() {
            Ok(Some(PlaylistMirror::load(&xml_path)?))
        } else {
            warn!("Playlist mirror {:?} not found; playlist changes will not be mirrored", xml_path);
            Ok(None)
        }
    }

    /// Open the library named by a configuration
    pub fn open_with_config(config: &Config) -> Result<Self> {
        Self::open(config.database_path(), config.open_options())
    }

    /// Create a new, empty library with an empty playlist mirror beside it
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(Error::validation(format!("{:?} already exists", path)));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        conn.close().map_err(|(_, e)| Error::Database(e))?;

        let xml_path = path
            .parent()
            .map(|p| p.join(MIRROR_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(MIRROR_FILE_NAME));
        if !xml_path.exists() {
            let mirror = PlaylistMirror::empty(&xml_path);
            atomic_write(&xml_path, mirror.to_xml()?.as_bytes())?;
        }

        info!("Created library {:?}", path);
        Self::open(path, OpenOptions::default())
    }

    /// Close the connection
    pub fn close(self) -> Result<()> {
        debug!("Closing library {:?}", self.path);
        self.conn.close().map_err(|(_, e)| Error::Database(e))
    }

    /// Raw connection, for read-only queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The library file as given to [`Database::open`]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file the connection reads (differs from `path` when unlocked)
    pub fn db_file(&self) -> &Path {
        &self.db_file
    }

    /// The playlist mirror, if one was found
    pub fn mirror(&self) -> Option<&PlaylistMirror> {
        self.mirror.as_ref()
    }

    /// Root of the analysis file tree
    pub fn share_dir(&self) -> &Path {
        &self.share_dir
    }

    // ==================== Units of Work ====================

    /// Start a unit of work
    pub fn unit_of_work(&mut self) -> Result<UnitOfWork<'_>> {
        let tx = self.conn.transaction()?;
        Ok(UnitOfWork::new(tx, self.mirror.as_mut()))
    }

    /// Run `f` in a unit of work, committing if it succeeds
    ///
    /// Any error from `f` or from the commit rolls everything back.
    pub fn transaction<R>(&mut self, f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<R>) -> Result<R> {
        let mut uow = self.unit_of_work()?;
        let result = f(&mut uow)?;
        uow.commit()?;
        Ok(result)
    }

    // ==================== Catalog ====================

    pub fn get_content(&self, id: &str) -> Result<Option<Content>> {
        catalog::fetch(&self.conn, id)
    }

    pub fn all_content(&self) -> Result<Vec<Content>> {
        catalog::fetch_all(&self.conn)
    }

    pub fn get_playlist(&self, id: &str) -> Result<Option<Playlist>> {
        catalog::fetch(&self.conn, id)
    }

    pub fn playlists(&self) -> Result<Vec<Playlist>> {
        catalog::fetch_all(&self.conn)
    }

    /// Songs of a playlist ordered by track number
    pub fn playlist_songs(&self, playlist_id: &str) -> Result<Vec<SongPlaylist>> {
        catalog::fetch_where(
            &self.conn,
            "PlaylistID = ?1 ORDER BY TrackNo",
            &[Value::Text(playlist_id.to_string())],
        )
    }

    pub fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        catalog::fetch(&self.conn, id)
    }

    pub fn get_album(&self, id: &str) -> Result<Option<Album>> {
        catalog::fetch(&self.conn, id)
    }

    pub fn get_label(&self, id: &str) -> Result<Option<Label>> {
        catalog::fetch(&self.conn, id)
    }

    pub fn get_genre(&self, id: &str) -> Result<Option<Genre>> {
        catalog::fetch(&self.conn, id)
    }

    pub fn get_key(&self, id: &str) -> Result<Option<Key>> {
        catalog::fetch(&self.conn, id)
    }

    /// Every row of any catalog table, column by column
    pub fn rows(&self, table: Table) -> Result<Vec<JsonRow>> {
        export::rows(&self.conn, table)
    }

    // ==================== Row Edits ====================

    /// Insert a row and stamp it
    pub fn insert(&mut self, entity: impl Into<Entity>) -> Result<()> {
        let entity = entity.into();
        self.transaction(|uow| {
            uow.insert(entity);
            uow.autoincrement_usn()?;
            Ok(())
        })
    }

    /// Set one column of one row and stamp the row
    pub fn update_field(
        &mut self,
        table: Table,
        id: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        self.transaction(|uow| {
            uow.update(table, id, column, value)?;
            uow.autoincrement_usn()?;
            Ok(())
        })
    }

    /// Delete one row
    pub fn delete(&mut self, table: Table, id: &str) -> Result<()> {
        self.transaction(|uow| {
            uow.delete(table, id);
            uow.autoincrement_usn()?;
            Ok(())
        })
    }

    // ==================== USN ====================

    pub fn get_local_usn(&self) -> Result<i64> {
        usn::read_local_usn(&self.conn)
    }

    /// Add `amount` (>= 1) to the local USN and return the new value
    pub fn increment_local_usn(&mut self, amount: i64) -> Result<i64> {
        usn::check_increment(amount)?;
        self.transaction(|uow| uow.increment_local_usn(amount))
    }

    /// Overwrite the local USN (>= 1)
    pub fn set_local_usn(&mut self, value: i64) -> Result<()> {
        self.transaction(|uow| usn::write_local_usn(uow.connection(), value))
    }

    // ==================== Playlist Operations ====================

    /// Add a track to a playlist, appending when `track_no` is `None`
    pub fn add_to_playlist(
        &mut self,
        playlist_id: &str,
        content_id: &str,
        track_no: Option<i64>,
    ) -> Result<SongPlaylist> {
        self.transaction(|uow| playlist::add_to_playlist(uow, playlist_id, content_id, track_no))
    }

    /// Remove a song from a playlist
    pub fn remove_from_playlist(&mut self, playlist_id: &str, song_id: &str) -> Result<()> {
        self.transaction(|uow| playlist::remove_from_playlist(uow, playlist_id, song_id))
    }

    /// Move a song to another position in its playlist
    pub fn move_song(&mut self, playlist_id: &str, song_id: &str, track_no: i64) -> Result<SongPlaylist> {
        self.transaction(|uow| playlist::move_song(uow, playlist_id, song_id, track_no))
    }

    /// Create a playlist under a folder or the root
    pub fn create_playlist(&mut self, name: &str, parent_id: &str) -> Result<Playlist> {
        self.transaction(|uow| playlist::create_playlist(uow, name, parent_id, PlaylistKind::Playlist))
    }

    /// Create a playlist folder under a folder or the root
    pub fn create_playlist_folder(&mut self, name: &str, parent_id: &str) -> Result<Playlist> {
        self.transaction(|uow| playlist::create_playlist(uow, name, parent_id, PlaylistKind::Folder))
    }

    pub fn rename_playlist(&mut self, playlist_id: &str, name: &str) -> Result<Playlist> {
        self.transaction(|uow| playlist::rename_playlist(uow, playlist_id, name))
    }

    /// Delete a playlist, or a folder with everything in it
    pub fn delete_playlist(&mut self, playlist_id: &str) -> Result<Vec<String>> {
        self.transaction(|uow| playlist::delete_playlist(uow, playlist_id))
    }

    // ==================== Search & Files ====================

    /// Tracks whose title, artist, album or label contains `query`
    pub fn search_content(&self, query: &str) -> Result<Vec<Content>> {
        search::search_content(&self.conn, query)
    }

    /// Analysis directory of a track
    pub fn anlz_dir(&self, content: &Content) -> Result<PathBuf> {
        anlz::anlz_dir(&self.share_dir, content)
    }

    /// Analysis files present for a track
    pub fn anlz_paths(&self, content: &Content) -> Result<AnlzPaths> {
        anlz::anlz_paths(&self.share_dir, content)
    }

    /// Write every table to a JSON file
    pub fn to_json(&self, path: impl AsRef<Path>) -> Result<()> {
        export::write_json(&self.conn, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::storage::unlock::tests::{encrypt, reserved_plaintext_db, test_params, TEST_KEY};
    use crate::storage::unlock::SQLITE_HEADER;
    use tempfile::TempDir;

    #[test]
    fn test_open_and_query() {
        let temp_dir = TempDir::new().unwrap();
        let db = fixtures::open_library(temp_dir.path());

        let tables: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| row.get(0))
            .unwrap();
        assert!(tables >= Table::ALL.len() as i64);
        assert!(db.mirror().is_some());
        assert_eq!(db.share_dir(), temp_dir.path().join("share"));
    }

    #[test]
    fn test_close_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = fixtures::create_library(temp_dir.path());

        let db = Database::open(&path, OpenOptions::default()).unwrap();
        db.close().unwrap();

        let db = Database::open(&path, OpenOptions::default()).unwrap();
        assert!(!db.all_content().unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = Database::open(temp_dir.path().join("master.db"), OpenOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_open_non_library_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("other.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();

        let err = Database::open(&path, OpenOptions::default()).err().unwrap();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_open_encrypted_without_unlock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("master.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();

        let err = Database::open(&path, OpenOptions::default()).err().unwrap();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_open_unlocked_twice_reuses_copy() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("plain.db");
        reserved_plaintext_db(&plain);
        let locked_dir = temp_dir.path().join("library");
        std::fs::create_dir_all(&locked_dir).unwrap();
        let locked = locked_dir.join("master.db");
        std::fs::write(&locked, encrypt(&std::fs::read(&plain).unwrap(), TEST_KEY, &test_params()))
            .unwrap();

        let options = OpenOptions {
            cache_dir: Some(temp_dir.path().join("cache")),
            cipher: test_params(),
            ..OpenOptions::unlocked(TEST_KEY)
        };

        let db = Database::open(&locked, options.clone()).unwrap();
        let first = db.db_file().to_path_buf();
        assert_ne!(first, locked);
        assert_eq!(db.path(), locked);
        assert!(db.mirror().is_none());
        let title = db.get_content("1").unwrap().unwrap().title;
        assert_eq!(title.as_deref(), Some("Locked Track"));
        db.close().unwrap();

        let modified = std::fs::metadata(&first).unwrap().modified().unwrap();
        let db = Database::open(&locked, options).unwrap();
        assert_eq!(db.db_file(), first);
        assert_eq!(std::fs::metadata(&first).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_unlocked_copy_leaves_sidecar_mirror_alone() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("plain.db");
        reserved_plaintext_db(&plain);
        let conn = Connection::open(&plain).unwrap();
        let playlist = Playlist::new(fixtures::PLAYLIST, "Locked List", PlaylistKind::Playlist, "root", 1);
        catalog::insert_entity(&conn, &playlist.clone().into()).unwrap();
        conn.close().unwrap();

        let library_dir = temp_dir.path().join("library");
        std::fs::create_dir_all(&library_dir).unwrap();
        let locked = library_dir.join("master.db");
        std::fs::write(&locked, encrypt(&std::fs::read(&plain).unwrap(), TEST_KEY, &test_params()))
            .unwrap();
        let locked_before = std::fs::read(&locked).unwrap();

        let xml_path = library_dir.join(MIRROR_FILE_NAME);
        let mut mirror = PlaylistMirror::empty(&xml_path);
        mirror
            .add(&playlist.id, &playlist.parent_id, playlist.attribute, playlist.updated_at)
            .unwrap();
        atomic_write(&xml_path, mirror.to_xml().unwrap().as_bytes()).unwrap();
        let xml_before = std::fs::read(&xml_path).unwrap();

        let options = OpenOptions {
            cache_dir: Some(temp_dir.path().join("cache")),
            cipher: test_params(),
            ..OpenOptions::unlocked(TEST_KEY)
        };
        let mut db = Database::open(&locked, options.clone()).unwrap();
        assert!(db.mirror().is_none());

        db.add_to_playlist(fixtures::PLAYLIST, "1", None).unwrap();
        assert_eq!(db.playlist_songs(fixtures::PLAYLIST).unwrap().len(), 1);
        assert_eq!(std::fs::read(&xml_path).unwrap(), xml_before);
        assert_eq!(std::fs::read(&locked).unwrap(), locked_before);
        db.close().unwrap();

        // an explicit mirror path is still honoured
        let options = OpenOptions {
            playlist_xml: Some(xml_path.clone()),
            ..options
        };
        let db = Database::open(&locked, options).unwrap();
        assert_eq!(db.mirror().unwrap().path(), xml_path);
    }

    #[test]
    fn test_open_corrupt_file_reports_cause() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("master.db");
        let mut data = SQLITE_HEADER.to_vec();
        data.resize(4096, 0xFF);
        std::fs::write(&path, data).unwrap();

        match Database::open(&path, OpenOptions::default()) {
            Err(Error::Format { details, .. }) => {
                assert!(details.starts_with("unreadable library"), "{details}")
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("corrupt file opened"),
        }
    }

    #[test]
    fn test_unlock_without_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = fixtures::create_library(temp_dir.path());

        let options = OpenOptions {
            unlock: true,
            ..OpenOptions::default()
        };
        let err = Database::open(&path, options).err().unwrap();
        assert!(matches!(err, Error::Decryption(_)));
    }

    #[test]
    fn test_missing_mirror_is_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let path = fixtures::create_library(temp_dir.path());
        std::fs::remove_file(temp_dir.path().join(MIRROR_FILE_NAME)).unwrap();

        let mut db = Database::open(&path, OpenOptions::default()).unwrap();
        assert!(db.mirror().is_none());
        db.add_to_playlist(fixtures::PLAYLIST, fixtures::TRACK_1, None)
            .unwrap();
        assert_eq!(db.playlist_songs(fixtures::PLAYLIST).unwrap().len(), 1);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = fixtures::create_library(temp_dir.path());
        assert!(matches!(Database::create(&path), Err(Error::Validation(_))));
    }

    #[test]
    fn test_typed_getters() {
        let temp_dir = TempDir::new().unwrap();
        let db = fixtures::open_library(temp_dir.path());

        let track = db.get_content(fixtures::TRACK_1).unwrap().unwrap();
        assert_eq!(track.title.as_deref(), Some("Demo Track 1"));

        let artist = db.get_artist(track.artist_id.as_deref().unwrap()).unwrap().unwrap();
        assert_eq!(artist.name.as_deref(), Some("Loopmasters"));
        assert!(db.get_album("300").unwrap().is_some());
        assert!(db.get_label("200").unwrap().is_some());
        assert!(db.get_genre("400").unwrap().is_some());
        assert!(db.get_key("500").unwrap().is_some());
        assert!(db.get_content("does-not-exist").unwrap().is_none());

        assert_eq!(db.playlists().unwrap().len(), 4);
        assert!(db.get_playlist(fixtures::FOLDER).unwrap().unwrap().is_folder());
    }

    #[test]
    fn test_rows_for_untyped_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db = fixtures::open_library(temp_dir.path());

        for &table in Table::ALL {
            db.rows(table).unwrap();
        }
        assert_eq!(db.rows(Table::Property).unwrap().len(), 1);
    }

    #[test]
    fn test_increment_local_usn() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = fixtures::open_library(temp_dir.path());
        let old = db.get_local_usn().unwrap();

        db.increment_local_usn(1).unwrap();
        assert_eq!(db.get_local_usn().unwrap(), old + 1);
        db.increment_local_usn(1).unwrap();
        assert_eq!(db.get_local_usn().unwrap(), old + 2);
        db.increment_local_usn(2).unwrap();
        assert_eq!(db.get_local_usn().unwrap(), old + 4);

        for n in [3, 3, 3] {
            db.increment_local_usn(n).unwrap();
        }
        assert_eq!(db.get_local_usn().unwrap(), old + 13);

        assert!(matches!(db.increment_local_usn(0), Err(Error::Validation(_))));
        assert!(matches!(db.increment_local_usn(-1), Err(Error::Validation(_))));
        assert_eq!(db.get_local_usn().unwrap(), old + 13);
    }

    #[test]
    fn test_set_local_usn() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = fixtures::open_library(temp_dir.path());

        db.set_local_usn(500).unwrap();
        assert_eq!(db.get_local_usn().unwrap(), 500);
        assert!(db.set_local_usn(0).is_err());
        assert_eq!(db.get_local_usn().unwrap(), 500);
    }

    #[test]
    fn test_autoincrement_in_transaction() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = fixtures::open_library(temp_dir.path());
        let old_usn = db.get_local_usn().unwrap();
        let noise_usn = db.get_content(fixtures::NOISE_TRACK).unwrap().unwrap().usn;

        let new_usn = db
            .transaction(|uow| {
                uow.no_autoflush(|uow| {
                    uow.update(Table::Content, fixtures::TRACK_1, "Title", "Edited".to_string())?;
                    uow.update(Table::Content, fixtures::TRACK_2, "Title", "Edited 2".to_string())?;
                    uow.update(Table::Content, fixtures::TRACK_2, "Rating", 5i64)?;
                    uow.delete(Table::Content, fixtures::NOISE_TRACK);

                    let noise: Content = uow.require(fixtures::NOISE_TRACK)?;
                    assert_eq!(noise.usn, noise_usn);

                    uow.autoincrement_usn()
                })
            })
            .unwrap();

        assert_eq!(new_usn, old_usn + 2);
        assert_eq!(db.get_local_usn().unwrap(), old_usn + 2);
        let a = db.get_content(fixtures::TRACK_1).unwrap().unwrap();
        let b = db.get_content(fixtures::TRACK_2).unwrap().unwrap();
        assert_eq!(a.usn, Some(old_usn + 1));
        assert_eq!(b.usn, Some(old_usn + 2));
        assert!(a.usn < b.usn);
        assert!(db.get_content(fixtures::NOISE_TRACK).unwrap().is_none());
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = fixtures::open_library(temp_dir.path());
        let old_usn = db.get_local_usn().unwrap();

        let result: Result<()> = db.transaction(|uow| {
            uow.update(Table::Content, fixtures::TRACK_1, "Title", "Lost".to_string())?;
            uow.autoincrement_usn()?;
            uow.flush()?;
            Err(Error::validation("abort"))
        });

        assert!(result.is_err());
        assert_eq!(db.get_local_usn().unwrap(), old_usn);
        let track = db.get_content(fixtures::TRACK_1).unwrap().unwrap();
        assert_eq!(track.title.as_deref(), Some("Demo Track 1"));
    }

    #[test]
    fn test_row_edit_helpers() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = fixtures::open_library(temp_dir.path());
        let old_usn = db.get_local_usn().unwrap();

        db.insert(Artist::new("102", "New Artist")).unwrap();
        db.update_field(Table::Content, fixtures::TRACK_1, "ArtistID", "102".to_string())
            .unwrap();
        db.delete(Table::Content, fixtures::SINE_TRACK).unwrap();

        assert_eq!(db.get_local_usn().unwrap(), old_usn + 2);
        assert_eq!(db.get_artist("102").unwrap().unwrap().usn, Some(old_usn + 1));
        assert!(matches!(
            db.update_field(Table::Content, fixtures::TRACK_1, "ID", "x".to_string()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.delete(Table::Content, "missing"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_anlz_dir_uses_share_dir() {
        let temp_dir = TempDir::new().unwrap();
        let db = fixtures::open_library(temp_dir.path());
        let track = db.get_content(fixtures::TRACK_1).unwrap().unwrap();

        let dir = db.anlz_dir(&track).unwrap();
        let expected = "share/PIONEER/USBANLZ/735/e8b81-e69b-41ad-80f8-9c0d7613b96d";
        assert!(dir.to_string_lossy().replace('\\', "/").ends_with(expected));
        assert_eq!(dir, db.anlz_dir(&track).unwrap());
        assert!(db.anlz_paths(&track).unwrap().is_empty());
    }

    #[test]
    fn test_to_json() {
        let temp_dir = TempDir::new().unwrap();
        let db = fixtures::open_library(temp_dir.path());
        let path = temp_dir.path().join("library.json");

        db.to_json(&path).unwrap();
        assert!(path.exists());
    }
}
