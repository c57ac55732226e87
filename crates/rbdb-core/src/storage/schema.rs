//! SQLite schema for new library files
//!
//! The host application owns the schema of existing libraries; this module
//! only lays out the same tables for a fresh file (new libraries and test
//! fixtures). Tables the crate reads field-by-field get their full column
//! set, the remaining catalog tables get the shared bookkeeping columns.

use rusqlite::{params, Connection, Result};

use crate::catalog::{format_timestamp, now, Table};

/// Database version recorded in `djmdProperty` for new files
pub const DB_VERSION: &str = "6000";

/// Registry row holding the local USN counter
pub const LOCAL_USN_REGISTRY_ID: &str = "localUpdateCount";

/// Initial value of the local USN in a new file
pub const INITIAL_LOCAL_USN: i64 = 1;

const COMMON_COLUMN_DEFS: &str = r#"
    UUID VARCHAR(255) DEFAULT NULL,
    rb_data_status INTEGER DEFAULT 0,
    rb_local_data_status INTEGER DEFAULT 0,
    rb_local_deleted TINYINT(1) DEFAULT 0,
    rb_local_synced TINYINT(1) DEFAULT 0,
    usn BIGINT DEFAULT NULL,
    rb_local_usn BIGINT DEFAULT NULL,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
"#;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let typed = [
        (
            Table::Content,
            r#"
            Title VARCHAR(255) DEFAULT NULL,
            ArtistID VARCHAR(255) DEFAULT NULL,
            AlbumID VARCHAR(255) DEFAULT NULL,
            GenreID VARCHAR(255) DEFAULT NULL,
            LabelID VARCHAR(255) DEFAULT NULL,
            KeyID VARCHAR(255) DEFAULT NULL,
            BPM INTEGER DEFAULT NULL,
            Length INTEGER DEFAULT NULL,
            TrackNo INTEGER DEFAULT NULL,
            Rating INTEGER DEFAULT NULL,
            ReleaseYear INTEGER DEFAULT NULL,
            Commnt TEXT DEFAULT NULL,
            FolderPath VARCHAR(255) DEFAULT NULL,
            FileNameL VARCHAR(255) DEFAULT NULL,
            AnalysisDataPath VARCHAR(255) DEFAULT NULL,
            "#,
        ),
        (
            Table::Playlist,
            r#"
            Seq INTEGER DEFAULT NULL,
            Name VARCHAR(255) DEFAULT NULL,
            ImagePath VARCHAR(255) DEFAULT NULL,
            Attribute INTEGER DEFAULT NULL,
            ParentID VARCHAR(255) DEFAULT NULL,
            SmartList TEXT DEFAULT NULL,
            "#,
        ),
        (
            Table::SongPlaylist,
            r#"
            PlaylistID VARCHAR(255) DEFAULT NULL,
            ContentID VARCHAR(255) DEFAULT NULL,
            TrackNo INTEGER DEFAULT NULL,
            "#,
        ),
        (
            Table::Artist,
            r#"
            Name VARCHAR(255) DEFAULT NULL,
            SearchStr VARCHAR(255) DEFAULT NULL,
            "#,
        ),
        (
            Table::Album,
            r#"
            Name VARCHAR(255) DEFAULT NULL,
            AlbumArtistID VARCHAR(255) DEFAULT NULL,
            ImagePath VARCHAR(255) DEFAULT NULL,
            Compilation INTEGER DEFAULT NULL,
            SearchStr VARCHAR(255) DEFAULT NULL,
            "#,
        ),
        (Table::Label, "Name VARCHAR(255) DEFAULT NULL,"),
        (Table::Genre, "Name VARCHAR(255) DEFAULT NULL,"),
        (
            Table::Key,
            r#"
            ScaleName VARCHAR(255) DEFAULT NULL,
            Seq INTEGER DEFAULT NULL,
            "#,
        ),
    ];

    for table in Table::ALL {
        let specific = typed
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, cols)| *cols);

        let sql = match table {
            Table::AgentRegistry => r#"
                CREATE TABLE IF NOT EXISTS agentRegistry (
                    registry_id VARCHAR(255) PRIMARY KEY,
                    id_1 VARCHAR(255) DEFAULT NULL,
                    id_2 VARCHAR(255) DEFAULT NULL,
                    int_1 BIGINT DEFAULT NULL,
                    int_2 BIGINT DEFAULT NULL,
                    str_1 VARCHAR(255) DEFAULT NULL,
                    str_2 VARCHAR(255) DEFAULT NULL,
                    date_1 DATETIME DEFAULT NULL,
                    date_2 DATETIME DEFAULT NULL,
                    text_1 TEXT DEFAULT NULL,
                    text_2 TEXT DEFAULT NULL,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL
                );"#
            .to_string(),
            Table::Property => r#"
                CREATE TABLE IF NOT EXISTS djmdProperty (
                    DBID VARCHAR(255) PRIMARY KEY,
                    DBVersion VARCHAR(255) DEFAULT NULL,
                    BaseDBDrive VARCHAR(255) DEFAULT NULL,
                    CurrentDBDrive VARCHAR(255) DEFAULT NULL,
                    DeviceID VARCHAR(255) DEFAULT NULL,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL
                );"#
            .to_string(),
            _ => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    ID VARCHAR(255) PRIMARY KEY,\n{}{}\n);",
                table.name(),
                specific.unwrap_or(""),
                COMMON_COLUMN_DEFS
            ),
        };
        conn.execute_batch(&sql)?;
    }

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS djmd_song_playlist_PlaylistID ON djmdSongPlaylist(PlaylistID);
        CREATE INDEX IF NOT EXISTS djmd_song_playlist_ContentID ON djmdSongPlaylist(ContentID);
        CREATE INDEX IF NOT EXISTS djmd_playlist_ParentID ON djmdPlaylist(ParentID);
        CREATE INDEX IF NOT EXISTS djmd_content_ArtistID ON djmdContent(ArtistID);
        "#,
    )?;

    let stamp = format_timestamp(&now());
    conn.execute(
        "INSERT OR IGNORE INTO agentRegistry (registry_id, int_1, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![LOCAL_USN_REGISTRY_ID, INITIAL_LOCAL_USN, stamp],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO djmdProperty (DBID, DBVersion, created_at, updated_at) VALUES ('1', ?1, ?2, ?2)",
        params![DB_VERSION, stamp],
    )?;

    Ok(())
}

/// Get the database version recorded in `djmdProperty`
pub fn get_db_version(conn: &Connection) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT DBVersion FROM djmdProperty LIMIT 1")?;
    let result: Result<Option<String>> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if the file lacks the tables a library must have
pub fn needs_init(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1")?;
    for table in [Table::Content, Table::Playlist, Table::SongPlaylist, Table::AgentRegistry] {
        if !stmt.exists([table.name()])? {
            return Ok(true);
        }
    }
    Ok(false)
}
