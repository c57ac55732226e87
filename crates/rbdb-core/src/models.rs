//! Typed rows
//!
//! Structs for the tables this crate reads and writes field-by-field.
//! Field names follow Rust conventions; the `COLUMNS` of each [`Record`]
//! impl name the host application's columns. `usn` maps to the
//! `rb_local_usn` column and is `None` for rows never stamped.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{now, timestamp_value, DbDateTime, Record, Table};

/// Parent ID of top-level playlists
pub const ROOT_PLAYLIST_ID: &str = "root";

/// A track in the collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub id: String,
    pub uuid: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub album_id: Option<String>,
    pub genre_id: Option<String>,
    pub label_id: Option<String>,
    pub key_id: Option<String>,
    /// Tempo in hundredths of a BPM
    pub bpm: Option<i64>,
    /// Duration in seconds
    pub length: Option<i64>,
    pub track_no: Option<i64>,
    pub rating: Option<i64>,
    pub release_year: Option<i64>,
    pub comment: Option<String>,
    pub folder_path: Option<String>,
    pub file_name: Option<String>,
    pub analysis_data_path: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    /// Create a track with a title and a fresh UUID
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: id.into(),
            uuid: Some(Uuid::new_v4().to_string()),
            title: Some(title.into()),
            artist_id: None,
            album_id: None,
            genre_id: None,
            label_id: None,
            key_id: None,
            bpm: None,
            length: None,
            track_no: None,
            rating: None,
            release_year: None,
            comment: None,
            folder_path: None,
            file_name: None,
            analysis_data_path: None,
            usn: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title, or an empty string when unset
    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

impl Record for Content {
    const TABLE: Table = Table::Content;
    const KIND: &'static str = "Content";
    const COLUMNS: &'static [&'static str] = &[
        "ID",
        "UUID",
        "Title",
        "ArtistID",
        "AlbumID",
        "GenreID",
        "LabelID",
        "KeyID",
        "BPM",
        "Length",
        "TrackNo",
        "Rating",
        "ReleaseYear",
        "Commnt",
        "FolderPath",
        "FileNameL",
        "AnalysisDataPath",
        "rb_local_usn",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            uuid: row.get("UUID")?,
            title: row.get("Title")?,
            artist_id: row.get("ArtistID")?,
            album_id: row.get("AlbumID")?,
            genre_id: row.get("GenreID")?,
            label_id: row.get("LabelID")?,
            key_id: row.get("KeyID")?,
            bpm: row.get("BPM")?,
            length: row.get("Length")?,
            track_no: row.get("TrackNo")?,
            rating: row.get("Rating")?,
            release_year: row.get("ReleaseYear")?,
            comment: row.get("Commnt")?,
            folder_path: row.get("FolderPath")?,
            file_name: row.get("FileNameL")?,
            analysis_data_path: row.get("AnalysisDataPath")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.uuid.clone().into(),
            self.title.clone().into(),
            self.artist_id.clone().into(),
            self.album_id.clone().into(),
            self.genre_id.clone().into(),
            self.label_id.clone().into(),
            self.key_id.clone().into(),
            self.bpm.into(),
            self.length.into(),
            self.track_no.into(),
            self.rating.into(),
            self.release_year.into(),
            self.comment.clone().into(),
            self.folder_path.clone().into(),
            self.file_name.clone().into(),
            self.analysis_data_path.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}

/// What a playlist row represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlaylistKind {
    Playlist,
    Folder,
    SmartPlaylist,
}

impl PlaylistKind {
    /// Value of the `Attribute` column
    pub fn attribute(self) -> i64 {
        match self {
            PlaylistKind::Playlist => 0,
            PlaylistKind::Folder => 1,
            PlaylistKind::SmartPlaylist => 4,
        }
    }

    pub fn from_attribute(attribute: i64) -> Option<Self> {
        match attribute {
            0 => Some(PlaylistKind::Playlist),
            1 => Some(PlaylistKind::Folder),
            4 => Some(PlaylistKind::SmartPlaylist),
            _ => None,
        }
    }
}

/// A playlist, playlist folder or smart playlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    pub id: String,
    pub seq: Option<i64>,
    pub name: Option<String>,
    pub attribute: i64,
    pub parent_id: String,
    pub smart_list: Option<String>,
    pub uuid: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Playlist {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: PlaylistKind,
        parent_id: impl Into<String>,
        seq: i64,
    ) -> Self {
        let now = now();
        Self {
            id: id.into(),
            seq: Some(seq),
            name: Some(name.into()),
            attribute: kind.attribute(),
            parent_id: parent_id.into(),
            smart_list: None,
            uuid: Some(Uuid::new_v4().to_string()),
            usn: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> Option<PlaylistKind> {
        PlaylistKind::from_attribute(self.attribute)
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == Some(PlaylistKind::Folder)
    }
}

impl Record for Playlist {
    const TABLE: Table = Table::Playlist;
    const KIND: &'static str = "Playlist";
    const COLUMNS: &'static [&'static str] = &[
        "ID",
        "Seq",
        "Name",
        "Attribute",
        "ParentID",
        "SmartList",
        "UUID",
        "rb_local_usn",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            seq: row.get("Seq")?,
            name: row.get("Name")?,
            attribute: row.get::<_, Option<i64>>("Attribute")?.unwrap_or(0),
            parent_id: row
                .get::<_, Option<String>>("ParentID")?
                .unwrap_or_else(|| ROOT_PLAYLIST_ID.to_string()),
            smart_list: row.get("SmartList")?,
            uuid: row.get("UUID")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.seq.into(),
            self.name.clone().into(),
            self.attribute.into(),
            self.parent_id.clone().into(),
            self.smart_list.clone().into(),
            self.uuid.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}

/// Membership of one track in one playlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SongPlaylist {
    pub id: String,
    pub playlist_id: String,
    pub content_id: String,
    /// 1-based position within the playlist
    pub track_no: i64,
    pub uuid: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SongPlaylist {
    pub fn new(
        id: impl Into<String>,
        playlist_id: impl Into<String>,
        content_id: impl Into<String>,
        track_no: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            playlist_id: playlist_id.into(),
            content_id: content_id.into(),
            track_no,
            uuid: Some(Uuid::new_v4().to_string()),
            usn: None,
            created_at: at,
            updated_at: at,
        }
    }
}

impl Record for SongPlaylist {
    const TABLE: Table = Table::SongPlaylist;
    const KIND: &'static str = "Song";
    const COLUMNS: &'static [&'static str] = &[
        "ID",
        "PlaylistID",
        "ContentID",
        "TrackNo",
        "UUID",
        "rb_local_usn",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            playlist_id: row.get("PlaylistID")?,
            content_id: row.get("ContentID")?,
            track_no: row.get("TrackNo")?,
            uuid: row.get("UUID")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.playlist_id.clone().into(),
            self.content_id.clone().into(),
            self.track_no.into(),
            self.uuid.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}

/// An artist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artist {
    pub id: String,
    pub name: Option<String>,
    pub search_str: Option<String>,
    pub uuid: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: id.into(),
            name: Some(name.into()),
            search_str: None,
            uuid: Some(Uuid::new_v4().to_string()),
            usn: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Artist {
    const TABLE: Table = Table::Artist;
    const KIND: &'static str = "Artist";
    const COLUMNS: &'static [&'static str] = &[
        "ID",
        "Name",
        "SearchStr",
        "UUID",
        "rb_local_usn",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            name: row.get("Name")?,
            search_str: row.get("SearchStr")?,
            uuid: row.get("UUID")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.name.clone().into(),
            self.search_str.clone().into(),
            self.uuid.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}

/// An album
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Album {
    pub id: String,
    pub name: Option<String>,
    pub album_artist_id: Option<String>,
    pub compilation: Option<i64>,
    pub search_str: Option<String>,
    pub uuid: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Album {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: id.into(),
            name: Some(name.into()),
            album_artist_id: None,
            compilation: None,
            search_str: None,
            uuid: Some(Uuid::new_v4().to_string()),
            usn: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Album {
    const TABLE: Table = Table::Album;
    const KIND: &'static str = "Album";
    const COLUMNS: &'static [&'static str] = &[
        "ID",
        "Name",
        "AlbumArtistID",
        "Compilation",
        "SearchStr",
        "UUID",
        "rb_local_usn",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            name: row.get("Name")?,
            album_artist_id: row.get("AlbumArtistID")?,
            compilation: row.get("Compilation")?,
            search_str: row.get("SearchStr")?,
            uuid: row.get("UUID")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.name.clone().into(),
            self.album_artist_id.clone().into(),
            self.compilation.into(),
            self.search_str.clone().into(),
            self.uuid.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}

/// A record label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub id: String,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: id.into(),
            name: Some(name.into()),
            uuid: Some(Uuid::new_v4().to_string()),
            usn: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Label {
    const TABLE: Table = Table::Label;
    const KIND: &'static str = "Label";
    const COLUMNS: &'static [&'static str] =
        &["ID", "Name", "UUID", "rb_local_usn", "created_at", "updated_at"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            name: row.get("Name")?,
            uuid: row.get("UUID")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.name.clone().into(),
            self.uuid.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}

/// A genre
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genre {
    pub id: String,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Genre {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: id.into(),
            name: Some(name.into()),
            uuid: Some(Uuid::new_v4().to_string()),
            usn: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Genre {
    const TABLE: Table = Table::Genre;
    const KIND: &'static str = "Genre";
    const COLUMNS: &'static [&'static str] =
        &["ID", "Name", "UUID", "rb_local_usn", "created_at", "updated_at"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            name: row.get("Name")?,
            uuid: row.get("UUID")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.name.clone().into(),
            self.uuid.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}

/// A musical key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Key {
    pub id: String,
    pub scale_name: Option<String>,
    pub seq: Option<i64>,
    pub uuid: Option<String>,
    pub usn: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Key {
    pub fn new(id: impl Into<String>, scale_name: impl Into<String>, seq: i64) -> Self {
        let now = now();
        Self {
            id: id.into(),
            scale_name: Some(scale_name.into()),
            seq: Some(seq),
            uuid: Some(Uuid::new_v4().to_string()),
            usn: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Key {
    const TABLE: Table = Table::Key;
    const KIND: &'static str = "Key";
    const COLUMNS: &'static [&'static str] = &[
        "ID",
        "ScaleName",
        "Seq",
        "UUID",
        "rb_local_usn",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            scale_name: row.get("ScaleName")?,
            seq: row.get("Seq")?,
            uuid: row.get("UUID")?,
            usn: row.get("rb_local_usn")?,
            created_at: row.get::<_, DbDateTime>("created_at")?.0,
            updated_at: row.get::<_, DbDateTime>("updated_at")?.0,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.scale_name.clone().into(),
            self.seq.into(),
            self.uuid.clone().into(),
            self.usn.into(),
            timestamp_value(&self.created_at),
            timestamp_value(&self.updated_at),
        ]
    }
}
