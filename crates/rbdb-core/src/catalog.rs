//! Entity catalog
//!
//! Static mapping between the library's tables and their row shapes.
//! Every table the host application defines is listed in [`Table`]; the
//! rows this crate reads and writes field-by-field have typed structs in
//! [`crate::models`] implementing [`Record`]. Staged inserts carry an
//! [`Entity`], so dispatch is an explicit match rather than a lookup by name.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{Album, Artist, Content, Genre, Key, Label, Playlist, SongPlaylist};

/// Column holding a row's version stamp
pub const USN_COLUMN: &str = "rb_local_usn";

/// Columns shared by every versioned table
pub const COMMON_COLUMNS: &[&str] = &[
    "ID",
    "UUID",
    "rb_data_status",
    "rb_local_data_status",
    "rb_local_deleted",
    "rb_local_synced",
    "usn",
    "rb_local_usn",
    "created_at",
    "updated_at",
];

/// Every table in the library database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    ActiveCensor,
    Album,
    Artist,
    Category,
    Color,
    Content,
    Cue,
    Device,
    Genre,
    History,
    HotCueBanklist,
    Key,
    Label,
    MenuItems,
    MixerParam,
    MyTag,
    Playlist,
    Property,
    RelatedTracks,
    Sampler,
    SongHistory,
    SongHotCueBanklist,
    SongMyTag,
    SongPlaylist,
    SongRelatedTracks,
    SongSampler,
    Sort,
    AgentRegistry,
    CloudAgentRegistry,
    ContentActiveCensor,
    ContentCue,
    ContentFile,
    HotCueBanklistCue,
    ImageFile,
    SettingFile,
    UuidIdMap,
}

impl Table {
    /// All tables, in catalog order
    pub const ALL: &'static [Table] = &[
        Table::ActiveCensor,
        Table::Album,
        Table::Artist,
        Table::Category,
        Table::Color,
        Table::Content,
        Table::Cue,
        Table::Device,
        Table::Genre,
        Table::History,
        Table::HotCueBanklist,
        Table::Key,
        Table::Label,
        Table::MenuItems,
        Table::MixerParam,
        Table::MyTag,
        Table::Playlist,
        Table::Property,
        Table::RelatedTracks,
        Table::Sampler,
        Table::SongHistory,
        Table::SongHotCueBanklist,
        Table::SongMyTag,
        Table::SongPlaylist,
        Table::SongRelatedTracks,
        Table::SongSampler,
        Table::Sort,
        Table::AgentRegistry,
        Table::CloudAgentRegistry,
        Table::ContentActiveCensor,
        Table::ContentCue,
        Table::ContentFile,
        Table::HotCueBanklistCue,
        Table::ImageFile,
        Table::SettingFile,
        Table::UuidIdMap,
    ];

    /// SQL table name
    pub fn name(self) -> &'static str {
        match self {
            Table::ActiveCensor => "djmdActiveCensor",
            Table::Album => "djmdAlbum",
            Table::Artist => "djmdArtist",
            Table::Category => "djmdCategory",
            Table::Color => "djmdColor",
            Table::Content => "djmdContent",
            Table::Cue => "djmdCue",
            Table::Device => "djmdDevice",
            Table::Genre => "djmdGenre",
            Table::History => "djmdHistory",
            Table::HotCueBanklist => "djmdHotCueBanklist",
            Table::Key => "djmdKey",
            Table::Label => "djmdLabel",
            Table::MenuItems => "djmdMenuItems",
            Table::MixerParam => "djmdMixerParam",
            Table::MyTag => "djmdMyTag",
            Table::Playlist => "djmdPlaylist",
            Table::Property => "djmdProperty",
            Table::RelatedTracks => "djmdRelatedTracks",
            Table::Sampler => "djmdSampler",
            Table::SongHistory => "djmdSongHistory",
            Table::SongHotCueBanklist => "djmdSongHotCueBanklist",
            Table::SongMyTag => "djmdSongMyTag",
            Table::SongPlaylist => "djmdSongPlaylist",
            Table::SongRelatedTracks => "djmdSongRelatedTracks",
            Table::SongSampler => "djmdSongSampler",
            Table::Sort => "djmdSort",
            Table::AgentRegistry => "agentRegistry",
            Table::CloudAgentRegistry => "cloudAgentRegistry",
            Table::ContentActiveCensor => "contentActiveCensor",
            Table::ContentCue => "contentCue",
            Table::ContentFile => "contentFile",
            Table::HotCueBanklistCue => "hotCueBanklistCue",
            Table::ImageFile => "imageFile",
            Table::SettingFile => "settingFile",
            Table::UuidIdMap => "uuidIDMap",
        }
    }

    /// Primary key column
    pub fn id_column(self) -> &'static str {
        match self {
            Table::Property => "DBID",
            Table::AgentRegistry => "registry_id",
            _ => "ID",
        }
    }

    /// Whether rows of this table carry a version stamp
    pub fn is_versioned(self) -> bool {
        !matches!(self, Table::Property | Table::AgentRegistry)
    }

    /// Columns this crate reads and writes for the table
    ///
    /// Typed tables list their record columns in the order
    /// [`Record::values`] produces them; the rest expose the common set.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Content => Content::COLUMNS,
            Table::Playlist => Playlist::COLUMNS,
            Table::SongPlaylist => SongPlaylist::COLUMNS,
            Table::Artist => Artist::COLUMNS,
            Table::Album => Album::COLUMNS,
            Table::Label => Label::COLUMNS,
            Table::Genre => Genre::COLUMNS,
            Table::Key => Key::COLUMNS,
            Table::Property => &["DBID", "DBVersion", "DeviceID", "created_at", "updated_at"],
            Table::AgentRegistry => &["registry_id", "id_1", "int_1", "str_1", "created_at", "updated_at"],
            _ => COMMON_COLUMNS,
        }
    }

    /// Whether `column` may be written through a staged update
    pub fn is_writable(self, column: &str) -> bool {
        if column == self.id_column() {
            return false;
        }
        self.columns().contains(&column)
            || (self.is_versioned() && COMMON_COLUMNS.contains(&column))
    }

    /// Look up a table by its SQL name
    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed row of a catalog table
pub trait Record: Sized {
    /// Table the record lives in
    const TABLE: Table;
    /// Human-readable kind, used in error messages
    const KIND: &'static str;
    /// Column names, in the order of [`Record::values`]
    const COLUMNS: &'static [&'static str];

    /// Primary key
    fn id(&self) -> &str;

    /// Hydrate from a row selected with [`Record::COLUMNS`]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Column values for insertion
    fn values(&self) -> Vec<Value>;
}

/// A typed row of any kind, as staged for insertion
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Content(Content),
    Playlist(Playlist),
    Song(SongPlaylist),
    Artist(Artist),
    Album(Album),
    Label(Label),
    Genre(Genre),
    Key(Key),
}

impl Entity {
    pub fn table(&self) -> Table {
        match self {
            Entity::Content(_) => Table::Content,
            Entity::Playlist(_) => Table::Playlist,
            Entity::Song(_) => Table::SongPlaylist,
            Entity::Artist(_) => Table::Artist,
            Entity::Album(_) => Table::Album,
            Entity::Label(_) => Table::Label,
            Entity::Genre(_) => Table::Genre,
            Entity::Key(_) => Table::Key,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Content(r) => r.id(),
            Entity::Playlist(r) => r.id(),
            Entity::Song(r) => r.id(),
            Entity::Artist(r) => r.id(),
            Entity::Album(r) => r.id(),
            Entity::Label(r) => r.id(),
            Entity::Genre(r) => r.id(),
            Entity::Key(r) => r.id(),
        }
    }

    fn values(&self) -> Vec<Value> {
        match self {
            Entity::Content(r) => r.values(),
            Entity::Playlist(r) => r.values(),
            Entity::Song(r) => r.values(),
            Entity::Artist(r) => r.values(),
            Entity::Album(r) => r.values(),
            Entity::Label(r) => r.values(),
            Entity::Genre(r) => r.values(),
            Entity::Key(r) => r.values(),
        }
    }
}

impl From<Content> for Entity {
    fn from(r: Content) -> Self {
        Entity::Content(r)
    }
}

impl From<Playlist> for Entity {
    fn from(r: Playlist) -> Self {
        Entity::Playlist(r)
    }
}

impl From<SongPlaylist> for Entity {
    fn from(r: SongPlaylist) -> Self {
        Entity::Song(r)
    }
}

impl From<Artist> for Entity {
    fn from(r: Artist) -> Self {
        Entity::Artist(r)
    }
}

impl From<Album> for Entity {
    fn from(r: Album) -> Self {
        Entity::Album(r)
    }
}

impl From<Label> for Entity {
    fn from(r: Label) -> Self {
        Entity::Label(r)
    }
}

impl From<Genre> for Entity {
    fn from(r: Genre) -> Self {
        Entity::Genre(r)
    }
}

impl From<Key> for Entity {
    fn from(r: Key) -> Self {
        Entity::Key(r)
    }
}

// ==================== Row access ====================

fn select_sql<T: Record>() -> String {
    format!("SELECT {} FROM {}", T::COLUMNS.join(", "), T::TABLE.name())
}

/// Fetch one typed row by primary key
pub fn fetch<T: Record>(conn: &Connection, id: &str) -> Result<Option<T>> {
    let sql = format!("{} WHERE {} = ?1", select_sql::<T>(), T::TABLE.id_column());
    let row = conn.query_row(&sql, [id], |row| T::from_row(row)).optional()?;
    Ok(row)
}

/// Fetch every row of a typed table in storage order
pub fn fetch_all<T: Record>(conn: &Connection) -> Result<Vec<T>> {
    fetch_where(conn, "1 = 1 ORDER BY rowid", &[])
}

/// Fetch typed rows matching a SQL condition
pub fn fetch_where<T: Record>(conn: &Connection, condition: &str, params: &[Value]) -> Result<Vec<T>> {
    let sql = format!("{} WHERE {}", select_sql::<T>(), condition);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| T::from_row(row))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Insert a staged entity
pub(crate) fn insert_entity(conn: &Connection, entity: &Entity) -> rusqlite::Result<()> {
    let table = entity.table();
    let columns = table.columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        columns.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(entity.values()))?;
    Ok(())
}

/// Write one column of one row
pub(crate) fn update_column(
    conn: &Connection,
    table: Table,
    id: &str,
    column: &str,
    value: &Value,
) -> rusqlite::Result<usize> {
    let sql = format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        table.name(),
        column,
        table.id_column()
    );
    conn.execute(&sql, rusqlite::params![value, id])
}

/// Delete one row
pub(crate) fn delete_row(conn: &Connection, table: Table, id: &str) -> rusqlite::Result<usize> {
    let sql = format!("DELETE FROM {} WHERE {} = ?1", table.name(), table.id_column());
    conn.execute(&sql, [id])
}

/// Whether a table exists in the opened file
pub fn table_exists(conn: &Connection, table: Table) -> Result<bool> {
    let exists = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
        .exists([table.name()])?;
    Ok(exists)
}

// ==================== Timestamps ====================

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// Current time at the millisecond resolution the database stores
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Format a timestamp the way the host application writes it
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp
///
/// Accepts the offset form the host writes, the same without the space
/// before the offset, a naive form (taken as UTC) and a bare date.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f %:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// SQL codec for the host application's timestamp text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbDateTime(pub DateTime<Utc>);

impl FromSql for DbDateTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(bytes) => {
                let s = std::str::from_utf8(bytes).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                parse_timestamp(s)
                    .map(DbDateTime)
                    .ok_or_else(|| FromSqlError::Other(format!("invalid timestamp '{s}'").into()))
            }
            ValueRef::Integer(ms) => DateTime::from_timestamp_millis(ms)
                .map(DbDateTime)
                .ok_or(FromSqlError::OutOfRange(ms)),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl ToSql for DbDateTime {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(format_timestamp(&self.0)))
    }
}

/// Timestamp as a SQL value
pub fn timestamp_value(at: &DateTime<Utc>) -> Value {
    Value::Text(format_timestamp(at))
}
