//! Master playlist XML mirror
//!
//! The host application keeps a sidecar document next to the database with
//! one `NODE` per playlist. Its `Timestamp` attribute must equal the
//! playlist row's `updated_at` (milliseconds since the epoch), so every
//! playlist mutation rewrites the matching node as part of its commit.
//!
//! ```text
//! <MASTER_PLAYLIST Version="1.0.0" AutomaticSync="0">
//!   <PRODUCT Name="rekordbox" Version="6.0.0" Company="AlphaTheta"/>
//!   <PLAYLISTS>
//!     <NODE Id="9B1B3268" ParentId="0" Attributes="0" Timestamp="1675252205042" Lib_Type="0" CheckType="0"/>
//!   </PLAYLISTS>
//! </MASTER_PLAYLIST>
//! ```
//!
//! Only the entry set and `Timestamp` values are ever changed; everything
//! else in the document is carried through unchanged, attribute order
//! included.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use thiserror::Error;

use crate::models::ROOT_PLAYLIST_ID;

/// File name of the mirror, next to the database file
pub const MIRROR_FILE_NAME: &str = "masterPlaylists6.xml";

const ROOT_TAG: &str = "MASTER_PLAYLIST";
const PRODUCT_TAG: &str = "PRODUCT";
const PLAYLISTS_TAG: &str = "PLAYLISTS";
const NODE_TAG: &str = "NODE";

/// Errors reading or writing the mirror document
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML encoding error: {0}")]
    Encode(#[from] std::io::Error),

    #[error("Malformed playlist document: {0}")]
    Malformed(String),

    #[error("No mirror entry for playlist '{0}'")]
    MissingEntry(String),

    #[error("Playlist ID '{0}' is not numeric")]
    InvalidId(String),
}

/// Entry ID of a playlist: its numeric ID in upper-case hex
pub fn entry_id(playlist_id: &str) -> Result<String, MirrorError> {
    if playlist_id == ROOT_PLAYLIST_ID {
        return Ok("0".to_string());
    }
    playlist_id
        .trim()
        .parse::<u64>()
        .map(|n| format!("{n:X}"))
        .map_err(|_| MirrorError::InvalidId(playlist_id.to_string()))
}

/// One `NODE` of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    attributes: Vec<(String, String)>,
}

impl MirrorEntry {
    /// Attribute value by name
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.get("Id")
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.get("ParentId")
    }

    /// `Timestamp` as a UTC time
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get("Timestamp")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    /// All attributes in document order
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    fn set(&mut self, key: &str, value: String) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }
}

/// A staged change to the mirror, applied when a unit of work commits
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorChange {
    /// Rewrite an entry's timestamp
    Touch {
        playlist_id: String,
        at: DateTime<Utc>,
    },
    /// Add an entry for a new playlist
    Add {
        playlist_id: String,
        parent_id: String,
        attribute: i64,
        at: DateTime<Utc>,
    },
    /// Drop the entry of a deleted playlist
    Remove { playlist_id: String },
}

impl MirrorChange {
    pub fn apply(&self, mirror: &mut PlaylistMirror) -> Result<(), MirrorError> {
        match self {
            MirrorChange::Touch { playlist_id, at } => mirror.update_timestamp(playlist_id, *at),
            MirrorChange::Add {
                playlist_id,
                parent_id,
                attribute,
                at,
            } => mirror.add(playlist_id, parent_id, *attribute, *at),
            MirrorChange::Remove { playlist_id } => {
                mirror.remove(playlist_id)?;
                Ok(())
            }
        }
    }
}

/// In-memory copy of the mirror document
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistMirror {
    path: PathBuf,
    root: Vec<(String, String)>,
    product: Option<Vec<(String, String)>>,
    entries: Vec<MirrorEntry>,
}

impl PlaylistMirror {
    /// An empty document, as a new library starts with
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: vec![
                ("Version".to_string(), "1.0.0".to_string()),
                ("AutomaticSync".to_string(), "0".to_string()),
            ],
            product: Some(vec![
                ("Name".to_string(), "rekordbox".to_string()),
                ("Version".to_string(), "6.0.0".to_string()),
                ("Company".to_string(), "AlphaTheta".to_string()),
            ]),
            entries: Vec::new(),
        }
    }

    /// Load the document at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MirrorError> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)?;
        Self::parse(path, &xml)
    }

    /// Parse a document, remembering `path` for saving
    pub fn parse(path: impl Into<PathBuf>, xml: &str) -> Result<Self, MirrorError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut root: Option<Vec<(String, String)>> = None;
        let mut product = None;
        let mut entries = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    match tag.as_str() {
                        ROOT_TAG => root = Some(read_attributes(e)?),
                        PRODUCT_TAG => product = Some(read_attributes(e)?),
                        NODE_TAG => entries.push(MirrorEntry {
                            attributes: read_attributes(e)?,
                        }),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let root = root.ok_or_else(|| {
            MirrorError::Malformed(format!("missing <{ROOT_TAG}> element"))
        })?;

        Ok(Self {
            path: path.into(),
            root,
            product,
            entries,
        })
    }

    /// Where the document is saved
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[MirrorEntry] {
        &self.entries
    }

    /// Entry for a playlist, if present
    pub fn get(&self, playlist_id: &str) -> Option<&MirrorEntry> {
        let id = entry_id(playlist_id).ok()?;
        self.entries.iter().find(|e| e.id() == Some(id.as_str()))
    }

    /// Set an entry's `Timestamp` to `at` in milliseconds
    pub fn update_timestamp(&mut self, playlist_id: &str, at: DateTime<Utc>) -> Result<(), MirrorError> {
        let id = entry_id(playlist_id)?;
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id() == Some(id.as_str()))
            .ok_or_else(|| MirrorError::MissingEntry(playlist_id.to_string()))?;
        entry.set("Timestamp", at.timestamp_millis().to_string());
        Ok(())
    }

    /// Add an entry; an existing entry with the same ID is replaced
    pub fn add(
        &mut self,
        playlist_id: &str,
        parent_id: &str,
        attribute: i64,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorError> {
        let id = entry_id(playlist_id)?;
        let entry = MirrorEntry {
            attributes: vec![
                ("Id".to_string(), id.clone()),
                ("ParentId".to_string(), entry_id(parent_id)?),
                ("Attributes".to_string(), attribute.to_string()),
                ("Timestamp".to_string(), at.timestamp_millis().to_string()),
                ("Lib_Type".to_string(), "0".to_string()),
                ("CheckType".to_string(), "0".to_string()),
            ],
        };
        match self.entries.iter_mut().find(|e| e.id() == Some(id.as_str())) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(&mut self, playlist_id: &str) -> Result<bool, MirrorError> {
        let id = entry_id(playlist_id)?;
        let before = self.entries.len();
        self.entries.retain(|e| e.id() != Some(id.as_str()));
        Ok(self.entries.len() != before)
    }

    /// Serialize the document
    pub fn to_xml(&self) -> Result<String, MirrorError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new(ROOT_TAG);
        for (k, v) in &self.root {
            root.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Start(root))?;

        if let Some(ref attrs) = self.product {
            let mut product = BytesStart::new(PRODUCT_TAG);
            for (k, v) in attrs {
                product.push_attribute((k.as_str(), v.as_str()));
            }
            writer.write_event(Event::Empty(product))?;
        }

        writer.write_event(Event::Start(BytesStart::new(PLAYLISTS_TAG)))?;
        for entry in &self.entries {
            let mut node = BytesStart::new(NODE_TAG);
            for (k, v) in &entry.attributes {
                node.push_attribute((k.as_str(), v.as_str()));
            }
            writer.write_event(Event::Empty(node))?;
        }
        writer.write_event(Event::End(BytesEnd::new(PLAYLISTS_TAG)))?;
        writer.write_event(Event::End(BytesEnd::new(ROOT_TAG)))?;

        let bytes = writer.into_inner();
        String::from_utf8(bytes).map_err(|e| MirrorError::Malformed(e.to_string()))
    }
}

fn read_attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, MirrorError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        attrs.push((key, value));
    }
    Ok(attrs)
}
