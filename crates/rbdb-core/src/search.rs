//! Track search
//!
//! Case-insensitive substring search over track titles and the names of
//! the linked artist, album and label. Title matches rank first, then
//! artist, album and label matches; tracks of equal rank keep storage order.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::catalog::{fetch_all, Record};
use crate::error::Result;
use crate::models::{Album, Artist, Content, Label};

/// Which field of a track matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchField {
    Title,
    Artist,
    Album,
    Label,
}

fn names<T, F>(conn: &Connection, name: F) -> Result<HashMap<String, String>>
where
    T: Record,
    F: Fn(&T) -> Option<&str>,
{
    Ok(fetch_all::<T>(conn)?
        .iter()
        .filter_map(|row| name(row).map(|n| (row.id().to_string(), n.to_lowercase())))
        .collect())
}

fn linked_matches(names: &HashMap<String, String>, id: Option<&String>, needle: &str) -> bool {
    id.and_then(|id| names.get(id))
        .is_some_and(|name| name.contains(needle))
}

/// Find tracks matching `query`, best matches first
///
/// A blank query matches nothing.
pub fn search_content(conn: &Connection, query: &str) -> Result<Vec<Content>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let artists = names::<Artist, _>(conn, |a| a.name.as_deref())?;
    let albums = names::<Album, _>(conn, |a| a.name.as_deref())?;
    let labels = names::<Label, _>(conn, |l| l.name.as_deref())?;

    let mut hits: Vec<(MatchField, Content)> = fetch_all::<Content>(conn)?
        .into_iter()
        .filter_map(|content| {
            let field = if content.title_str().to_lowercase().contains(&needle) {
                MatchField::Title
            } else if linked_matches(&artists, content.artist_id.as_ref(), &needle) {
                MatchField::Artist
            } else if linked_matches(&albums, content.album_id.as_ref(), &needle) {
                MatchField::Album
            } else if linked_matches(&labels, content.label_id.as_ref(), &needle) {
                MatchField::Label
            } else {
                return None;
            };
            Some((field, content))
        })
        .collect();

    // stable: ties keep storage order
    hits.sort_by_key(|(field, _)| *field);
    Ok(hits.into_iter().map(|(_, content)| content).collect())
}
