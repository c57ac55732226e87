//! Playlist engine
//!
//! Membership rows (`djmdSongPlaylist`) carry a 1-based `TrackNo` that stays
//! contiguous within each playlist. Every operation here stages its row
//! changes on a [`UnitOfWork`], refreshes the playlist's `updated_at`,
//! stages the matching mirror change and stamps the changed rows with one
//! [`UnitOfWork::autoincrement_usn`] call. Arguments are validated before
//! anything is staged.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{now, timestamp_value, Record, Table};
use crate::error::{Error, Result};
use crate::mirror::MirrorChange;
use crate::models::{Content, Playlist, PlaylistKind, SongPlaylist, ROOT_PLAYLIST_ID};
use crate::unit_of_work::{Change, UnitOfWork};

const ID_MASK: u128 = 0x0FFF_FFFF;

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Fetch a playlist that can hold songs
fn require_song_list(uow: &mut UnitOfWork<'_>, playlist_id: &str) -> Result<Playlist> {
    let playlist: Playlist = uow.require(playlist_id)?;
    if playlist.kind() != Some(PlaylistKind::Playlist) {
        return Err(Error::validation(format!(
            "playlist {} has attribute {} and cannot hold songs",
            playlist_id, playlist.attribute
        )));
    }
    Ok(playlist)
}

/// Songs of a playlist ordered by track number
pub fn songs(uow: &mut UnitOfWork<'_>, playlist_id: &str) -> Result<Vec<SongPlaylist>> {
    uow.select("PlaylistID = ?1 ORDER BY TrackNo", &[text(playlist_id)])
}

fn children(uow: &mut UnitOfWork<'_>, parent_id: &str) -> Result<Vec<Playlist>> {
    uow.select("ParentID = ?1 ORDER BY Seq", &[text(parent_id)])
}

/// A random 28-bit numeric ID not used in `table` or staged for insertion
fn unused_id(uow: &UnitOfWork<'_>, table: Table) -> Result<String> {
    let sql = format!("SELECT 1 FROM {} WHERE {} = ?1", table.name(), table.id_column());
    loop {
        let candidate = (Uuid::new_v4().as_u128() & ID_MASK).to_string();
        if candidate == "0" {
            continue;
        }
        let staged = uow
            .changes()
            .iter()
            .any(|c| matches!(c, Change::Insert(_)) && c.table() == table && c.id() == candidate);
        if staged {
            continue;
        }
        if !uow.connection().prepare_cached(&sql)?.exists([&candidate])? {
            return Ok(candidate);
        }
    }
}

fn set_track_no(uow: &mut UnitOfWork<'_>, song: &SongPlaylist, track_no: i64, at: &DateTime<Utc>) -> Result<()> {
    uow.update(Table::SongPlaylist, song.id.as_str(), "TrackNo", track_no)?;
    uow.update(Table::SongPlaylist, song.id.as_str(), "updated_at", timestamp_value(at))
}

/// Refresh a playlist's `updated_at` and stage the mirror timestamp
fn touch(uow: &mut UnitOfWork<'_>, playlist_id: &str, at: DateTime<Utc>) -> Result<()> {
    uow.update(Table::Playlist, playlist_id, "updated_at", timestamp_value(&at))?;
    uow.stage_mirror(MirrorChange::Touch {
        playlist_id: playlist_id.to_string(),
        at,
    });
    Ok(())
}

fn reload<T: Record>(uow: &mut UnitOfWork<'_>, id: &str) -> Result<T> {
    uow.flush()?;
    uow.require(id)
}

/// Add a track to a playlist
///
/// Without `track_no` the song is appended. With it, the position must lie
/// in `1..=count + 1` and the songs at or after it move down by one.
pub fn add_to_playlist(
    uow: &mut UnitOfWork<'_>,
    playlist_id: &str,
    content_id: &str,
    track_no: Option<i64>,
) -> Result<SongPlaylist> {
    require_song_list(uow, playlist_id)?;
    uow.require::<Content>(content_id)?;

    let existing = songs(uow, playlist_id)?;
    let count = existing.len() as i64;
    let position = match track_no {
        None => count + 1,
        Some(n) if (1..=count + 1).contains(&n) => n,
        Some(n) => {
            return Err(Error::validation(format!(
                "track_no {n} out of range 1..={} for playlist {playlist_id}",
                count + 1
            )))
        }
    };

    let at = now();
    for song in existing.iter().filter(|s| s.track_no >= position) {
        set_track_no(uow, song, song.track_no + 1, &at)?;
    }

    let id = unused_id(uow, Table::SongPlaylist)?;
    uow.insert(SongPlaylist::new(id.as_str(), playlist_id, content_id, position, at));
    touch(uow, playlist_id, at)?;
    uow.autoincrement_usn()?;

    debug!("Added content {} to playlist {} at {}", content_id, playlist_id, position);
    reload(uow, &id)
}

/// Remove a song from a playlist and close the gap it leaves
pub fn remove_from_playlist(uow: &mut UnitOfWork<'_>, playlist_id: &str, song_id: &str) -> Result<()> {
    require_song_list(uow, playlist_id)?;

    let existing = songs(uow, playlist_id)?;
    let removed = existing
        .iter()
        .find(|s| s.id == song_id)
        .ok_or_else(|| Error::not_found("Song", song_id))?
        .track_no;

    let at = now();
    uow.delete(Table::SongPlaylist, song_id);
    for song in existing.iter().filter(|s| s.track_no > removed) {
        set_track_no(uow, song, song.track_no - 1, &at)?;
    }
    touch(uow, playlist_id, at)?;
    uow.autoincrement_usn()?;

    debug!("Removed song {} from playlist {}", song_id, playlist_id);
    Ok(())
}

/// Move a song to another position in the same playlist
pub fn move_song(
    uow: &mut UnitOfWork<'_>,
    playlist_id: &str,
    song_id: &str,
    track_no: i64,
) -> Result<SongPlaylist> {
    require_song_list(uow, playlist_id)?;

    let existing = songs(uow, playlist_id)?;
    let count = existing.len() as i64;
    let song = existing
        .iter()
        .find(|s| s.id == song_id)
        .ok_or_else(|| Error::not_found("Song", song_id))?
        .clone();
    if !(1..=count).contains(&track_no) {
        return Err(Error::validation(format!(
            "track_no {track_no} out of range 1..={count} for playlist {playlist_id}"
        )));
    }

    let old = song.track_no;
    if old == track_no {
        return Ok(song);
    }

    let at = now();
    for other in existing.iter().filter(|s| s.id != song.id) {
        let t = other.track_no;
        if track_no < old && (track_no..old).contains(&t) {
            set_track_no(uow, other, t + 1, &at)?;
        } else if track_no > old && (old + 1..=track_no).contains(&t) {
            set_track_no(uow, other, t - 1, &at)?;
        }
    }
    set_track_no(uow, &song, track_no, &at)?;
    touch(uow, playlist_id, at)?;
    uow.autoincrement_usn()?;

    debug!("Moved song {} in playlist {} from {} to {}", song_id, playlist_id, old, track_no);
    reload(uow, song_id)
}

/// Create a playlist or folder under `parent_id` (a folder or the root)
pub fn create_playlist(
    uow: &mut UnitOfWork<'_>,
    name: &str,
    parent_id: &str,
    kind: PlaylistKind,
) -> Result<Playlist> {
    if name.trim().is_empty() {
        return Err(Error::validation("playlist name must not be empty"));
    }
    if kind == PlaylistKind::SmartPlaylist {
        return Err(Error::validation("smart playlists cannot be created"));
    }
    if parent_id != ROOT_PLAYLIST_ID {
        let parent: Playlist = uow.require(parent_id)?;
        if !parent.is_folder() {
            return Err(Error::validation(format!(
                "parent {parent_id} is not a playlist folder"
            )));
        }
    }

    let seq = children(uow, parent_id)?.len() as i64 + 1;
    let id = unused_id(uow, Table::Playlist)?;
    let playlist = Playlist::new(id.as_str(), name, kind, parent_id, seq);

    uow.stage_mirror(MirrorChange::Add {
        playlist_id: id.clone(),
        parent_id: parent_id.to_string(),
        attribute: playlist.attribute,
        at: playlist.updated_at,
    });
    uow.insert(playlist);
    uow.autoincrement_usn()?;

    info!("Created {:?} '{}' ({}) under {}", kind, name, id, parent_id);
    reload(uow, &id)
}

/// Rename a playlist or folder
pub fn rename_playlist(uow: &mut UnitOfWork<'_>, playlist_id: &str, name: &str) -> Result<Playlist> {
    if name.trim().is_empty() {
        return Err(Error::validation("playlist name must not be empty"));
    }
    uow.require::<Playlist>(playlist_id)?;

    uow.update(Table::Playlist, playlist_id, "Name", name.to_string())?;
    touch(uow, playlist_id, now())?;
    uow.autoincrement_usn()?;

    reload(uow, playlist_id)
}

/// Delete a playlist with its songs, and a folder with everything below it
///
/// Returns the IDs of every deleted playlist.
pub fn delete_playlist(uow: &mut UnitOfWork<'_>, playlist_id: &str) -> Result<Vec<String>> {
    let target: Playlist = uow.require(playlist_id)?;

    let mut deleted = Vec::new();
    let mut queue = vec![target.clone()];
    while let Some(playlist) = queue.pop() {
        if playlist.is_folder() {
            queue.extend(children(uow, &playlist.id)?);
        }
        for song in songs(uow, &playlist.id)? {
            uow.delete(Table::SongPlaylist, song.id);
        }
        uow.delete(Table::Playlist, playlist.id.as_str());
        uow.stage_mirror(MirrorChange::Remove {
            playlist_id: playlist.id.clone(),
        });
        deleted.push(playlist.id);
    }

    let at = now();
    if let Some(seq) = target.seq {
        let siblings = children(uow, &target.parent_id)?;
        for sibling in siblings.iter().filter(|s| s.id != target.id) {
            if let Some(s) = sibling.seq.filter(|s| *s > seq) {
                uow.update(Table::Playlist, sibling.id.as_str(), "Seq", s - 1)?;
                touch(uow, &sibling.id, at)?;
            }
        }
    }
    uow.autoincrement_usn()?;

    info!("Deleted {} playlists starting at {}", deleted.len(), playlist_id);
    Ok(deleted)
}
