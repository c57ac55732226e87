//! Small on-disk library for tests

use std::path::{Path, PathBuf};

use crate::catalog::{self, Entity};
use crate::database::{Database, OpenOptions};
use crate::mirror::{PlaylistMirror, MIRROR_FILE_NAME};
use crate::models::{
    Album, Artist, Content, Genre, Key, Label, Playlist, PlaylistKind, ROOT_PLAYLIST_ID,
};
use crate::storage::persistence::atomic_write;

pub const TRACK_1: &str = "178162577";
pub const TRACK_2: &str = "66382436";
pub const NOISE_TRACK: &str = "24401986";
pub const SINE_TRACK: &str = "181094952";

/// Empty playlist at the root
pub const PLAYLIST: &str = "2602250856";
/// Folder at the root holding `NESTED`
pub const FOLDER: &str = "412039287";
/// Empty playlist inside `FOLDER`
pub const NESTED: &str = "3390154218";
pub const SMART: &str = "1200498773";

pub const TRACK_1_UUID: &str = "735e8b81-e69b-41ad-80f8-9c0d7613b96d";

fn track(id: &str, title: &str, artist: &str, label: &str) -> Content {
    let mut content = Content::new(id, title);
    content.artist_id = Some(artist.to_string());
    content.label_id = Some(label.to_string());
    content
}

fn rows() -> Vec<Entity> {
    let mut track_1 = track(TRACK_1, "Demo Track 1", "100", "201");
    track_1.uuid = Some(TRACK_1_UUID.to_string());
    track_1.genre_id = Some("400".to_string());
    track_1.key_id = Some("500".to_string());
    track_1.bpm = Some(12800);
    track_1.analysis_data_path =
        Some(format!("/PIONEER/USBANLZ/735/{}/ANLZ0000.DAT", &TRACK_1_UUID[3..]));

    let mut noise = track(NOISE_TRACK, "White Noise", "101", "201");
    noise.album_id = Some("300".to_string());

    vec![
        Artist::new("100", "Loopmasters").into(),
        Artist::new("101", "Test Tones").into(),
        Label::new("200", "Loopmasters").into(),
        Label::new("201", "Signal Lab").into(),
        Album::new("300", "Demo Album").into(),
        Genre::new("400", "House").into(),
        Key::new("500", "Am", 1).into(),
        track_1.into(),
        track(TRACK_2, "Demo Track 2", "101", "200").into(),
        noise.into(),
        track(SINE_TRACK, "Sine Sweep", "101", "201").into(),
        Playlist::new(FOLDER, "Sets", PlaylistKind::Folder, ROOT_PLAYLIST_ID, 1).into(),
        Playlist::new(PLAYLIST, "Demo Playlist", PlaylistKind::Playlist, ROOT_PLAYLIST_ID, 2).into(),
        Playlist::new(NESTED, "Warmup", PlaylistKind::Playlist, FOLDER, 1).into(),
        Playlist::new(SMART, "Smart", PlaylistKind::SmartPlaylist, ROOT_PLAYLIST_ID, 3).into(),
    ]
}

/// Write the library and its mirror into `dir`, returning the database path
pub fn create_library(dir: &Path) -> PathBuf {
    let path = dir.join("master.db");
    let db = Database::create(&path).unwrap();

    let mut mirror = PlaylistMirror::load(dir.join(MIRROR_FILE_NAME)).unwrap();
    for entity in rows() {
        catalog::insert_entity(db.connection(), &entity).unwrap();
        if let Entity::Playlist(p) = entity {
            mirror.add(&p.id, &p.parent_id, p.attribute, p.updated_at).unwrap();
        }
    }
    atomic_write(mirror.path(), mirror.to_xml().unwrap().as_bytes()).unwrap();

    db.close().unwrap();
    path
}

/// Create the library in `dir` and open it
pub fn open_library(dir: &Path) -> Database {
    Database::open(create_library(dir), OpenOptions::default()).unwrap()
}
