//! Analysis file locations
//!
//! The host application stores the analysis files of each track under
//! `<share>/PIONEER/USBANLZ/<first 3 chars of UUID>/<rest of UUID>/`, as
//! `ANLZ0000.DAT`, `ANLZ0000.EXT` and `ANLZ0000.2EX`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::Content;

const ANLZ_ROOT: [&str; 2] = ["PIONEER", "USBANLZ"];
const SHARD_LEN: usize = 3;

/// Analysis files found for one track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnlzPaths {
    pub dat: Option<PathBuf>,
    pub ext: Option<PathBuf>,
    pub ex2: Option<PathBuf>,
}

impl AnlzPaths {
    pub fn is_empty(&self) -> bool {
        self.dat.is_none() && self.ext.is_none() && self.ex2.is_none()
    }
}

/// Analysis directory of a track
///
/// Derived from the track's UUID. Tracks without one fall back to the
/// directory of their recorded `AnalysisDataPath`.
pub fn anlz_dir(share_dir: &Path, content: &Content) -> Result<PathBuf> {
    if let Some(uuid) = content.uuid.as_deref().map(str::trim) {
        if uuid.len() > SHARD_LEN && uuid.is_char_boundary(SHARD_LEN) {
            let (outer, inner) = uuid.split_at(SHARD_LEN);
            let mut dir = share_dir.to_path_buf();
            dir.extend(ANLZ_ROOT);
            return Ok(dir.join(outer).join(inner));
        }
    }

    if let Some(recorded) = content.analysis_data_path.as_deref() {
        let relative = Path::new(recorded.trim_start_matches(['/', '\\']));
        if let Some(parent) = relative.parent().filter(|p| !p.as_os_str().is_empty()) {
            return Ok(share_dir.join(parent));
        }
    }

    Err(Error::validation(format!(
        "content {} has no UUID or analysis path",
        content.id
    )))
}

/// Analysis files present in a track's analysis directory
pub fn anlz_paths(share_dir: &Path, content: &Content) -> Result<AnlzPaths> {
    let dir = anlz_dir(share_dir, content)?;
    let mut paths = AnlzPaths::default();
    if !dir.is_dir() {
        return Ok(paths);
    }

    let entries = fs::read_dir(&dir).map_err(|e| Error::from_io_read(e, dir.clone()))?;
    for entry in entries {
        let path = entry.map_err(|e| Error::from_io_read(e, dir.clone()))?.path();
        let is_anlz = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with("ANLZ"));
        if !is_anlz {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_uppercase());
        match ext.as_deref() {
            Some("DAT") => paths.dat = Some(path),
            Some("EXT") => paths.ext = Some(path),
            Some("2EX") => paths.ex2 = Some(path),
            _ => {}
        }
    }

    Ok(paths)
}
