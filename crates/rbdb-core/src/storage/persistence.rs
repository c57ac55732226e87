//! Sidecar file persistence
//!
//! Files written next to the database (the playlist mirror, the unlock
//! cache stamp) go through [`atomic_write`] so readers never observe a
//! partially-written file. [`FileBackup`] keeps the previous contents of a
//! replaced file until the surrounding unit of work has committed.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent.to_path_buf()))?;
    }

    let temp_path = temp_path_for(path);

    let mut file = File::create(&temp_path).map_err(|e| Error::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| Error::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| Error::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::from_io(e, path.to_path_buf())
    })?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Previous contents of a file replaced during a unit of work
///
/// Dropping an armed backup puts the old contents back; call
/// [`FileBackup::release`] once the replacement is final.
#[derive(Debug)]
pub struct FileBackup {
    path: PathBuf,
    previous: Option<Vec<u8>>,
    armed: bool,
}

impl FileBackup {
    /// Atomically replace `path` with `data`, remembering what was there
    pub fn replace(path: &Path, data: &[u8]) -> Result<Self> {
        let previous = if path.exists() {
            Some(fs::read(path).map_err(|e| Error::from_io_read(e, path.to_path_buf()))?)
        } else {
            None
        };

        atomic_write(path, data)?;

        Ok(Self {
            path: path.to_path_buf(),
            previous,
            armed: true,
        })
    }

    /// Keep the new contents
    pub fn release(mut self) {
        self.armed = false;
    }

    /// Put the previous contents back
    pub fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.put_back()
    }

    fn put_back(&self) -> Result<()> {
        match self.previous {
            Some(ref bytes) => atomic_write(&self.path, bytes),
            None => fs::remove_file(&self.path).map_err(|e| Error::from_io(e, self.path.clone())),
        }
    }
}

impl Drop for FileBackup {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.put_back() {
                warn!("Failed to restore {:?}: {}", self.path, e);
            }
        }
    }
}
