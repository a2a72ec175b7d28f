//! Shared plumbing for the on-disk artifacts: bincode encoding and
//! write-then-rename publication.
//!
//! Files are staged as temporary siblings of their destination and only
//! renamed into place once fully written and synced, so a reader never sees a
//! half-written artifact.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;

use crate::error::{RecommendError, Result};

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| RecommendError::Io(std::io::Error::other(e.to_string())))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<T> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| RecommendError::corrupt(path, format!("undecodable: {e}")))?;
    if read != bytes.len() {
        return Err(RecommendError::corrupt(
            path,
            format!("{} trailing bytes", bytes.len() - read),
        ));
    }
    Ok(value)
}

/// A fully written temporary file waiting to be renamed onto `target`.
pub(crate) struct Staged {
    file: NamedTempFile,
    target: PathBuf,
}

impl Staged {
    pub(crate) fn publish(self) -> Result<()> {
        self.file
            .persist(&self.target)
            .map_err(|e| RecommendError::Io(e.error))?;
        Ok(())
    }
}

/// Write `bytes` next to `target` without touching `target` itself.
pub(crate) fn stage(target: &Path, bytes: &[u8]) -> Result<Staged> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut file = NamedTempFile::new_in(&dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;

    Ok(Staged {
        file,
        target: target.to_path_buf(),
    })
}

pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    stage(target, bytes)?.publish()
}
