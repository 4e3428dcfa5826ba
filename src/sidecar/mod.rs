//! XMP sidecar files: locate, load, merge a crop into, and save.
//!
//! Lightroom and Camera Raw read non-destructive edits from a `.xmp` file
//! next to the image (`IMG_0001.CR3` → `IMG_0001.CR3.xmp`). This module owns
//! that file's lifecycle:
//!
//! ```text
//! no file ──load──▶ template ──merge──▶ save ──▶ file
//! file ────load──▶ document ──merge──▶ save(.bak, then write) ──▶ file'
//! ```
//!
//! ## Guarantees
//!
//! - [`load`] never writes. A missing file is an empty template, a malformed
//!   one is [`SidecarError::Parse`]: an unreadable sidecar is never treated as
//!   empty and overwritten.
//! - [`SidecarDocument::merge`] changes only the crop fields. Every other byte
//!   of the packet is carried through verbatim.
//! - [`save`] copies an existing file to `<sidecar>.bak` before anything else,
//!   then writes the new packet to a temporary file in the same directory and
//!   renames it over the sidecar. A reader sees the old file or the new one,
//!   never a partial write. If the write fails the backup stays on disk.
//!
//! Saves are not synchronized: callers must not save the same path from two
//! threads at once.

mod xmp;

pub use xmp::{CRS_NAMESPACE, MalformedXmp, SidecarDocument};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::geometry::CropRegion;

pub const SIDECAR_EXTENSION: &str = "xmp";
pub const BACKUP_EXTENSION: &str = "bak";

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("{}: not a valid XMP sidecar: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("{}: failed to read sidecar: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("{}: failed to write sidecar: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Append `.{extension}` to the full file name, keeping the existing one.
fn with_appended_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Sidecar next to the image: `IMG_0001.CR3` → `IMG_0001.CR3.xmp`.
pub fn sidecar_path(image: &Path) -> PathBuf {
    with_appended_extension(image, SIDECAR_EXTENSION)
}

/// Sidecar for `image` placed in `dir` instead of next to the image.
pub fn sidecar_path_in(image: &Path, dir: &Path) -> PathBuf {
    match image.file_name() {
        Some(name) => with_appended_extension(&dir.join(name), SIDECAR_EXTENSION),
        None => sidecar_path(image),
    }
}

/// Backup written by [`save`]: `IMG_0001.CR3.xmp` → `IMG_0001.CR3.xmp.bak`.
pub fn backup_path(sidecar: &Path) -> PathBuf {
    with_appended_extension(sidecar, BACKUP_EXTENSION)
}

/// Read and parse the sidecar at `path`, or the empty template if there is
/// no file.
pub fn load(path: &Path) -> Result<SidecarDocument, SidecarError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no sidecar, starting from template");
            return Ok(SidecarDocument::template());
        }
        Err(source) => {
            return Err(SidecarError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let text = String::from_utf8(bytes).map_err(|e| SidecarError::Parse {
        path: path.to_path_buf(),
        message: format!("not UTF-8 ({e})"),
    })?;
    SidecarDocument::parse(text).map_err(|e| SidecarError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Pure crop merge; see [`SidecarDocument::merge`].
pub fn merge(document: &SidecarDocument, crop: &CropRegion) -> SidecarDocument {
    document.merge(crop)
}

/// What [`save_with`] did besides writing the sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saved {
    pub path: PathBuf,
    /// Set when an existing sidecar was copied aside first.
    pub backup: Option<PathBuf>,
}

/// Write `document` to `path`, backing up any existing file first.
pub fn save(path: &Path, document: &SidecarDocument) -> Result<Saved, SidecarError> {
    save_with(path, document, true)
}

/// Write `document` to `path` atomically. With `backup`, an existing file is
/// first copied to [`backup_path`], replacing any earlier backup.
pub fn save_with(
    path: &Path,
    document: &SidecarDocument,
    backup: bool,
) -> Result<Saved, SidecarError> {
    let write_error = |source: io::Error| SidecarError::Write {
        path: path.to_path_buf(),
        source,
    };

    let backup = if backup && path.is_file() {
        let bak = backup_path(path);
        fs::copy(path, &bak).map_err(write_error)?;
        info!(backup = %bak.display(), "backed up sidecar");
        Some(bak)
    } else {
        None
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_error)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
    tmp.write_all(document.as_str().as_bytes())
        .map_err(write_error)?;
    tmp.as_file().sync_all().map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;

    info!(path = %path.display(), "wrote sidecar");
    Ok(Saved {
        path: path.to_path_buf(),
        backup,
    })
}
