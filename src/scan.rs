//! Shoot directory scanning.
//!
//! Walks a directory tree for images this tool can write sidecars for and
//! reports, for each one, what its sidecar currently holds. It never writes.
//!
//! ```text
//! shoot/
//! ├── IMG_0001.CR3
//! ├── IMG_0001.CR3.xmp      # Crop(..) or NoCrop
//! ├── IMG_0002.CR3          # Missing
//! └── day2/
//!     ├── DSC_0100.NEF
//!     └── DSC_0100.NEF.xmp  # Unreadable(..) if malformed
//! ```
//!
//! Extensions are matched case-insensitively. Symlinks are not followed.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::geometry::CropRegion;
use crate::sidecar::{self, SidecarError};

/// Image extensions that get sidecars: common raster formats and camera raws.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "dng", "cr2", "cr3", "nef", "arw", "raf",
];

/// Deepest directory level visited below the root.
const MAX_DEPTH: usize = 10;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {0}")]
    NotFound(PathBuf),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// What an image's sidecar says about its crop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SidecarStatus {
    /// No sidecar file.
    Missing,
    /// A sidecar without a crop (or with `HasCrop` false).
    NoCrop,
    Crop { region: CropRegion },
    /// The sidecar exists but cannot be read or parsed.
    Unreadable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedImage {
    pub path: PathBuf,
    pub sidecar: PathBuf,
    pub status: SidecarStatus,
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Read the sidecar next to `image` and report its crop.
pub fn inspect_sidecar(image: &Path) -> SidecarStatus {
    let path = sidecar::sidecar_path(image);
    if !path.exists() {
        return SidecarStatus::Missing;
    }
    match sidecar::load(&path) {
        Ok(doc) => match doc.crop() {
            Some(region) => SidecarStatus::Crop { region },
            None => SidecarStatus::NoCrop,
        },
        Err(SidecarError::Parse { message, .. }) => SidecarStatus::Unreadable { reason: message },
        Err(e) => SidecarStatus::Unreadable {
            reason: e.to_string(),
        },
    }
}

/// Sidecar path and status for one image.
pub fn inspect(image: &Path) -> ScannedImage {
    ScannedImage {
        path: image.to_path_buf(),
        sidecar: sidecar::sidecar_path(image),
        status: inspect_sidecar(image),
    }
}

/// Find every supported image under `root`, sorted by path.
pub fn scan(root: &Path) -> Result<Vec<ScannedImage>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotFound(root.to_path_buf()));
    }

    let mut images = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .max_depth(MAX_DEPTH)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && is_supported_image(path) {
            images.push(inspect(path));
        }
    }

    Ok(images)
}
