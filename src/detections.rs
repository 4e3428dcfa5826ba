//! Detections manifest: the detector's output, one entry per image.
//!
//! Person detection runs outside this tool. It writes a JSON document that
//! lists each image with its pixel size and the boxes it found:
//!
//! ```json
//! {
//!   "images": [
//!     {
//!       "path": "shoot/IMG_0001.CR3",
//!       "width": 6000,
//!       "height": 4000,
//!       "detections": [
//!         { "box": [0.41, 0.22, 0.58, 0.93], "confidence": 0.91, "label": "person" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Boxes are `[left, top, right, bottom]`, normalized to the image size.
//! Relative paths resolve against the manifest's own directory. Every box and
//! confidence is validated on load; a single bad value rejects the manifest.
//! Two entries resolving to the same path are rejected too, so every sidecar
//! is written by exactly one work item.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::geometry::{Detection, DetectionRecord, Dimensions, InvalidInput};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}: {source}", image.display())]
    Invalid { image: PathBuf, source: InvalidInput },
    #[error("{} is listed more than once", .0.display())]
    DuplicateImage(PathBuf),
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    images: Vec<RawImage>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    path: PathBuf,
    width: u32,
    height: u32,
    #[serde(default)]
    detections: Vec<DetectionRecord>,
}

/// One image and everything the detector found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    /// Resolved image path.
    pub path: PathBuf,
    pub dimensions: Dimensions,
    /// In detector order. Order matters: selection ties go to the earlier one.
    pub detections: Vec<Detection>,
}

impl ImageEntry {
    /// Detections at or above `min_confidence`, order preserved.
    pub fn candidates(&self, min_confidence: f64) -> Vec<Detection> {
        self.detections
            .iter()
            .filter(|d| d.confidence() >= min_confidence)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionManifest {
    pub images: Vec<ImageEntry>,
}

impl DetectionManifest {
    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or(Path::new(""));
        Self::from_json(&content, base_dir)
    }

    /// Parse a manifest, resolving relative image paths against `base_dir`.
    pub fn from_json(json: &str, base_dir: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(json)?;
        let mut seen = HashSet::new();
        let mut images = Vec::with_capacity(raw.images.len());

        for entry in raw.images {
            let path = if entry.path.is_absolute() {
                entry.path
            } else {
                base_dir.join(entry.path)
            };
            let invalid = |source| ManifestError::Invalid {
                image: path.clone(),
                source,
            };

            let dimensions = Dimensions::new(entry.width, entry.height).map_err(invalid)?;
            let detections = entry
                .detections
                .into_iter()
                .map(Detection::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?;

            if !seen.insert(path.clone()) {
                return Err(ManifestError::DuplicateImage(path));
            }
            images.push(ImageEntry {
                path,
                dimensions,
                detections,
            });
        }

        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
