//! # Subject Crop
//!
//! Subject-aware crops for landscape photographs, delivered as XMP sidecars
//! that Lightroom and Camera Raw apply non-destructively. No pixel is ever
//! decoded or written: the tool reads an external detector's boxes, picks the
//! subject, computes an aspect-correct rectangle around it, and merges that
//! rectangle into the image's sidecar without touching anything else in it.
//!
//! # Architecture: Detections In, Sidecars Out
//!
//! ```text
//! detections.json ──▶ select ──▶ crop ──▶ sidecar merge ──▶ IMG_0001.CR3.xmp
//!   (detector)       (policy)   (geometry)  (load/merge/save)
//! ```
//!
//! Each step is a plain function callable on its own. Only the last one
//! touches the filesystem, and it does so atomically with a backup.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`geometry`] | Validated value types: boxes, detections, crop regions |
//! | [`select`] | Choose one detection under a [`select::SelectionPolicy`] |
//! | [`crop`] | Pad, grow to the target aspect, clamp into the frame |
//! | [`sidecar`] | XMP sidecar load, byte-preserving crop merge, atomic save with backup |
//! | [`detections`] | JSON manifest of detector output |
//! | [`config`] | `subject-crop.toml` loading, preset layering, validation |
//! | [`presets`] | Shoot-type presets (wedding, sports, ...) |
//! | [`process`] | Parallel batch pipeline over a manifest |
//! | [`scan`] | Report the crops already stored under a directory |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! # Design Decisions
//!
//! ## Sidecars Are Edited, Not Regenerated
//!
//! A photographer's sidecar holds ratings, keywords and a full develop
//! history. The codec never re-serializes it: the crop fields are spliced into
//! the original text, so every other byte survives unchanged. Writing the same
//! crop twice produces the same file.
//!
//! ## Crop Coordinates
//!
//! Regions are normalized `[0, 1]` with a top-left origin, the same convention
//! Camera Raw uses for `crs:CropLeft`/`CropTop`/`CropRight`/`CropBottom`, so no
//! transform sits between [`crop`] and [`sidecar`]. Aspect ratios are visual
//! (pixel) ratios; image dimensions come from the manifest.
//!
//! ## Never Silently Wrong
//!
//! When the target aspect cannot be reached without cutting the subject, the
//! default clamp policy keeps the subject and reports
//! `aspect_satisfied = false` rather than returning a wrong rectangle quietly.

pub mod config;
pub mod crop;
pub mod detections;
pub mod geometry;
pub mod logging;
pub mod output;
pub mod presets;
pub mod process;
pub mod scan;
pub mod select;
pub mod sidecar;

#[cfg(test)]
pub(crate) mod test_helpers;
