//! Batch pipeline: detections manifest in, sidecars out.
//!
//! For every image in the manifest:
//!
//! ```text
//! detections ─filter─▶ candidates ─select─▶ subject ─calculate─▶ crop
//!                                                                  │
//!            sidecar ◀──save── merged ◀──merge── loaded ◀──load────┘
//! ```
//!
//! With `dry_run` the pipeline stops after `calculate`: nothing is read from
//! or written to disk.
//!
//! ## Statuses
//!
//! | Status      | Meaning                                                  |
//! |-------------|----------------------------------------------------------|
//! | `Written`   | Sidecar saved (possibly with a centered fallback crop)   |
//! | `DryRun`    | Crop computed, nothing written                           |
//! | `NoSubject` | No detection above the confidence threshold              |
//! | `Failed`    | Sidecar could not be read, parsed or written             |
//!
//! A failure is confined to its image; the rest of the batch continues.
//!
//! ## Parallel Processing
//!
//! Images are processed in parallel using [rayon](https://docs.rs/rayon).
//! Before the parallel step every entry is assigned its destination sidecar.
//! An entry whose destination was already claimed by an earlier one (two
//! `IMG_1.jpg` from different folders with `output_dir` set) is `Failed`
//! without being processed, so no two workers ever save the same path.
//! Progress events are streamed in completion order; the returned report is
//! in manifest order.

use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, CropperConfig};
use crate::crop::{CropOutcome, CropSettings, calculate_centered};
use crate::detections::{DetectionManifest, ImageEntry, ManifestError};
use crate::geometry::{Detection, InvalidInput};
use crate::select::{SelectionPolicy, select};
use crate::sidecar::{self, SidecarError};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Detections manifest: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Config: {0}")]
    Config(#[from] ConfigError),
    #[error("Sidecar: {0}")]
    Sidecar(#[from] SidecarError),
    #[error("Crop geometry: {0}")]
    Geometry(#[from] InvalidInput),
    #[error("{} is also the sidecar for {}", sidecar.display(), first.display())]
    DuplicateDestination { sidecar: PathBuf, first: PathBuf },
}

/// Everything the pipeline needs to know, resolved from config and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSettings {
    pub crop: CropSettings,
    pub strategy: SelectionPolicy,
    pub min_confidence: f64,
    pub center_fallback: bool,
    pub backup: bool,
    pub output_dir: Option<PathBuf>,
    pub dry_run: bool,
}

impl ProcessSettings {
    pub fn from_config(config: &CropperConfig, dry_run: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            crop: config.crop_settings()?,
            strategy: config.crop.strategy,
            min_confidence: config.detection.min_confidence,
            center_fallback: config.crop.center_fallback,
            backup: config.sidecar.backup,
            output_dir: config.sidecar.output_dir.clone(),
            dry_run,
        })
    }

    /// Where the sidecar for `image` is written.
    pub fn destination(&self, image: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => sidecar::sidecar_path_in(image, dir),
            None => sidecar::sidecar_path(image),
        }
    }
}

/// Per-image result.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageStatus {
    Written {
        sidecar: PathBuf,
        backup: Option<PathBuf>,
    },
    DryRun,
    NoSubject,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    /// 1-based position in the manifest.
    pub index: usize,
    pub image: PathBuf,
    /// The detection the crop was built around. `None` with a crop present
    /// means the centered fallback was used.
    pub subject: Option<Detection>,
    pub crop: Option<CropOutcome>,
    pub status: ImageStatus,
}

/// Progress events streamed while the batch runs.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started { image_count: usize, dry_run: bool },
    ImageProcessed(ImageOutcome),
}

/// Tally of statuses across a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub written: usize,
    pub dry_run: usize,
    pub no_subject: usize,
    pub failed: usize,
    /// Crops that missed the target aspect. Overlaps the other counts.
    pub aspect_unsatisfied: usize,
}

impl StatusCounts {
    fn record(&mut self, outcome: &ImageOutcome) {
        match outcome.status {
            ImageStatus::Written { .. } => self.written += 1,
            ImageStatus::DryRun => self.dry_run += 1,
            ImageStatus::NoSubject => self.no_subject += 1,
            ImageStatus::Failed(_) => self.failed += 1,
        }
        if outcome.crop.is_some_and(|c| !c.aspect_satisfied) {
            self.aspect_unsatisfied += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.dry_run + self.no_subject + self.failed
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run > 0 {
            write!(f, "{} dry run, ", self.dry_run)?;
        }
        write!(
            f,
            "{} written, {} no subject, {} failed",
            self.written, self.no_subject, self.failed
        )?;
        if self.aspect_unsatisfied > 0 {
            write!(f, " ({} off-aspect)", self.aspect_unsatisfied)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    /// In manifest order.
    pub outcomes: Vec<ImageOutcome>,
    pub counts: StatusCounts,
}

/// Load a detections manifest from disk and process it.
pub fn process_file(
    manifest_path: &Path,
    settings: &ProcessSettings,
    events: Option<Sender<ProcessEvent>>,
) -> Result<ProcessReport, ProcessError> {
    let manifest = DetectionManifest::load(manifest_path)?;
    Ok(process(&manifest, settings, events))
}

/// Process every image in `manifest` in parallel.
///
/// Individual failures are reported per image, never as an `Err`.
pub fn process(
    manifest: &DetectionManifest,
    settings: &ProcessSettings,
    events: Option<Sender<ProcessEvent>>,
) -> ProcessReport {
    if let Some(tx) = &events {
        tx.send(ProcessEvent::Started {
            image_count: manifest.len(),
            dry_run: settings.dry_run,
        })
        .ok();
    }

    let conflicts = destination_conflicts(manifest, settings);
    let outcomes: Vec<ImageOutcome> = manifest
        .images
        .par_iter()
        .zip(conflicts.par_iter())
        .enumerate()
        .map(|(i, (entry, conflict))| {
            let outcome = match conflict {
                Some(first) => ImageOutcome {
                    index: i + 1,
                    image: entry.path.clone(),
                    subject: None,
                    crop: None,
                    status: fail(
                        &entry.path,
                        ProcessError::DuplicateDestination {
                            sidecar: settings.destination(&entry.path),
                            first: first.clone(),
                        },
                    ),
                },
                None => process_image(i + 1, entry, settings),
            };
            if let Some(tx) = &events {
                tx.send(ProcessEvent::ImageProcessed(outcome.clone())).ok();
            }
            outcome
        })
        .collect();

    let mut counts = StatusCounts::default();
    for outcome in &outcomes {
        counts.record(outcome);
    }
    ProcessReport { outcomes, counts }
}

/// For each entry, the earlier image whose sidecar lands on the same path.
fn destination_conflicts(
    manifest: &DetectionManifest,
    settings: &ProcessSettings,
) -> Vec<Option<PathBuf>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    manifest
        .images
        .iter()
        .map(|entry| match claimed.entry(settings.destination(&entry.path)) {
            Entry::Occupied(first) => Some(first.get().to_path_buf()),
            Entry::Vacant(slot) => {
                slot.insert(&entry.path);
                None
            }
        })
        .collect()
}

/// Run the full pipeline for a single image.
pub fn process_image(index: usize, entry: &ImageEntry, settings: &ProcessSettings) -> ImageOutcome {
    let mut outcome = ImageOutcome {
        index,
        image: entry.path.clone(),
        subject: None,
        crop: None,
        status: ImageStatus::NoSubject,
    };

    let candidates = entry.candidates(settings.min_confidence);
    let crop = match select(&candidates, settings.strategy) {
        Some(subject) => {
            debug!(
                image = %entry.path.display(),
                candidates = candidates.len(),
                confidence = subject.confidence(),
                strategy = %settings.strategy,
                "selected subject"
            );
            outcome.subject = Some(subject.clone());
            settings.crop.crop(entry.dimensions, subject)
        }
        None if settings.center_fallback => {
            debug!(image = %entry.path.display(), "no subject, using centered crop");
            calculate_centered(
                entry.dimensions.width,
                entry.dimensions.height,
                settings.crop.aspect.value(),
            )
        }
        None => {
            debug!(
                image = %entry.path.display(),
                detections = entry.detections.len(),
                "no subject above confidence threshold"
            );
            return outcome;
        }
    };

    let crop = match crop {
        Ok(crop) => crop,
        Err(e) => {
            outcome.status = fail(&entry.path, ProcessError::from(e));
            return outcome;
        }
    };
    if !crop.aspect_satisfied {
        warn!(
            image = %entry.path.display(),
            target = %settings.crop.aspect,
            actual = crop.aspect_ratio(),
            "subject leaves no room for the target aspect ratio"
        );
    }
    outcome.crop = Some(crop);

    if settings.dry_run {
        outcome.status = ImageStatus::DryRun;
        return outcome;
    }

    outcome.status = match write_sidecar(&entry.path, &crop, settings) {
        Ok(saved) => ImageStatus::Written {
            sidecar: saved.path,
            backup: saved.backup,
        },
        Err(e) => fail(&entry.path, e),
    };
    outcome
}

/// Load the image's own sidecar, merge the crop, save to the destination.
fn write_sidecar(
    image: &Path,
    crop: &CropOutcome,
    settings: &ProcessSettings,
) -> Result<sidecar::Saved, ProcessError> {
    let document = sidecar::load(&sidecar::sidecar_path(image))?;
    let merged = sidecar::merge(&document, &crop.region);
    let saved = sidecar::save_with(&settings.destination(image), &merged, settings.backup)?;
    Ok(saved)
}

fn fail(image: &Path, error: ProcessError) -> ImageStatus {
    warn!(image = %image.display(), %error, "image failed");
    ImageStatus::Failed(error.to_string())
}
