//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Each image leads with its positional index and file name. Everything
//! else (subject, crop, sidecar path, problems) follows as indented context
//! lines, so the output reads as a list of photos rather than a list of files.
//!
//! # Output Format
//!
//! ## Process
//!
//! ```text
//! Processing 3 images
//! 001 IMG_0001.CR3
//!     Subject: person (0.91)
//!     Crop: L=0.370 T=0.229 R=0.630 B=0.771
//!     Sidecar: shoot/IMG_0001.CR3.xmp (backup: IMG_0001.CR3.xmp.bak)
//! 002 IMG_0002.CR3
//!     No subject
//!
//! 1 written, 1 no subject, 0 failed
//! ```
//!
//! ## Scan / Show
//!
//! ```text
//! 001 IMG_0001.CR3
//!     Crop: L=0.370 T=0.229 R=0.630 B=0.771
//! 002 IMG_0002.CR3
//!     No sidecar
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use std::path::Path;

use crate::presets::SHOOT_PRESETS;
use crate::process::{ImageStatus, ProcessEvent, ProcessReport};
use crate::scan::{ScannedImage, SidecarStatus};
use crate::select::SelectionPolicy;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Header line for an image: index and file name.
fn image_line(index: usize, path: &Path) -> String {
    format!("{} {}", format_index(index), file_name(path))
}

fn status_line(status: &SidecarStatus) -> String {
    match status {
        SidecarStatus::Missing => "    No sidecar".to_string(),
        SidecarStatus::NoCrop => "    Sidecar has no crop".to_string(),
        SidecarStatus::Crop { region } => format!("    Crop: {}", region),
        SidecarStatus::Unreadable { reason } => format!("    Unreadable sidecar: {}", reason),
    }
}

// ============================================================================
// Process
// ============================================================================

/// Format a single process progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started {
            image_count,
            dry_run,
        } => {
            let suffix = if *dry_run { " (dry run)" } else { "" };
            vec![format!("Processing {} images{}", image_count, suffix)]
        }
        ProcessEvent::ImageProcessed(outcome) => {
            let mut lines = vec![image_line(outcome.index, &outcome.image)];

            match (&outcome.subject, &outcome.crop) {
                (Some(subject), _) => lines.push(format!(
                    "    Subject: {} ({:.2})",
                    subject.label(),
                    subject.confidence()
                )),
                (None, Some(_)) => lines.push("    Subject: none, centered crop".to_string()),
                (None, None) => {}
            }

            if let Some(crop) = &outcome.crop {
                lines.push(format!("    Crop: {}", crop.region));
                if !crop.aspect_satisfied {
                    lines.push(format!(
                        "    Aspect: {:.3} (target not reachable without cutting the subject)",
                        crop.aspect_ratio()
                    ));
                }
            }

            match &outcome.status {
                ImageStatus::Written { sidecar, backup } => match backup {
                    Some(bak) => lines.push(format!(
                        "    Sidecar: {} (backup: {})",
                        sidecar.display(),
                        file_name(bak)
                    )),
                    None => lines.push(format!("    Sidecar: {}", sidecar.display())),
                },
                ImageStatus::DryRun => lines.push("    Dry run: nothing written".to_string()),
                ImageStatus::NoSubject => lines.push("    No subject".to_string()),
                ImageStatus::Failed(message) => lines.push(format!("    Failed: {}", message)),
            }
            lines
        }
    }
}

/// Format the closing summary of a batch.
pub fn format_process_summary(report: &ProcessReport) -> Vec<String> {
    vec![String::new(), report.counts.to_string()]
}

pub fn print_process_summary(report: &ProcessReport) {
    for line in format_process_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Scan / Show
// ============================================================================

/// Format scanned images with their sidecar status.
pub fn format_scan_output(images: &[ScannedImage], root: &Path) -> Vec<String> {
    let mut lines = vec![format!("{} ({} images)", root.display(), images.len())];
    for (i, image) in images.iter().enumerate() {
        let relative = image.path.strip_prefix(root).unwrap_or(&image.path);
        lines.push(format!("{} {}", format_index(i + 1), relative.display()));
        lines.push(status_line(&image.status));
    }

    let cropped = images
        .iter()
        .filter(|i| matches!(i.status, SidecarStatus::Crop { .. }))
        .count();
    let missing = images
        .iter()
        .filter(|i| i.status == SidecarStatus::Missing)
        .count();
    lines.push(String::new());
    lines.push(format!(
        "{} with crop, {} without sidecar, {} other",
        cropped,
        missing,
        images.len() - cropped - missing
    ));
    lines
}

pub fn print_scan_output(images: &[ScannedImage], root: &Path) {
    for line in format_scan_output(images, root) {
        println!("{}", line);
    }
}

/// Format the stored crop of individually named images.
pub fn format_show_output(images: &[ScannedImage]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, image) in images.iter().enumerate() {
        lines.push(image_line(i + 1, &image.path));
        lines.push(format!("    Sidecar: {}", image.sidecar.display()));
        lines.push(status_line(&image.status));
    }
    lines
}

pub fn print_show_output(images: &[ScannedImage]) {
    for line in format_show_output(images) {
        println!("{}", line);
    }
}

// ============================================================================
// Presets
// ============================================================================

/// Format shoot-type presets and selection strategies.
pub fn format_presets() -> Vec<String> {
    let mut lines = vec!["Shoot types".to_string()];
    for preset in &SHOOT_PRESETS {
        let aspects: Vec<String> = preset
            .suggested_aspects
            .iter()
            .map(|(w, h)| format!("{}:{}", w, h))
            .collect();
        lines.push(format!("    {:<10} {}", preset.key, preset.name));
        lines.push(format!("        {}", preset.description));
        lines.push(format!(
            "        strategy: {}, padding: {}, aspects: {}",
            preset.strategy,
            preset.padding,
            aspects.join(", ")
        ));
    }

    lines.push(String::new());
    lines.push("Strategies".to_string());
    for policy in SelectionPolicy::ALL {
        lines.push(format!(
            "    {:<18} {}: {}",
            policy.as_str(),
            policy.display_name(),
            policy.description()
        ));
    }
    lines
}

pub fn print_presets() {
    for line in format_presets() {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
