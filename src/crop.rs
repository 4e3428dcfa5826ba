//! Crop geometry: from a subject box to an aspect-correct crop rectangle.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! ## Algorithm
//!
//! ```text
//! subject box ──pad──▶ padded box ──grow──▶ aspect-correct box ──clamp──▶ crop
//! ```
//!
//! 1. The normalized subject box is converted to pixels. Aspect ratios are
//!    visual (pixel) ratios, so this step is what makes `4:5` mean the same
//!    thing on a 6000x4000 frame as on a 1000x600 one.
//! 2. The box is padded on every side by `padding` times its own width
//!    (left/right) and height (top/bottom). Padding is relative to the
//!    subject, not the frame.
//! 3. Keeping the padded center fixed, the deficient dimension grows until
//!    `width / height == target`. A padded box wider than the target grows in
//!    height, a narrower one grows in width.
//! 4. If the rectangle fits the frame it is translated (never resized) back
//!    inside. If it is too large it is shrunk uniformly, aspect preserved, and
//!    re-centered as closely as the frame allows. What happens when shrinking
//!    would cut into the subject is decided by the [`ClampPolicy`].
//! 5. The result is normalized back to `[0, 1]`.
//!
//! ## Unsatisfiable aspect
//!
//! A subject that already fills the frame may leave no room for the target
//! aspect. That is not an error: under [`ClampPolicy::ContainSubject`] the
//! calculator returns the best rectangle that still contains the subject and
//! reports [`CropOutcome::aspect_satisfied`] as `false`. The flag is the only
//! way a wrong-aspect rectangle ever leaves this module.

use crate::geometry::{CropRegion, Detection, Dimensions, InvalidInput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Relative tolerance for "the aspect ratio was hit".
pub const ASPECT_TOLERANCE: f64 = 1e-6;

/// Slack, in pixels, when checking that a shrunk rectangle still covers the
/// subject. Absorbs rounding in the normalized → pixel conversion.
const CONTAIN_EPSILON: f64 = 1e-9;

// =============================================================================
// Parameters
// =============================================================================

/// Target aspect ratio (width / height), strictly positive and finite.
///
/// Parsed from `"4:5"`-style strings or a plain decimal (`"0.8"`). When built
/// from integer parts the parts are kept for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio {
    ratio: f64,
    parts: Option<(u32, u32)>,
}

impl AspectRatio {
    pub fn new(ratio: f64) -> Result<Self, InvalidInput> {
        validate_aspect(ratio)?;
        Ok(Self { ratio, parts: None })
    }

    pub fn from_parts(width: u32, height: u32) -> Result<Self, InvalidInput> {
        if width == 0 || height == 0 {
            return Err(InvalidInput::AspectRatio(format!(
                "{width}:{height} has a zero side"
            )));
        }
        Ok(Self {
            ratio: width as f64 / height as f64,
            parts: Some((width, height)),
        })
    }

    pub fn value(&self) -> f64 {
        self.ratio
    }

    pub fn parts(&self) -> Option<(u32, u32)> {
        self.parts
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parts {
            Some((w, h)) => write!(f, "{w}:{h}"),
            None => write!(f, "{}", self.ratio),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((w, h)) = s.split_once(':') {
            let parse = |part: &str| {
                part.trim().parse::<u32>().map_err(|_| {
                    InvalidInput::AspectRatio(format!(
                        "'{s}' is not of the form W:H (e.g. 4:5 or 9:16)"
                    ))
                })
            };
            return Self::from_parts(parse(w)?, parse(h)?);
        }
        let ratio = s.parse::<f64>().map_err(|_| {
            InvalidInput::AspectRatio(format!("'{s}' is neither W:H nor a decimal ratio"))
        })?;
        Self::new(ratio)
    }
}

/// What to do when the aspect-correct rectangle must shrink to fit the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
    /// Padding may be sacrificed, the subject may not. When no aspect-correct
    /// rectangle can contain the subject, return the closest rectangle that
    /// does and flag the aspect as unsatisfied.
    #[default]
    ContainSubject,
    /// Always honour the aspect ratio; the subject may be cut.
    Fit,
}

impl ClampPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClampPolicy::ContainSubject => "contain_subject",
            ClampPolicy::Fit => "fit",
        }
    }
}

impl fmt::Display for ClampPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClampPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "contain_subject" | "contain" => Ok(ClampPolicy::ContainSubject),
            "fit" => Ok(ClampPolicy::Fit),
            _ => Err(format!(
                "unknown clamp policy '{s}' (expected contain_subject or fit)"
            )),
        }
    }
}

/// Bundled crop parameters, as resolved from config and CLI flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSettings {
    pub aspect: AspectRatio,
    pub padding: f64,
    pub clamp: ClampPolicy,
}

impl CropSettings {
    /// Crop around `subject` on an image of the given dimensions.
    pub fn crop(&self, image: Dimensions, subject: &Detection) -> Result<CropOutcome, InvalidInput> {
        calculate(
            image.width,
            image.height,
            subject,
            self.aspect.value(),
            self.padding,
            self.clamp,
        )
    }
}

// =============================================================================
// Result
// =============================================================================

/// A computed crop plus the facts a caller needs to trust it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropOutcome {
    pub region: CropRegion,
    /// `false` only when the target aspect could not be reached without
    /// leaving the frame or cutting the subject.
    pub aspect_satisfied: bool,
    pub image: Dimensions,
}

impl CropOutcome {
    /// Visual aspect ratio of the region.
    pub fn aspect_ratio(&self) -> f64 {
        self.region.aspect_ratio(self.image)
    }
}

// =============================================================================
// Calculations
// =============================================================================

fn validate_aspect(target_aspect: f64) -> Result<(), InvalidInput> {
    if !target_aspect.is_finite() || target_aspect <= 0.0 {
        return Err(InvalidInput::AspectRatio(format!(
            "must be a positive finite number, got {target_aspect}"
        )));
    }
    Ok(())
}

fn validate_padding(padding: f64) -> Result<(), InvalidInput> {
    if !(0.0..=1.0).contains(&padding) {
        return Err(InvalidInput::Padding(padding));
    }
    Ok(())
}

/// Whether `width / height` matches `target` within [`ASPECT_TOLERANCE`].
fn aspect_matches(width: f64, height: f64, target: f64) -> bool {
    ((width / height) - target).abs() <= ASPECT_TOLERANCE * target
}

/// Position a span of `size` as close to `center` as possible inside
/// `[0, extent]`. Requires `size <= extent`.
///
/// # Returns
/// * `(start, end)` in pixels
fn place(center: f64, size: f64, extent: f64) -> (f64, f64) {
    let start = (center - size / 2.0).max(0.0).min(extent - size);
    let end = (start + size).min(extent);
    (start, end)
}

/// Largest rectangle of aspect `target` inside an `iw` x `ih` frame.
fn fit_in_frame(iw: f64, ih: f64, target: f64) -> (f64, f64) {
    if iw / ih > target {
        ((ih * target).min(iw), ih)
    } else {
        (iw, (iw / target).min(ih))
    }
}

/// Calculate the crop for `subject` on an `image_width` x `image_height` image.
///
/// # Arguments
/// * `subject` - The chosen detection (normalized box)
/// * `target_aspect` - Visual width / height of the crop, e.g. `0.8` for 4:5
/// * `padding` - Fraction of the subject's own size added on each side, `[0, 1]`
/// * `clamp` - Behaviour when the rectangle must shrink to fit
///
/// # Errors
/// [`InvalidInput`] for zero image dimensions, a non-positive or non-finite
/// aspect, or padding outside `[0, 1]`. An aspect that cannot be reached is
/// reported through [`CropOutcome::aspect_satisfied`], not as an error.
///
/// # Examples
/// ```
/// # use subject_crop::crop::{calculate, ClampPolicy};
/// # use subject_crop::geometry::{BoundingBox, Detection};
/// let person = Detection::new(BoundingBox::new(0.4, 0.3, 0.6, 0.7).unwrap(), 0.9, "person").unwrap();
/// let outcome = calculate(1000, 600, &person, 0.8, 0.15, ClampPolicy::ContainSubject).unwrap();
/// assert!(outcome.aspect_satisfied);
/// assert!((outcome.aspect_ratio() - 0.8).abs() < 1e-6);
/// ```
pub fn calculate(
    image_width: u32,
    image_height: u32,
    subject: &Detection,
    target_aspect: f64,
    padding: f64,
    clamp: ClampPolicy,
) -> Result<CropOutcome, InvalidInput> {
    let image = Dimensions::new(image_width, image_height)?;
    validate_aspect(target_aspect)?;
    validate_padding(padding)?;

    let iw = image_width as f64;
    let ih = image_height as f64;
    let bbox = subject.bounding_box();

    // Subject in pixels
    let subject_w = bbox.width() * iw;
    let subject_h = bbox.height() * ih;
    let (center_x, center_y) = {
        let (cx, cy) = bbox.center();
        (cx * iw, cy * ih)
    };

    // Pad relative to the subject's own size
    let padded_w = subject_w * (1.0 + 2.0 * padding);
    let padded_h = subject_h * (1.0 + 2.0 * padding);

    // Grow the deficient dimension to hit the target aspect
    let (mut crop_w, mut crop_h) = if padded_w / padded_h > target_aspect {
        (padded_w, padded_w / target_aspect)
    } else {
        (padded_h * target_aspect, padded_h)
    };
    let mut aspect_satisfied = true;

    if crop_w > iw || crop_h > ih {
        let (fit_w, fit_h) = fit_in_frame(iw, ih, target_aspect);
        let covers_subject =
            fit_w + CONTAIN_EPSILON >= subject_w && fit_h + CONTAIN_EPSILON >= subject_h;

        match clamp {
            ClampPolicy::Fit => {
                (crop_w, crop_h) = (fit_w, fit_h);
            }
            ClampPolicy::ContainSubject if covers_subject => {
                (crop_w, crop_h) = (fit_w, fit_h);
            }
            ClampPolicy::ContainSubject => {
                // Padded box clipped to the frame, grown toward the target
                // as far as the frame allows.
                let base_w = padded_w.min(iw);
                let base_h = padded_h.min(ih);
                crop_w = iw.min(base_w.max(base_h * target_aspect));
                crop_h = ih.min(base_h.max(crop_w / target_aspect));
                aspect_satisfied = aspect_matches(crop_w, crop_h, target_aspect);
                debug!(
                    subject = %format!("{subject_w:.1}x{subject_h:.1}"),
                    crop = %format!("{crop_w:.1}x{crop_h:.1}"),
                    target_aspect,
                    "subject leaves no room for the target aspect"
                );
            }
        }
    }

    let (left, right) = place(center_x, crop_w, iw);
    let (top, bottom) = place(center_y, crop_h, ih);
    let region = CropRegion::new(left / iw, top / ih, right / iw, bottom / ih)?;

    Ok(CropOutcome {
        region,
        aspect_satisfied,
        image,
    })
}

/// The largest crop of `target_aspect` centered in the frame.
///
/// Fallback for images where no subject was detected.
pub fn calculate_centered(
    image_width: u32,
    image_height: u32,
    target_aspect: f64,
) -> Result<CropOutcome, InvalidInput> {
    let image = Dimensions::new(image_width, image_height)?;
    validate_aspect(target_aspect)?;

    let iw = image_width as f64;
    let ih = image_height as f64;
    let (crop_w, crop_h) = fit_in_frame(iw, ih, target_aspect);
    let (left, right) = place(iw / 2.0, crop_w, iw);
    let (top, bottom) = place(ih / 2.0, crop_h, ih);
    let region = CropRegion::new(left / iw, top / ih, right / iw, bottom / ih)?;

    Ok(CropOutcome {
        region,
        aspect_satisfied: true,
        image,
    })
}
