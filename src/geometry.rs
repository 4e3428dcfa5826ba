//! Value types shared by the selector, the calculator and the sidecar codec.
//!
//! Every coordinate here is **normalized**: horizontal values are fractions of
//! the image width, vertical values fractions of the image height, origin at
//! the top-left corner. A box spanning the whole frame is `(0, 0) – (1, 1)`
//! regardless of the pixel dimensions.
//!
//! All types validate their invariants in the constructor and expose no
//! mutable fields, so a value that exists is a value that is valid:
//!
//! | Type | Invariant |
//! |---|---|
//! | [`BoundingBox`] | finite, inside `[0,1]`, `left < right`, `top < bottom` |
//! | [`Detection`] | valid box, confidence in `[0,1]` |
//! | [`CropRegion`] | same as a bounding box |
//! | [`Dimensions`] | both sides non-zero |
//!
//! Deserialization goes through the same constructors (`try_from`), so a
//! detections manifest with a degenerate box fails to load instead of
//! producing geometry that silently misbehaves later.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Malformed geometric input. Always a caller bug or corrupt upstream data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidInput {
    #[error("invalid bounding box: {0}")]
    BoundingBox(String),
    #[error("invalid crop region: {0}")]
    CropRegion(String),
    #[error("confidence must be within [0, 1], got {0}")]
    Confidence(f64),
    #[error("invalid aspect ratio: {0}")]
    AspectRatio(String),
    #[error("padding must be within [0, 1], got {0}")]
    Padding(f64),
    #[error("image dimensions must be positive, got {width}x{height}")]
    ImageDimensions { width: u32, height: u32 },
}

/// Check the shared rectangle invariants, returning a description of the
/// first violation.
fn check_rect(left: f64, top: f64, right: f64, bottom: f64) -> Result<(), String> {
    let coords = [left, top, right, bottom];
    if coords.iter().any(|c| !c.is_finite()) {
        return Err(format!(
            "coordinates must be finite: ({left}, {top}, {right}, {bottom})"
        ));
    }
    if coords.iter().any(|c| !(0.0..=1.0).contains(c)) {
        return Err(format!(
            "coordinates must be within [0, 1]: ({left}, {top}, {right}, {bottom})"
        ));
    }
    if left >= right {
        return Err(format!("left ({left}) must be less than right ({right})"));
    }
    if top >= bottom {
        return Err(format!("top ({top}) must be less than bottom ({bottom})"));
    }
    Ok(())
}

// =============================================================================
// Image dimensions
// =============================================================================

/// Pixel dimensions of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Result<Self, InvalidInput> {
        if width == 0 || height == 0 {
            return Err(InvalidInput::ImageDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// =============================================================================
// Bounding box
// =============================================================================

/// A rectangle delimiting a detected region, in normalized coordinates.
///
/// Serialized as `[left, top, right, bottom]`, the layout detectors emit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Result<Self, InvalidInput> {
        check_rect(left, top, right, bottom).map_err(InvalidInput::BoundingBox)?;
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Area in normalized units (fraction of the frame covered).
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = InvalidInput;

    fn try_from([left, top, right, bottom]: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(left, top, right, bottom)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.left, b.top, b.right, b.bottom]
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Categorical tag attached to a detection by the detector.
///
/// `person` and `face` are the tags the bundled detectors produce; anything
/// else is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Label {
    #[default]
    Person,
    Face,
    Other(String),
}

impl Label {
    pub fn as_str(&self) -> &str {
        match self {
            Label::Person => "person",
            Label::Face => "face",
            Label::Other(s) => s,
        }
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        match s.as_str() {
            "person" => Label::Person,
            "face" => Label::Face,
            _ => Label::Other(s),
        }
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::from(s.to_string())
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        match label {
            Label::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire form of a detection as emitted by the detector, validated into
/// [`Detection`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(rename = "box")]
    pub bounding_box: [f64; 4],
    pub confidence: f64,
    #[serde(default)]
    pub label: Label,
}

/// One candidate subject region reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DetectionRecord", into = "DetectionRecord")]
pub struct Detection {
    bounding_box: BoundingBox,
    confidence: f64,
    label: Label,
}

impl Detection {
    pub fn new(
        bounding_box: BoundingBox,
        confidence: f64,
        label: impl Into<Label>,
    ) -> Result<Self, InvalidInput> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InvalidInput::Confidence(confidence));
        }
        Ok(Self {
            bounding_box,
            confidence,
            label: label.into(),
        })
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn label(&self) -> &Label {
        &self.label
    }
}

impl TryFrom<DetectionRecord> for Detection {
    type Error = InvalidInput;

    fn try_from(raw: DetectionRecord) -> Result<Self, Self::Error> {
        let bounding_box = BoundingBox::try_from(raw.bounding_box)?;
        Detection::new(bounding_box, raw.confidence, raw.label)
    }
}

impl From<Detection> for DetectionRecord {
    fn from(d: Detection) -> Self {
        DetectionRecord {
            bounding_box: d.bounding_box.into(),
            confidence: d.confidence,
            label: d.label,
        }
    }
}

// =============================================================================
// Crop region
// =============================================================================

/// A computed crop rectangle in normalized coordinates.
///
/// The normalized width/height ratio is *not* the visual aspect ratio unless
/// the image is square; use [`CropRegion::aspect_ratio`] with the image
/// dimensions for that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropRegion {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl CropRegion {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Result<Self, InvalidInput> {
        check_rect(left, top, right, bottom).map_err(InvalidInput::CropRegion)?;
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// The whole frame.
    pub fn full_frame() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: 1.0,
            bottom: 1.0,
        }
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Visual aspect ratio (pixel width / pixel height) on an image of the
    /// given dimensions.
    pub fn aspect_ratio(&self, image: Dimensions) -> f64 {
        (self.width() * image.width as f64) / (self.height() * image.height as f64)
    }

    /// Pixel rectangle `(x, y, width, height)` on an image of the given
    /// dimensions, rounded to whole pixels.
    pub fn to_pixels(&self, image: Dimensions) -> (u32, u32, u32, u32) {
        let w = image.width as f64;
        let h = image.height as f64;
        let x = (self.left * w).round() as u32;
        let y = (self.top * h).round() as u32;
        let right = (self.right * w).round() as u32;
        let bottom = (self.bottom * h).round() as u32;
        (x, y, right - x, bottom - y)
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L={:.3} T={:.3} R={:.3} B={:.3}",
            self.left, self.top, self.right, self.bottom
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // BoundingBox
    // =========================================================================

    #[test]
    fn bounding_box_accepts_valid_coordinates() {
        let b = BoundingBox::new(0.1, 0.2, 0.5, 0.9).unwrap();
        assert!((b.width() - 0.4).abs() < 1e-12);
        assert!((b.height() - 0.7).abs() < 1e-12);
        assert!((b.area() - 0.28).abs() < 1e-12);
        let (cx, cy) = b.center();
        assert!((cx - 0.3).abs() < 1e-12);
        assert!((cy - 0.55).abs() < 1e-12);
    }

    #[test]
    fn bounding_box_accepts_full_frame() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_ok());
    }

    #[test]
    fn bounding_box_rejects_zero_width() {
        let err = BoundingBox::new(0.5, 0.1, 0.5, 0.9).unwrap_err();
        assert!(matches!(err, InvalidInput::BoundingBox(_)));
    }

    #[test]
    fn bounding_box_rejects_inverted_vertical() {
        assert!(BoundingBox::new(0.1, 0.9, 0.5, 0.2).is_err());
    }

    #[test]
    fn bounding_box_rejects_out_of_range() {
        assert!(BoundingBox::new(-0.01, 0.1, 0.5, 0.9).is_err());
        assert!(BoundingBox::new(0.1, 0.1, 1.2, 0.9).is_err());
    }

    #[test]
    fn bounding_box_rejects_nan() {
        assert!(BoundingBox::new(f64::NAN, 0.1, 0.5, 0.9).is_err());
    }

    #[test]
    fn bounding_box_serializes_as_array() {
        let b = BoundingBox::new(0.25, 0.5, 0.75, 1.0).unwrap();
        assert_eq!(serde_json::to_string(&b).unwrap(), "[0.25,0.5,0.75,1.0]");
    }

    // =========================================================================
    // Detection
    // =========================================================================

    #[test]
    fn detection_rejects_confidence_above_one() {
        let b = BoundingBox::new(0.1, 0.1, 0.2, 0.2).unwrap();
        assert_eq!(
            Detection::new(b, 1.5, "person").unwrap_err(),
            InvalidInput::Confidence(1.5)
        );
    }

    #[test]
    fn detection_deserializes_from_detector_json() {
        let json = r#"{"box": [0.4, 0.3, 0.6, 0.7], "confidence": 0.91, "label": "person"}"#;
        let d: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(d.label(), &Label::Person);
        assert_eq!(d.confidence(), 0.91);
        assert_eq!(d.bounding_box().left(), 0.4);
    }

    #[test]
    fn detection_deserialization_validates_box() {
        let json = r#"{"box": [0.6, 0.3, 0.4, 0.7], "confidence": 0.9, "label": "face"}"#;
        let err = serde_json::from_str::<Detection>(json).unwrap_err();
        assert!(err.to_string().contains("left"));
    }

    #[test]
    fn detection_roundtrips_through_json() {
        let d = Detection::new(BoundingBox::new(0.1, 0.2, 0.3, 0.4).unwrap(), 0.5, "dog").unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains(r#""label":"dog""#));
        let back: Detection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    // =========================================================================
    // Label
    // =========================================================================

    #[test]
    fn label_known_tags_map_to_variants() {
        assert_eq!(Label::from("person"), Label::Person);
        assert_eq!(Label::from("face"), Label::Face);
        assert_eq!(Label::from("bicycle"), Label::Other("bicycle".into()));
        assert_eq!(Label::Other("bicycle".into()).to_string(), "bicycle");
    }

    // =========================================================================
    // Dimensions / CropRegion
    // =========================================================================

    #[test]
    fn dimensions_reject_zero() {
        assert_eq!(
            Dimensions::new(0, 600).unwrap_err(),
            InvalidInput::ImageDimensions {
                width: 0,
                height: 600
            }
        );
    }

    #[test]
    fn crop_region_pixel_aspect_uses_image_dimensions() {
        // Half the width of a 1000x600 frame, full height: 500x600 pixels
        let r = CropRegion::new(0.25, 0.0, 0.75, 1.0).unwrap();
        let dims = Dimensions::new(1000, 600).unwrap();
        assert!((r.aspect_ratio(dims) - 500.0 / 600.0).abs() < 1e-12);
        assert_eq!(r.to_pixels(dims), (250, 0, 500, 600));
    }

    #[test]
    fn crop_region_rejects_degenerate() {
        assert!(matches!(
            CropRegion::new(0.2, 0.2, 0.2, 0.8),
            Err(InvalidInput::CropRegion(_))
        ));
    }

    #[test]
    fn crop_region_display_is_compact() {
        let r = CropRegion::new(0.1, 0.2, 0.3, 0.4).unwrap();
        assert_eq!(r.to_string(), "L=0.100 T=0.200 R=0.300 B=0.400");
    }
}
