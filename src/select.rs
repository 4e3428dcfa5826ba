//! Subject selection: pick one detection out of many.
//!
//! A detector usually reports several candidates (the couple and the
//! officiant, a player and the referee). [`select`] reduces them to the one
//! the crop is built around, under a [`SelectionPolicy`].
//!
//! Every policy is a strict arg-max (or arg-min) over the input in order, so a
//! tie keeps the detection that came **first**. Permuting candidates with
//! distinct keys never changes the result; permuting tied candidates changes
//! it exactly as input order dictates. No deduplication happens here:
//! overlapping boxes are scored independently.
//!
//! An empty input yields `None`, the "no subject" outcome. It is not an
//! error; callers decide whether to skip the image or fall back to a
//! full-frame crop.

use crate::geometry::Detection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How to choose the subject among several detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Maximum detector confidence.
    #[default]
    HighestConfidence,
    /// Maximum bounding-box area.
    Largest,
    /// Box center closest to the image center.
    Centered,
}

impl SelectionPolicy {
    pub const ALL: [SelectionPolicy; 3] = [
        SelectionPolicy::HighestConfidence,
        SelectionPolicy::Largest,
        SelectionPolicy::Centered,
    ];

    /// Config/CLI spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPolicy::HighestConfidence => "highest_confidence",
            SelectionPolicy::Largest => "largest",
            SelectionPolicy::Centered => "centered",
        }
    }

    /// Photographer-facing name.
    pub fn display_name(&self) -> &'static str {
        match self {
            SelectionPolicy::HighestConfidence => "Smart Select",
            SelectionPolicy::Largest => "Main Subject",
            SelectionPolicy::Centered => "Center Stage",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SelectionPolicy::HighestConfidence => "Picks the detection the model is most sure about",
            SelectionPolicy::Largest => "Focuses on the largest person in frame",
            SelectionPolicy::Centered => "Prioritizes whoever is most centered",
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    /// Accepts the config spelling, dashes instead of underscores, or the
    /// display name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|p| {
                p.as_str() == normalized
                    || p.display_name().to_ascii_lowercase().replace(' ', "_") == normalized
            })
            .ok_or_else(|| {
                format!(
                    "unknown selection strategy '{s}' (expected one of: highest_confidence, largest, centered)"
                )
            })
    }
}

/// Choose the subject from `detections` under `policy`.
///
/// Returns `None` for an empty slice. Ties go to the earliest detection.
pub fn select(detections: &[Detection], policy: SelectionPolicy) -> Option<&Detection> {
    let mut candidates = detections.iter();
    let mut best = candidates.next()?;

    for candidate in candidates {
        let better = match policy {
            SelectionPolicy::HighestConfidence => candidate.confidence() > best.confidence(),
            SelectionPolicy::Largest => {
                candidate.bounding_box().area() > best.bounding_box().area()
            }
            SelectionPolicy::Centered => center_distance(candidate) < center_distance(best),
        };
        if better {
            best = candidate;
        }
    }

    Some(best)
}

/// Euclidean distance from the box center to the image center `(0.5, 0.5)`.
fn center_distance(detection: &Detection) -> f64 {
    let (cx, cy) = detection.bounding_box().center();
    (cx - 0.5).hypot(cy - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::detection;

    // =========================================================================
    // Empty and single inputs
    // =========================================================================

    #[test]
    fn empty_input_is_no_subject() {
        for policy in SelectionPolicy::ALL {
            assert!(select(&[], policy).is_none());
        }
    }

    #[test]
    fn single_detection_is_always_selected() {
        let only = [detection((0.1, 0.1, 0.2, 0.2), 0.3)];
        for policy in SelectionPolicy::ALL {
            assert_eq!(select(&only, policy), Some(&only[0]));
        }
    }

    // =========================================================================
    // HighestConfidence
    // =========================================================================

    #[test]
    fn highest_confidence_picks_max() {
        let dets = [
            detection((0.0, 0.0, 0.5, 0.5), 0.6),
            detection((0.5, 0.5, 0.6, 0.6), 0.95),
            detection((0.2, 0.2, 0.9, 0.9), 0.7),
        ];
        assert_eq!(select(&dets, SelectionPolicy::HighestConfidence), Some(&dets[1]));
    }

    #[test]
    fn highest_confidence_tie_keeps_first() {
        let a = detection((0.0, 0.0, 0.2, 0.2), 0.9);
        let b = detection((0.5, 0.5, 0.9, 0.9), 0.9);
        let dets = [a.clone(), b.clone()];
        assert_eq!(select(&dets, SelectionPolicy::HighestConfidence), Some(&a));

        let swapped = [b.clone(), a];
        assert_eq!(select(&swapped, SelectionPolicy::HighestConfidence), Some(&b));
    }

    // =========================================================================
    // Largest
    // =========================================================================

    #[test]
    fn largest_picks_max_area() {
        let dets = [
            detection((0.0, 0.0, 0.2, 0.2), 0.99),
            detection((0.3, 0.1, 0.7, 0.9), 0.51),
            detection((0.8, 0.8, 0.9, 0.9), 0.8),
        ];
        assert_eq!(select(&dets, SelectionPolicy::Largest), Some(&dets[1]));
    }

    #[test]
    fn largest_tie_keeps_first() {
        // Same area (1/16), different positions
        let dets = [
            detection((0.0, 0.0, 0.25, 0.25), 0.5),
            detection((0.5, 0.5, 0.75, 0.75), 0.9),
        ];
        assert_eq!(select(&dets, SelectionPolicy::Largest), Some(&dets[0]));
    }

    // =========================================================================
    // Centered
    // =========================================================================

    #[test]
    fn centered_picks_closest_to_middle() {
        let dets = [
            detection((0.0, 0.0, 0.2, 0.2), 0.99),
            detection((0.45, 0.4, 0.55, 0.7), 0.4),
            detection((0.7, 0.3, 0.9, 0.7), 0.8),
        ];
        assert_eq!(select(&dets, SelectionPolicy::Centered), Some(&dets[1]));
    }

    #[test]
    fn centered_tie_keeps_first() {
        // Mirror images around the vertical center line
        let dets = [
            detection((0.125, 0.375, 0.25, 0.625), 0.5),
            detection((0.75, 0.375, 0.875, 0.625), 0.9),
        ];
        assert_eq!(select(&dets, SelectionPolicy::Centered), Some(&dets[0]));
    }

    // =========================================================================
    // Determinism
    // =========================================================================

    #[test]
    fn distinct_keys_are_permutation_independent() {
        let dets = vec![
            detection((0.05, 0.05, 0.15, 0.25), 0.55),
            detection((0.35, 0.2, 0.62, 0.85), 0.72),
            detection((0.7, 0.1, 0.95, 0.4), 0.93),
        ];
        for policy in SelectionPolicy::ALL {
            let expected = select(&dets, policy).cloned();
            let mut reversed = dets.clone();
            reversed.reverse();
            let mut rotated = dets.clone();
            rotated.rotate_left(1);
            assert_eq!(select(&reversed, policy).cloned(), expected);
            assert_eq!(select(&rotated, policy).cloned(), expected);
        }
    }

    #[test]
    fn repeated_calls_agree() {
        let dets = [
            detection((0.1, 0.1, 0.4, 0.9), 0.8),
            detection((0.5, 0.2, 0.8, 0.7), 0.8),
        ];
        for policy in SelectionPolicy::ALL {
            assert_eq!(select(&dets, policy), select(&dets, policy));
        }
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn policy_parses_config_and_display_spellings() {
        assert_eq!(
            "highest_confidence".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::HighestConfidence
        );
        assert_eq!(
            "highest-confidence".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::HighestConfidence
        );
        assert_eq!(
            "Center Stage".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::Centered
        );
        assert_eq!(
            " main-subject ".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::Largest
        );
        assert!("biggest".parse::<SelectionPolicy>().is_err());
    }

    #[test]
    fn policy_serde_uses_snake_case() {
        let json = serde_json::to_string(&SelectionPolicy::HighestConfidence).unwrap();
        assert_eq!(json, r#""highest_confidence""#);
    }
}
