//! Configuration module.
//!
//! Handles loading, validating, and layering `subject-crop.toml`. Values are
//! resolved from four layers, each overriding the one below:
//!
//! ```text
//! command-line flags      --padding 0.2, --strategy largest, ...
//! user config file        subject-crop.toml (or --config <file>)
//! shoot-type preset       preset = "sports"  (see presets.rs)
//! stock defaults          CropperConfig::default()
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! # preset = "portrait"          # wedding | sports | portrait | street | auto
//!
//! [crop]
//! aspect_ratio = [4, 5]          # width:height of the crop, or a decimal (0.5625)
//! padding = 0.15                 # fraction of the subject size added per side
//! strategy = "highest_confidence" # highest_confidence | largest | centered
//! clamp = "contain_subject"      # contain_subject | fit
//! center_fallback = false        # centered crop when no subject is found
//!
//! [detection]
//! min_confidence = 0.5           # ignore weaker detections
//!
//! [sidecar]
//! backup = true                  # copy an existing sidecar to .xmp.bak first
//! # output_dir = "xmp-out"       # write sidecars elsewhere
//!
//! [processing]
//! max_processes = 4              # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::crop::{AspectRatio, ClampPolicy, CropSettings};
use crate::presets::find_preset;
use crate::select::SelectionPolicy;

/// File looked up in the working directory when no `--config` is given.
pub const CONFIG_FILENAME: &str = "subject-crop.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Unknown preset '{0}' (run `subject-crop presets` to list them)")]
    UnknownPreset(String),
}

/// Tool configuration loaded from `subject-crop.toml`.
///
/// Every field has a default, so a config file lists only what it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropperConfig {
    /// Shoot-type preset applied beneath the user's own values.
    pub preset: Option<String>,
    /// Crop geometry and subject choice.
    pub crop: CropConfig,
    /// Filtering of the detector's output.
    pub detection: DetectionConfig,
    /// Where and how sidecars are written.
    pub sidecar: SidecarConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl CropperConfig {
    /// Reject out-of-range values after all layers are merged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crop.aspect_ratio.aspect()?;
        if !(0.0..=1.0).contains(&self.crop.padding) {
            return Err(ConfigError::Validation(
                "crop.padding must be between 0 and 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(ConfigError::Validation(
                "detection.min_confidence must be between 0 and 1".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Crop parameters in the form the calculator takes.
    pub fn crop_settings(&self) -> Result<CropSettings, ConfigError> {
        Ok(CropSettings {
            aspect: self.crop.aspect_ratio.aspect()?,
            padding: self.crop.padding,
            clamp: self.crop.clamp,
        })
    }
}

/// `crop.aspect_ratio`: integer parts (`[4, 5]`) or a decimal ratio
/// (`0.5625`). Either form is used exactly as written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AspectSetting {
    Parts([u32; 2]),
    Ratio(f64),
}

impl AspectSetting {
    /// The validated ratio.
    pub fn aspect(&self) -> Result<AspectRatio, ConfigError> {
        match *self {
            AspectSetting::Parts([w, h]) => AspectRatio::from_parts(w, h),
            AspectSetting::Ratio(ratio) => AspectRatio::new(ratio),
        }
        .map_err(|e| ConfigError::Validation(format!("crop.aspect_ratio: {e}")))
    }

    /// The setting as a config layer value.
    pub fn to_toml(&self) -> toml::Value {
        match *self {
            AspectSetting::Parts([w, h]) => toml::Value::Array(vec![
                toml::Value::Integer(w.into()),
                toml::Value::Integer(h.into()),
            ]),
            AspectSetting::Ratio(ratio) => toml::Value::Float(ratio),
        }
    }
}

impl From<AspectRatio> for AspectSetting {
    fn from(aspect: AspectRatio) -> Self {
        match aspect.parts() {
            Some((w, h)) => AspectSetting::Parts([w, h]),
            None => AspectSetting::Ratio(aspect.value()),
        }
    }
}

/// Crop geometry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropConfig {
    /// Aspect ratio, e.g. `[4, 5]` for portrait crops.
    pub aspect_ratio: AspectSetting,
    /// Padding around the subject, as a fraction of its own width/height.
    pub padding: f64,
    /// Which detection the crop is built around.
    pub strategy: SelectionPolicy,
    /// What to give up when the crop does not fit the frame.
    pub clamp: ClampPolicy,
    /// Write a centered crop for images with no usable detection.
    pub center_fallback: bool,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectSetting::Parts([4, 5]),
            padding: 0.15,
            strategy: SelectionPolicy::default(),
            clamp: ClampPolicy::default(),
            center_fallback: false,
        }
    }
}

/// Detector output filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// Detections below this confidence are ignored.
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

/// Sidecar output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SidecarConfig {
    /// Copy an existing sidecar to `<sidecar>.bak` before overwriting it.
    pub backup: bool,
    /// Write sidecars into this directory instead of next to the images.
    /// The image's own sidecar is still the one merged into.
    pub output_dir: Option<PathBuf>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            backup: true,
            output_dir: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Worker threads for `process`. Absent means one per CPU core; larger
    /// values are capped at the core count.
    pub max_processes: Option<usize>,
}

/// Thread count for the rayon pool: `max_processes` capped at the number of
/// cores, or the number of cores when unset.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// [`CropperConfig::default`] as a TOML table: the bottom layer that presets,
/// the config file and command-line flags are merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CropperConfig::default()).expect("default config must serialize")
}

/// Deep-merge `overlay` onto `base`. Tables merge per key; any other overlay
/// value (arrays included) replaces the base value whole.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read `path` as an unvalidated TOML value, `None` if there is no such file.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Build the final config from `base` plus an optional overlay.
///
/// When the overlay names a `preset`, the preset's values are merged onto
/// the base first, so the overlay's explicit keys still take precedence.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CropperConfig, ConfigError> {
    let preset_key = overlay
        .as_ref()
        .and_then(|ov| ov.get("preset"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let base = match preset_key {
        Some(key) => {
            let preset = find_preset(&key).ok_or(ConfigError::UnknownPreset(key))?;
            merge_toml(base, preset.config_layer())
        }
        None => base,
    };
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CropperConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config with command-line overrides on top.
///
/// With `path`, the file must exist. Without it, [`CONFIG_FILENAME`] in the
/// working directory is used if present.
pub fn load_config(
    path: Option<&Path>,
    cli_overrides: Option<toml::Value>,
) -> Result<CropperConfig, ConfigError> {
    let file = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => load_raw_config(Path::new(CONFIG_FILENAME))?,
    };
    let overlay = match (file, cli_overrides) {
        (Some(file), Some(cli)) => Some(merge_toml(file, cli)),
        (file, cli) => file.or(cli),
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `subject-crop.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Subject Crop Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file as subject-crop.toml in the working directory, or pass
# --config <file>. Command-line flags override values set here.
# Unknown keys will cause an error.

# Shoot-type preset: wedding, sports, portrait, street, auto.
# A preset supplies strategy, padding and aspect ratio; any value set
# below still overrides it.
# preset = "portrait"

# ---------------------------------------------------------------------------
# Crop geometry
# ---------------------------------------------------------------------------
[crop]
# Aspect ratio as [width, height], or as a decimal width/height (0.5625).
# Common choices: [4, 5] for portrait feeds, [9, 16] for stories, [1, 1] square.
aspect_ratio = [4, 5]

# Space added around the subject on every side, as a fraction of the
# subject's own width (left/right) and height (top/bottom). 0.0 to 1.0.
padding = 0.15

# Which detected person the crop is built around:
#   highest_confidence  the one the detector is most sure about
#   largest             the biggest box in frame
#   centered            the one closest to the image center
strategy = "highest_confidence"

# When the crop is larger than the image:
#   contain_subject  shrink padding first; never cut the subject, even if
#                    that means missing the aspect ratio
#   fit              always keep the aspect ratio; the subject may be cut
clamp = "contain_subject"

# Write a centered crop for images where no person was detected.
center_fallback = false

# ---------------------------------------------------------------------------
# Detection filtering
# ---------------------------------------------------------------------------
[detection]
# Detections below this confidence (0.0 to 1.0) are ignored.
min_confidence = 0.5

# ---------------------------------------------------------------------------
# Sidecar output
# ---------------------------------------------------------------------------
[sidecar]
# Copy an existing sidecar to <name>.xmp.bak before overwriting it.
backup = true

# Write sidecars to this directory instead of next to the images.
# The image's existing sidecar is still read and merged.
# output_dir = "xmp-out"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
