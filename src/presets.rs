//! Shoot-type presets.
//!
//! A preset is a named bundle of crop defaults tuned for a kind of shoot.
//! Selecting one (`preset = "sports"` in the config file, or `--preset`)
//! layers its values between the stock defaults and the user's own config,
//! so anything the user sets explicitly still wins.
//!
//! | Key        | Strategy             | Padding | Aspect |
//! |------------|----------------------|---------|--------|
//! | `wedding`  | `highest_confidence` | 0.15    | 4:5    |
//! | `sports`   | `largest`            | 0.12    | 4:5    |
//! | `portrait` | `highest_confidence` | 0.18    | 4:5    |
//! | `street`   | `highest_confidence` | 0.15    | 4:5    |
//! | `auto`     | `highest_confidence` | 0.15    | 4:5    |

use crate::select::SelectionPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct ShootPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub strategy: SelectionPolicy,
    pub padding: f64,
    /// First entry is the default; the rest are common alternatives.
    pub suggested_aspects: &'static [(u32, u32)],
}

impl ShootPreset {
    pub fn default_aspect(&self) -> (u32, u32) {
        self.suggested_aspects.first().copied().unwrap_or((4, 5))
    }

    /// The preset as a sparse config layer, ready for `config::merge_toml`.
    pub fn config_layer(&self) -> toml::Value {
        let (w, h) = self.default_aspect();
        let mut crop = toml::map::Map::new();
        crop.insert(
            "strategy".into(),
            toml::Value::String(self.strategy.as_str().into()),
        );
        crop.insert("padding".into(), toml::Value::Float(self.padding));
        crop.insert(
            "aspect_ratio".into(),
            toml::Value::Array(vec![
                toml::Value::Integer(w.into()),
                toml::Value::Integer(h.into()),
            ]),
        );
        let mut root = toml::map::Map::new();
        root.insert("crop".into(), toml::Value::Table(crop));
        toml::Value::Table(root)
    }
}

pub static SHOOT_PRESETS: [ShootPreset; 5] = [
    ShootPreset {
        key: "wedding",
        name: "Wedding & Events",
        description: "Ceremonies, receptions, and celebrations",
        strategy: SelectionPolicy::HighestConfidence,
        padding: 0.15,
        suggested_aspects: &[(4, 5), (2, 3), (5, 7)],
    },
    ShootPreset {
        key: "sports",
        name: "Sports & Action",
        description: "Athletic events and fast-moving subjects",
        strategy: SelectionPolicy::Largest,
        padding: 0.12,
        suggested_aspects: &[(4, 5), (9, 16), (2, 3)],
    },
    ShootPreset {
        key: "portrait",
        name: "Portraits",
        description: "Individual or small group portraits",
        strategy: SelectionPolicy::HighestConfidence,
        padding: 0.18,
        suggested_aspects: &[(4, 5), (2, 3), (5, 7)],
    },
    ShootPreset {
        key: "street",
        name: "Street & Travel",
        description: "Candid street photography and travel shots",
        strategy: SelectionPolicy::HighestConfidence,
        padding: 0.15,
        suggested_aspects: &[(4, 5), (1, 1), (9, 16)],
    },
    ShootPreset {
        key: "auto",
        name: "Auto-Detect",
        description: "General-purpose defaults for mixed shoots",
        strategy: SelectionPolicy::HighestConfidence,
        padding: 0.15,
        suggested_aspects: &[(4, 5)],
    },
];

/// Look up a preset by key, case-insensitively.
pub fn find_preset(key: &str) -> Option<&'static ShootPreset> {
    SHOOT_PRESETS
        .iter()
        .find(|p| p.key.eq_ignore_ascii_case(key.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<_> = SHOOT_PRESETS.iter().map(|p| p.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), SHOOT_PRESETS.len());
    }

    #[test]
    fn find_is_case_insensitive() {
        assert_eq!(find_preset("Sports").unwrap().strategy, SelectionPolicy::Largest);
        assert!(find_preset("landscape").is_none());
    }

    #[test]
    fn every_preset_defaults_to_portrait_four_five() {
        for preset in &SHOOT_PRESETS {
            assert_eq!(preset.default_aspect(), (4, 5), "{}", preset.key);
            assert!((0.0..=1.0).contains(&preset.padding));
        }
    }

    #[test]
    fn config_layer_is_sparse_crop_table() {
        let layer = find_preset("portrait").unwrap().config_layer();
        let crop = layer.get("crop").unwrap();
        assert_eq!(crop.get("strategy").unwrap().as_str(), Some("highest_confidence"));
        assert_eq!(crop.get("padding").unwrap().as_float(), Some(0.18));
        assert_eq!(layer.as_table().unwrap().len(), 1);
        assert!(crop.get("clamp").is_none());
    }
}
