//! Persistent settings, layout, and hotkey map (TOML on disk).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::constants::config as cfg;
use crate::items::{self, SavedCategory, SavedItem};
use crate::types::Side;

/// A persisted key combination for one tool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCombo {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    pub key: String,
}

/// Global/default settings applying to both overlay windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub side: Side,
    /// Top edge of the panel in screen coordinates
    #[serde(default = "default_panel_y")]
    pub panel_y: i16,
    #[serde(default = "default_item_size")]
    pub item_size: u16,
    #[serde(default = "default_spacing")]
    pub spacing: u16,
    #[serde(default = "default_corner_radius")]
    pub corner_radius: u16,
    #[serde(default = "default_shadow_margin")]
    pub shadow_margin: u16,
    /// Panel body alpha, 0-255
    #[serde(default = "default_fill_alpha")]
    pub fill_alpha: u8,
    /// Start with auto-hide locked out (panel pinned open)
    #[serde(default)]
    pub lock_auto_hide: bool,
    #[serde(default = "default_text_size")]
    pub text_size: f32,
    /// Base URL for the subscription service
    #[serde(default = "default_service_url")]
    pub service_url: String,
}

fn default_panel_y() -> i16 {
    120
}
fn default_item_size() -> u16 {
    crate::constants::grid::ITEM_SIZE
}
fn default_spacing() -> u16 {
    crate::constants::grid::SPACING
}
fn default_corner_radius() -> u16 {
    crate::constants::panel::CORNER_RADIUS
}
fn default_shadow_margin() -> u16 {
    crate::constants::panel::SHADOW_MARGIN
}
fn default_fill_alpha() -> u8 {
    crate::constants::panel::FILL_ALPHA
}
fn default_text_size() -> f32 {
    12.0
}
fn default_service_url() -> String {
    "https://api.sidedock.example".to_string()
}

/// Persistent state saved to the TOML file: global settings, the
/// category/item layout, and the hotkey map.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(flatten)]
    pub global: GlobalSettings,

    /// Insertion-ordered category layout
    #[serde(default)]
    pub categories: Vec<SavedCategory>,

    /// Legacy single-list format, folded into the reserved category on load
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<SavedItem>,

    /// Tool name -> key combination; a missing entry means unbound
    #[serde(default)]
    pub hotkeys: HashMap<String, KeyCombo>,

    /// Launcher tool name -> shell command it runs. The overlay only
    /// dispatches; the tools themselves are separate programs.
    #[serde(default = "default_tools")]
    pub tools: HashMap<String, String>,
}

fn default_tools() -> HashMap<String, String> {
    HashMap::from([
        ("screenshot".to_string(), "sidedock-capture --screenshot".to_string()),
        ("record".to_string(), "sidedock-capture --record".to_string()),
        ("settings".to_string(), "sidedock-settings".to_string()),
    ])
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            global: GlobalSettings::default(),
            categories: Vec::new(),
            items: Vec::new(),
            hotkeys: HashMap::new(),
            tools: default_tools(),
        }
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            side: Side::Right,
            panel_y: default_panel_y(),
            item_size: default_item_size(),
            spacing: default_spacing(),
            corner_radius: default_corner_radius(),
            shadow_margin: default_shadow_margin(),
            fill_alpha: default_fill_alpha(),
            lock_auto_hide: false,
            text_size: default_text_size(),
            service_url: default_service_url(),
        }
    }
}

/// No two tools may share an identical combination; checked before save
pub fn validate_hotkeys(map: &HashMap<String, KeyCombo>) -> Result<()> {
    let mut seen: HashMap<&KeyCombo, &str> = HashMap::new();
    let mut names: Vec<&String> = map.keys().collect();
    names.sort();
    for name in names {
        let combo = &map[name.as_str()];
        if let Some(other) = seen.insert(combo, name.as_str()) {
            anyhow::bail!(
                "Hotkey conflict: '{}' and '{}' share the same combination",
                other,
                name
            );
        }
    }
    Ok(())
}

impl PersistentState {
    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(cfg::APP_DIR);
        path.push(cfg::FILENAME);
        path
    }

    /// Directory holding owned copies of dropped files
    pub fn storage_dir() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(cfg::APP_DIR);
        path.push("items");
        path
    }

    /// Validate and clamp values to safe ranges after load
    fn validate_and_clamp(&mut self) {
        if self.global.corner_radius > cfg::MAX_CORNER_RADIUS {
            warn!(corner_radius = self.global.corner_radius, max = cfg::MAX_CORNER_RADIUS,
                  "corner_radius exceeds maximum, clamping");
            self.global.corner_radius = cfg::MAX_CORNER_RADIUS;
        }
        if self.global.shadow_margin > cfg::MAX_SHADOW_MARGIN {
            warn!(shadow_margin = self.global.shadow_margin, max = cfg::MAX_SHADOW_MARGIN,
                  "shadow_margin exceeds maximum, clamping");
            self.global.shadow_margin = cfg::MAX_SHADOW_MARGIN;
        }
        if self.global.item_size < cfg::MIN_ITEM_SIZE {
            warn!(item_size = self.global.item_size, min = cfg::MIN_ITEM_SIZE,
                  "item_size below minimum, using default");
            self.global.item_size = default_item_size();
        } else if self.global.item_size > cfg::MAX_ITEM_SIZE {
            warn!(item_size = self.global.item_size, max = cfg::MAX_ITEM_SIZE,
                  "item_size exceeds maximum, clamping");
            self.global.item_size = cfg::MAX_ITEM_SIZE;
        }
        if !(4.0..=64.0).contains(&self.global.text_size) {
            warn!(text_size = self.global.text_size, "text_size out of range, using default");
            self.global.text_size = default_text_size();
        }
        if let Err(e) = validate_hotkeys(&self.hotkeys) {
            warn!(error = %e, "clearing conflicting hotkey map");
            self.hotkeys.clear();
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(side) = env::var("SIDEDOCK_SIDE") {
            match side.to_lowercase().as_str() {
                "left" => self.global.side = Side::Left,
                "right" => self.global.side = Side::Right,
                other => error!(value = %other, "invalid SIDEDOCK_SIDE, expected left/right"),
            }
        }
        if let Ok(url) = env::var("SIDEDOCK_SERVICE_URL") {
            self.global.service_url = url;
        }
    }

    /// Load the config, migrating legacy layouts and pruning dead items.
    /// A malformed existing file is preserved for the user to fix.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        if let Ok(contents) = fs::read_to_string(&config_path) {
            match toml::from_str::<PersistentState>(&contents) {
                Ok(mut state) => {
                    state.apply_env_overrides();
                    state.validate_and_clamp();
                    let legacy = std::mem::take(&mut state.items);
                    let had_legacy = !legacy.is_empty();
                    state.categories = items::normalize_layout(
                        std::mem::take(&mut state.categories),
                        legacy,
                    );
                    if had_legacy {
                        info!("rewriting config after legacy layout migration");
                        if let Err(e) = state.save() {
                            error!(error = ?e, "Failed to save migrated config");
                        }
                    }
                    return state;
                }
                Err(e) => {
                    error!(path = %config_path.display(), error = %e, "Failed to parse config file");
                    error!(path = %config_path.display(),
                           "The file has been preserved - fix the syntax errors and restart.");
                    std::process::exit(1);
                }
            }
        }

        let mut state = PersistentState::default();
        state.apply_env_overrides();
        state.categories = items::normalize_layout(Vec::new(), Vec::new());
        if let Err(e) = state
            .save()
            .context(format!("Failed to save new config to {}", config_path.display()))
        {
            error!(error = ?e, "Failed to save config");
        } else {
            info!(path = %config_path.display(), "Generated config file for user to edit");
        }
        state
    }

    pub fn save(&self) -> Result<()> {
        validate_hotkeys(&self.hotkeys)?;
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config to TOML")?;
        fs::write(&path, contents)
            .context(format!("Failed to write config file to {}", path.display()))?;
        Ok(())
    }

    /// Replace the layout snapshot and persist
    pub fn update_layout(&mut self, categories: Vec<SavedCategory>) -> Result<()> {
        self.categories = categories;
        self.save().context("Failed to save config after layout change")
    }

    pub fn update_side(&mut self, side: Side) -> Result<()> {
        self.side_changed(side);
        self.save().context("Failed to save config after dock change")
    }

    fn side_changed(&mut self, side: Side) {
        if self.global.side != side {
            info!(?side, "dock side changed");
            self.global.side = side;
        }
    }

    /// Bind or unbind one tool's hotkey, rejecting conflicts before save
    pub fn update_hotkey(&mut self, tool: &str, combo: Option<KeyCombo>) -> Result<()> {
        let previous = match &combo {
            Some(c) => self.hotkeys.insert(tool.to_string(), c.clone()),
            None => self.hotkeys.remove(tool),
        };
        if let Err(e) = validate_hotkeys(&self.hotkeys) {
            // Roll back so in-memory state matches the file
            match previous {
                Some(p) => {
                    self.hotkeys.insert(tool.to_string(), p);
                }
                None => {
                    self.hotkeys.remove(tool);
                }
            }
            return Err(e);
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn combo(key: &str, ctrl: bool) -> KeyCombo {
        KeyCombo {
            ctrl,
            alt: false,
            shift: false,
            key: key.to_string(),
        }
    }

    #[test]
    fn defaults_are_sane() {
        let state = PersistentState::default();
        assert_eq!(state.global.side, Side::Right);
        assert_eq!(state.global.item_size, crate::constants::grid::ITEM_SIZE);
        assert!(state.categories.is_empty());
        assert!(state.hotkeys.is_empty());
    }

    #[test]
    fn toml_round_trip_preserves_layout_order() {
        let mut state = PersistentState::default();
        state.categories = vec![
            SavedCategory {
                name: cfg::RESERVED_CATEGORY.into(),
                items: vec![SavedItem {
                    label: "doc".into(),
                    path: PathBuf::from("/tmp/doc.txt"),
                    original_path: PathBuf::from("/home/u/doc.txt"),
                    owned_copy: true,
                }],
            },
            SavedCategory {
                name: "Work".into(),
                items: Vec::new(),
            },
        ];
        state.hotkeys.insert("capture".into(), combo("F9", true));

        let text = toml::to_string_pretty(&state).unwrap();
        let back: PersistentState = toml::from_str(&text).unwrap();
        assert_eq!(back.categories, state.categories);
        assert_eq!(back.hotkeys, state.hotkeys);
        assert_eq!(back.global.side, state.global.side);
    }

    #[test]
    fn legacy_flat_items_deserialize() {
        let text = r#"
[[items]]
label = "old"
path = "/tmp"
original_path = "/tmp"
"#;
        let state: PersistentState = toml::from_str(text).unwrap();
        assert_eq!(state.items.len(), 1);
        assert!(!state.items[0].owned_copy);
    }

    #[test]
    fn hotkey_conflicts_are_rejected() {
        let mut map = HashMap::new();
        map.insert("capture".to_string(), combo("F9", true));
        map.insert("record".to_string(), combo("F10", true));
        assert!(validate_hotkeys(&map).is_ok());

        map.insert("annotate".to_string(), combo("F9", true));
        assert!(validate_hotkeys(&map).is_err());
    }

    #[test]
    fn same_key_different_modifiers_is_fine() {
        let mut map = HashMap::new();
        map.insert("capture".to_string(), combo("F9", true));
        map.insert("record".to_string(), combo("F9", false));
        assert!(validate_hotkeys(&map).is_ok());
    }

    #[test]
    fn clamping_repairs_out_of_range_values() {
        let mut state = PersistentState::default();
        state.global.corner_radius = 500;
        state.global.item_size = 2;
        state.global.text_size = 900.0;
        state.validate_and_clamp();
        assert_eq!(state.global.corner_radius, cfg::MAX_CORNER_RADIUS);
        assert_eq!(state.global.item_size, default_item_size());
        assert_eq!(state.global.text_size, default_text_size());
    }
}
