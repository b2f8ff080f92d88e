//! Persisted user settings and presence themes

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activity::PresenceContext;
use crate::error::{PresenceError, Result};

/// A large-image theme uploaded to the Discord application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    /// Asset key sent as `large_image_key`
    pub key: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub const THEMES: [Theme; 8] = [
    Theme {
        key: "default",
        display_name: "Default",
        description: "Standard branding",
    },
    Theme {
        key: "drawn",
        display_name: "Drawn Style",
        description: "Artistic hand-drawn appearance",
    },
    Theme {
        key: "cursed",
        display_name: "Cursed",
        description: "Dark and mysterious theme",
    },
    Theme {
        key: "energy",
        display_name: "Energy",
        description: "Electric and dynamic theme",
    },
    Theme {
        key: "water",
        display_name: "Water",
        description: "Cool blue aquatic theme",
    },
    Theme {
        key: "winter",
        display_name: "Winter",
        description: "Cold and snowy theme",
    },
    Theme {
        key: "grass",
        display_name: "Grass",
        description: "Natural green theme",
    },
    Theme {
        key: "gold",
        display_name: "Gold",
        description: "Luxurious golden theme",
    },
];

pub const DEFAULT_THEME: &str = "default";

/// Look up a theme by asset key
pub fn theme(key: &str) -> Option<&'static Theme> {
    THEMES.iter().find(|theme| theme.key == key)
}

/// User-editable presence settings, stored as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    pub enabled: bool,
    pub content_label: String,
    pub content_name: String,
    pub project_name: String,
    pub theme_key: String,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            content_label: "Avatar".to_string(),
            content_name: String::new(),
            project_name: String::new(),
            theme_key: DEFAULT_THEME.to_string(),
        }
    }
}

impl PresenceSettings {
    /// Read settings from `path`
    ///
    /// A missing file yields defaults. An unknown theme key falls back to
    /// the default theme.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(PresenceError::Settings(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };

        let mut settings: Self = serde_json::from_str(&raw).map_err(|err| {
            PresenceError::Settings(format!("failed to parse {}: {err}", path.display()))
        })?;
        if theme(&settings.theme_key).is_none() {
            log::warn!(
                target: "editor_presence",
                "Unknown theme '{}' in settings, using '{DEFAULT_THEME}'",
                settings.theme_key
            );
            settings.theme_key = DEFAULT_THEME.to_string();
        }
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|err| {
            PresenceError::Settings(format!("failed to write {}: {err}", path.display()))
        })
    }

    /// Select a theme; unknown keys are rejected
    pub fn set_theme(&mut self, key: &str) -> Result<&'static Theme> {
        let selected = theme(key).ok_or_else(|| {
            PresenceError::InvalidConfig(format!("unknown theme key '{key}'"))
        })?;
        self.theme_key = selected.key.to_string();
        Ok(selected)
    }

    pub fn theme(&self) -> Option<&'static Theme> {
        theme(&self.theme_key)
    }
}

impl PresenceContext for PresenceSettings {
    fn content_label(&self) -> &str {
        &self.content_label
    }

    fn content_name(&self) -> &str {
        &self.content_name
    }

    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn theme_key(&self) -> &str {
        &self.theme_key
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
