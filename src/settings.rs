use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(rename = "bb_theme", default, skip_serializing_if = "Option::is_none")]
    theme: Option<Theme>,
}

/// Theme preference persisted as a small JSON file. No stored preference
/// means "follow the OS".
#[derive(Debug)]
pub struct ThemeStore {
    path: PathBuf,
    selected: Option<Theme>,
}

impl ThemeStore {
    /// Opens the store; a missing or unreadable file starts without a preference.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let selected = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<StoredSettings>(&raw).ok())
            .and_then(|settings| settings.theme);
        debug!("Theme preference from {:?}: {:?}", path, selected);
        Self { path, selected }
    }

    pub fn selected(&self) -> Option<Theme> {
        self.selected
    }

    pub fn effective(&self, os_theme: Theme) -> Theme {
        self.selected.unwrap_or(os_theme)
    }

    /// light → dark → follow OS → light.
    pub fn toggle(&mut self) -> Result<Option<Theme>> {
        let next = match self.selected {
            Some(Theme::Light) => Some(Theme::Dark),
            Some(Theme::Dark) => None,
            None => Some(Theme::Light),
        };
        self.set(next)?;
        Ok(next)
    }

    pub fn set(&mut self, theme: Option<Theme>) -> Result<()> {
        let raw = serde_json::to_string(&StoredSettings { theme })?;
        fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write settings to {:?}", self.path))?;
        self.selected = theme;
        Ok(())
    }
}
