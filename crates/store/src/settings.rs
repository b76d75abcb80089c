//! Editor settings
//!
//! Settings are plain data loaded from a JSON file and handed to a
//! session explicitly. Every field has a default, so a partial file or a
//! file from an older version still loads.

use crate::{ExportOptions, Result};
use revisions::ViewMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// All editor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EditorSettings {
    pub history: HistorySettings,
    pub autosave: AutosaveSettings,
    pub review: ReviewSettings,
    pub export: ExportSettings,
}

/// Undo history limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistorySettings {
    /// Maximum number of undo entries kept
    pub max_depth: usize,
    /// Maximum number of operations merged into one coalesced entry
    pub coalesce_window: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_depth: 100,
            coalesce_window: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutosaveSettings {
    pub enabled: bool,
    /// Seconds between saves
    pub interval_secs: u64,
    /// Versions kept per document, oldest pruned first
    pub max_versions: usize,
    /// Directory for auto-save files, relative paths are resolved by the caller
    pub location: PathBuf,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            max_versions: 5,
            location: PathBuf::from(".autosave"),
        }
    }
}

impl AutosaveSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = location.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReviewSettings {
    /// Author recorded on tracked changes and comments
    pub default_author: String,
    /// View used for exports unless one is requested
    pub default_view: ViewMode,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            default_author: "Author".to_string(),
            default_view: ViewMode::Final,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportSettings {
    pub compress_pdf_streams: bool,
    pub pretty_xml: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            compress_pdf_streams: true,
            pretty_xml: false,
        }
    }
}

impl EditorSettings {
    /// Export options for a view, or the configured default view
    pub fn export_options(&self, view: Option<ViewMode>) -> ExportOptions {
        ExportOptions {
            view: view.unwrap_or(self.review.default_view),
            compress: self.export.compress_pdf_streams,
            pretty: self.export.pretty_xml,
        }
    }

    fn parse(content: &str, path: &Path) -> Self {
        match serde_json::from_str::<EditorSettings>(content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to parse settings file, using defaults: {}", e);
                Self::default()
            }
        }
    }
}

/// Loads, caches and saves [`EditorSettings`]
pub struct SettingsManager {
    settings_path: PathBuf,
    current: EditorSettings,
}

impl SettingsManager {
    /// Settings stored as `settings.json` in a directory
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self::with_path(config_dir.as_ref().join("settings.json"))
    }

    /// Settings stored at an explicit file path
    pub fn with_path(settings_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
            current: EditorSettings::default(),
        }
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk. A missing or unreadable file gives defaults.
    pub async fn load(&mut self) -> &EditorSettings {
        self.current = match tokio::fs::read_to_string(&self.settings_path).await {
            Ok(content) => EditorSettings::parse(&content, &self.settings_path),
            Err(e) => {
                self.warn_unreadable(&e);
                EditorSettings::default()
            }
        };
        &self.current
    }

    /// Load settings synchronously
    pub fn load_sync(&mut self) -> &EditorSettings {
        self.current = match std::fs::read_to_string(&self.settings_path) {
            Ok(content) => EditorSettings::parse(&content, &self.settings_path),
            Err(e) => {
                self.warn_unreadable(&e);
                EditorSettings::default()
            }
        };
        &self.current
    }

    fn warn_unreadable(&self, err: &std::io::Error) {
        tracing::warn!(
            path = %self.settings_path.display(),
            "Settings file not readable, using defaults: {}",
            err
        );
    }

    /// Save current settings to disk
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.current)?;
        tokio::fs::write(&self.settings_path, content).await?;
        Ok(())
    }

    pub fn save_sync(&self) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.current)?;
        std::fs::write(&self.settings_path, content)?;
        Ok(())
    }

    pub fn get(&self) -> &EditorSettings {
        &self.current
    }

    /// Replace settings and save to disk
    pub async fn update(&mut self, settings: EditorSettings) -> Result<()> {
        self.current = settings;
        self.save().await
    }

    pub fn update_sync(&mut self, settings: EditorSettings) -> Result<()> {
        self.current = settings;
        self.save_sync()
    }

    /// Reset settings to defaults and save
    pub async fn reset(&mut self) -> Result<&EditorSettings> {
        self.current = EditorSettings::default();
        self.save().await?;
        Ok(&self.current)
    }

    pub fn reset_sync(&mut self) -> Result<&EditorSettings> {
        self.current = EditorSettings::default();
        self.save_sync()?;
        Ok(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = EditorSettings::default();

        assert_eq!(settings.history.max_depth, 100);
        assert_eq!(settings.history.coalesce_window, 20);

        assert!(settings.autosave.enabled);
        assert_eq!(settings.autosave.interval_secs, 300);
        assert_eq!(settings.autosave.max_versions, 5);
        assert_eq!(settings.autosave.location, PathBuf::from(".autosave"));

        assert_eq!(settings.review.default_view, ViewMode::Final);

        assert!(settings.export.compress_pdf_streams);
        assert!(!settings.export.pretty_xml);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{ "history": { "max_depth": 10 }, "review": { "default_view": "markup" } }"#;
        let settings = EditorSettings::parse(json, Path::new("settings.json"));
        assert_eq!(settings.history.max_depth, 10);
        assert_eq!(settings.history.coalesce_window, 20);
        assert_eq!(settings.review.default_view, ViewMode::Markup);
        assert_eq!(settings.autosave, AutosaveSettings::default());
    }

    #[test]
    fn test_export_options_follow_settings() {
        let mut settings = EditorSettings::default();
        settings.export.pretty_xml = true;
        settings.export.compress_pdf_streams = false;
        settings.review.default_view = ViewMode::Original;

        let options = settings.export_options(None);
        assert_eq!(options.view, ViewMode::Original);
        assert!(!options.compress);
        assert!(options.pretty);
        assert_eq!(settings.export_options(Some(ViewMode::Markup)).view, ViewMode::Markup);
    }

    #[test]
    fn test_settings_manager_load_save_sync() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SettingsManager::new(temp_dir.path());

        // Missing file gives defaults
        assert_eq!(manager.load_sync(), &EditorSettings::default());

        let mut new_settings = EditorSettings::default();
        new_settings.review.default_author = "alice".to_string();
        new_settings.autosave.max_versions = 2;
        manager.update_sync(new_settings).unwrap();

        let mut manager2 = SettingsManager::new(temp_dir.path());
        let loaded = manager2.load_sync();
        assert_eq!(loaded.review.default_author, "alice");
        assert_eq!(loaded.autosave.max_versions, 2);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("settings.json"), "{ not json").unwrap();

        let mut manager = SettingsManager::new(temp_dir.path());
        assert_eq!(manager.load_sync(), &EditorSettings::default());
    }

    #[test]
    fn test_settings_manager_reset_sync() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SettingsManager::new(temp_dir.path());

        let mut new_settings = EditorSettings::default();
        new_settings.history.max_depth = 3;
        manager.update_sync(new_settings).unwrap();

        let settings = manager.reset_sync().unwrap();
        assert_eq!(settings.history.max_depth, 100);
    }

    #[tokio::test]
    async fn test_settings_manager_async() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SettingsManager::with_path(temp_dir.path().join("nested/editor.json"));

        manager.load().await;

        let mut new_settings = EditorSettings::default();
        new_settings.autosave.interval_secs = 120;
        manager.update(new_settings).await.unwrap();

        let mut manager2 = SettingsManager::with_path(temp_dir.path().join("nested/editor.json"));
        let loaded = manager2.load().await;
        assert_eq!(loaded.autosave.interval_secs, 120);
        assert_eq!(loaded.autosave.interval(), Duration::from_secs(120));
    }
}
