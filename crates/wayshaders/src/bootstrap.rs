//! Resolves `wayshaders.conf` into renderer options, writing defaults back on first run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use renderer::{LayerOptions, WrapMode, WrapModes};
use settings::Settings;

pub const SETTINGS_FILE_NAME: &str = "wayshaders.conf";

const DEFAULT_CLASS: &str = "wayshaders";

/// Settings plus where they live on disk.
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    existed: bool,
}

impl SettingsStore {
    pub fn open(path: &Path) -> Result<Self> {
        let loaded = Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        let existed = loaded.is_some();
        Ok(Self {
            path: path.to_path_buf(),
            settings: loaded.unwrap_or_default(),
            existed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `debug` is read before logging exists, so a bad value is returned rather than logged.
    pub fn debug(&mut self) -> (bool, Option<String>) {
        match self.settings.int_or_insert("debug", 0) {
            Ok(value) => (value != 0, None),
            Err(err) => (false, Some(err.to_string())),
        }
    }

    pub fn class(&mut self) -> String {
        let class = self.settings.string_or_insert("class", DEFAULT_CLASS);
        if class.is_empty() {
            tracing::warn!("empty 'class' setting; using {DEFAULT_CLASS}");
            return DEFAULT_CLASS.to_string();
        }
        class
    }

    /// Options for layers `0..count`. Invalid values fall back to defaults with a warning.
    pub fn layer_options(&mut self, count: usize) -> Vec<LayerOptions> {
        (0..count)
            .map(|index| LayerOptions {
                wrap: WrapModes::new(
                    self.wrap_mode(&format!("wrap_s{index}")),
                    self.wrap_mode(&format!("wrap_t{index}")),
                ),
                enabled: self.enabled(index),
            })
            .collect()
    }

    fn wrap_mode(&mut self, key: &str) -> WrapMode {
        let default = WrapMode::default();
        let raw = self.settings.string_or_insert(key, default.name());
        WrapMode::parse(&raw).unwrap_or_else(|| {
            tracing::warn!(key, value = %raw, "unknown wrap mode; using {default}");
            default
        })
    }

    fn enabled(&mut self, index: usize) -> bool {
        let key = format!("enabled{index}");
        match self.settings.int_or_insert(&key, 1) {
            Ok(value) => value != 0,
            Err(err) => {
                tracing::warn!("{err}; layer {index} stays enabled");
                true
            }
        }
    }

    /// Writes the resolved settings when the file is new or a default was filled in.
    pub fn persist(&mut self) -> Result<()> {
        if self.existed && !self.settings.is_dirty() {
            return Ok(());
        }
        self.settings
            .save(&self.path)
            .with_context(|| format!("failed to save settings to {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "saved settings");
        self.existed = true;
        Ok(())
    }
}
