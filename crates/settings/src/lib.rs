//! Flat `key = value` settings store backing `wayshaders.conf`.
//!
//! The format is deliberately tiny: one entry per line, whitespace around keys and
//! values is trimmed, blank lines and lines without `=` are skipped. There is no
//! schema or versioning; typed accessors only parse integers and strings. Missing keys
//! resolve to caller-supplied defaults and are remembered so the resolved file can be
//! written back on first run.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("setting '{key}' expects an integer, found '{value}'")]
    InvalidInteger { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses settings text. Malformed lines are skipped rather than rejected.
    pub fn parse(input: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in input.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            entries.insert(key.to_string(), value.trim().to_string());
        }
        Self {
            entries,
            dirty: false,
        }
    }

    /// Loads settings from disk, returning `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, SettingsError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(Self::parse(&contents))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Serialises every entry as `key = value`, sorted by key.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn save(&mut self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| SettingsError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, self.to_text()).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        self.dirty = false;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_int(&self, key: &str, default: i64) -> Result<i64, SettingsError> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| SettingsError::InvalidInteger {
                    key: key.to_string(),
                    value: raw.clone(),
                }),
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.set_string(key, &value.to_string());
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if previous.as_deref() != Some(value) {
            self.dirty = true;
        }
    }

    /// Returns the stored string, inserting `default` when the key is absent.
    pub fn string_or_insert(&mut self, key: &str, default: &str) -> String {
        if let Some(value) = self.entries.get(key) {
            return value.clone();
        }
        self.set_string(key, default);
        default.to_string()
    }

    /// Returns the stored integer, inserting `default` when the key is absent.
    ///
    /// A present but unparsable value is left untouched and reported as an error so
    /// the caller can fall back without clobbering what the user wrote.
    pub fn int_or_insert(&mut self, key: &str, default: i64) -> Result<i64, SettingsError> {
        if !self.contains(key) {
            self.set_int(key, default);
            return Ok(default);
        }
        self.get_int(key, default)
    }

    /// True when entries were added or changed since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
