//! Filesystem side of layer discovery.
//!
//! Layers are numbered source files in one directory: `shader0.frag`, `shader1.frag`,
//! and so on, each with an optional `shader<n>.vert`. Scanning stops at the first
//! missing (or empty) fragment source, so the result is always a contiguous prefix.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn fragment_file_name(index: usize) -> String {
    format!("shader{index}.frag")
}

pub fn vertex_file_name(index: usize) -> String {
    format!("shader{index}.vert")
}

/// Raw sources for one layer, read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSource {
    pub index: usize,
    pub fragment_path: PathBuf,
    pub fragment: String,
    /// `None` when no vertex source exists; the built-in pass-through is used instead.
    pub vertex: Option<String>,
}

impl LayerSource {
    pub fn has_custom_vertex(&self) -> bool {
        self.vertex.is_some()
    }
}

/// Scans `dir` for consecutively numbered layer sources.
pub fn discover_sources(dir: &Path) -> Result<Vec<LayerSource>> {
    let mut sources = Vec::new();
    loop {
        let index = sources.len();
        let fragment_path = dir.join(fragment_file_name(index));
        let Some(fragment) = read_optional(&fragment_path)? else {
            tracing::debug!(
                dir = %dir.display(),
                count = index,
                "shader loading complete"
            );
            break;
        };

        tracing::debug!(path = %fragment_path.display(), "found fragment shader");
        let vertex_path = dir.join(vertex_file_name(index));
        let vertex = read_optional(&vertex_path)?;
        if vertex.is_some() {
            tracing::debug!(path = %vertex_path.display(), "found vertex shader");
        } else {
            tracing::debug!(
                layer = index,
                "no {} found; using default vertex shader",
                vertex_file_name(index)
            );
        }

        sources.push(LayerSource {
            index,
            fragment_path,
            fragment,
            vertex,
        });
    }
    Ok(sources)
}

/// Reads a source file, treating a missing or whitespace-only file as absent.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(None),
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read shader at {}", path.display())),
    }
}
