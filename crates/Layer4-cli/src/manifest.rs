//! Warm manifest parsing
//!
//! ```json
//! [
//!   {"text": "안녕하세요", "path": "audio/hello.mp3"},
//!   {"text": "Goodbye", "path": "/abs/bye.mp3"}
//! ]
//! ```
//!
//! Relative paths resolve against the manifest's directory.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub text: String,
    pub path: PathBuf,
}

/// Read the manifest and resolve every path
pub fn load(manifest: &Path) -> anyhow::Result<Vec<ManifestEntry>> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
    let mut entries: Vec<ManifestEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest {}", manifest.display()))?;

    let base = manifest.parent().unwrap_or_else(|| Path::new("."));
    for entry in &mut entries {
        if entry.path.is_relative() {
            entry.path = base.join(&entry.path);
        }
    }
    Ok(entries)
}
