//! Precache manifest generation from a build output directory.

use crate::domain::{ManifestError, PrecacheEntry, PrecacheManifest};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "css", "ico", "png", "svg", "woff2"];
pub const DEFAULT_IGNORES: &[&str] = &["sw.js", "sw-src.js"];
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Hex characters of the content digest kept as the revision
const REVISION_LEN: usize = 32;

/// A file left out because of its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestReport {
    pub manifest: PrecacheManifest,
    /// Bytes across included files
    pub total_size: u64,
    pub skipped: Vec<SkippedFile>,
}

impl ManifestReport {
    pub fn count(&self) -> usize {
        self.manifest.len()
    }
}

/// Scans a directory for precacheable assets.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    extensions: Vec<String>,
    ignores: Vec<String>,
    max_file_size: u64,
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            ignores: DEFAULT_IGNORES.iter().map(|i| i.to_string()).collect(),
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the extension list. Extensions are bare: `js`, not `.js`.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions: Vec<String> = extensions.into_iter().map(Into::into).collect();
        if let Some(bad) = extensions
            .iter()
            .find(|e| e.is_empty() || e.contains(['.', '/', '*']))
        {
            return Err(ManifestError::InvalidPattern(format!(
                "extension '{}' must be bare, like 'js'",
                bad
            )));
        }
        self.extensions = extensions;
        Ok(self)
    }

    /// Paths relative to the scanned directory that are never included.
    pub fn with_ignores<I, S>(mut self, ignores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignores = ignores.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Walk `dir` and build a manifest sorted by URL.
    pub fn scan(&self, dir: &Path) -> Result<ManifestReport, ManifestError> {
        let mut files = Vec::new();
        collect_files(dir, dir, &mut files)?;

        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let mut total_size = 0u64;

        for (path, relative) in files {
            if !self.is_candidate(&relative) {
                continue;
            }

            let url = format!("/{}", relative);
            let size = fs::metadata(&path)
                .map_err(|e| ManifestError::io(&path, e))?
                .len();
            if size > self.max_file_size {
                warn!(url = %url, size, limit = self.max_file_size, "Skipping file over precache size limit");
                skipped.push(SkippedFile { url, size });
                continue;
            }

            let contents = fs::read(&path).map_err(|e| ManifestError::io(&path, e))?;
            entries.push(PrecacheEntry::new(url, Some(revision_of(&contents))));
            total_size += size;
        }

        entries.sort();
        let report = ManifestReport {
            manifest: PrecacheManifest::new(entries),
            total_size,
            skipped,
        };
        info!(
            dir = %dir.display(),
            count = report.count(),
            total_bytes = report.total_size,
            "Precache manifest generated"
        );
        Ok(report)
    }

    fn is_candidate(&self, relative: &str) -> bool {
        if self.ignores.iter().any(|i| i == relative) {
            return false;
        }
        Path::new(relative)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// Content revision: leading hex digits of the SHA-256 digest.
pub fn revision_of(contents: &[u8]) -> String {
    let mut hex = hex::encode(Sha256::digest(contents));
    hex.truncate(REVISION_LEN);
    hex
}

/// Regular files under `dir` as (path, `/`-joined relative path). Dotfiles
/// and dot-directories are skipped.
fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(PathBuf, String)>,
) -> Result<(), ManifestError> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ManifestError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(|e| ManifestError::io(dir, e))?;
    children.sort();

    for path in children {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if hidden {
            continue;
        }

        let metadata = fs::metadata(&path).map_err(|e| ManifestError::io(&path, e))?;
        if metadata.is_dir() {
            collect_files(root, &path, out)?;
        } else if metadata.is_file() {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            out.push((path, relative));
        }
    }
    Ok(())
}
