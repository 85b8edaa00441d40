//! Read-only browser over a BIDS dataset directory.
//!
//! Every client-supplied path is resolved relative to the dataset root and
//! must stay inside it, both lexically and after following symlinks.

use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::decode::is_nifti_name;

/// Error type for dataset browsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrowseError {
    /// The dataset root does not exist.
    #[error("BIDS directory not found: {0}")]
    RootMissing(String),

    /// The path is absolute or escapes the root.
    #[error("Invalid BIDS path: {0}")]
    InvalidPath(String),

    /// Nothing exists at the path.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// A listing was requested for a file.
    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    /// A file was requested that is not a NIfTI image.
    #[error("Only .nii or .nii.gz supported: {0}")]
    NotNifti(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Entry kind in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Directory.
    Dir,
    /// NIfTI file.
    File,
}

/// One listed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BidsEntry {
    /// File or directory name.
    pub name: String,
    /// Directory or file.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Path relative to the dataset root, `/`-separated.
    pub path: String,
    /// Size in bytes, files only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Contents of one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BidsListing {
    /// Listed directory relative to the root; empty for the root itself.
    pub path: String,
    /// Directories first, then files, each case-insensitively by name.
    pub entries: Vec<BidsEntry>,
}

/// A NIfTI file read from the dataset.
#[derive(Debug, Clone)]
pub struct BidsFile {
    /// File name.
    pub name: String,
    /// Path relative to the dataset root.
    pub path: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Browser rooted at a dataset directory.
#[derive(Debug, Clone)]
pub struct DatasetBrowser {
    root: PathBuf,
}

impl DatasetBrowser {
    /// Create a browser. The root need not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Configured dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the dataset root exists.
    pub fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    /// Resolve a client path to an existing location inside the root.
    ///
    /// `None` and the empty string name the root.
    pub fn resolve(&self, relative: Option<&str>) -> Result<PathBuf, BrowseError> {
        let root = self.canonical_root()?;
        let requested = relative.unwrap_or("").trim();
        let clean = lexical_normalize(requested)
            .ok_or_else(|| BrowseError::InvalidPath(requested.to_string()))?;

        let target = root.join(&clean);
        if !target.exists() {
            return Err(BrowseError::NotFound(requested.to_string()));
        }
        let resolved = target
            .canonicalize()
            .map_err(|e| BrowseError::Io(e.to_string()))?;
        if !resolved.starts_with(&root) {
            return Err(BrowseError::InvalidPath(requested.to_string()));
        }
        Ok(resolved)
    }

    /// List a directory.
    pub fn list(&self, relative: Option<&str>) -> Result<BidsListing, BrowseError> {
        let root = self.canonical_root()?;
        let target = self.resolve(relative)?;
        if !target.is_dir() {
            return Err(BrowseError::NotADirectory(relative.unwrap_or("").to_string()));
        }

        let read = fs::read_dir(&target).map_err(|e| BrowseError::Io(e.to_string()))?;
        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| BrowseError::Io(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let rel = relative_string(&root, &target.join(&name));
            if path.is_dir() {
                entries.push(BidsEntry {
                    name,
                    kind: EntryKind::Dir,
                    path: rel,
                    size: None,
                });
            } else if path.is_file() && is_nifti_name(&name) {
                let size = entry
                    .metadata()
                    .map(|m| m.len())
                    .map_err(|e| BrowseError::Io(e.to_string()))?;
                entries.push(BidsEntry {
                    name,
                    kind: EntryKind::File,
                    path: rel,
                    size: Some(size),
                });
            }
        }

        entries.sort_by(|a, b| {
            (a.kind == EntryKind::File, a.name.to_lowercase())
                .cmp(&(b.kind == EntryKind::File, b.name.to_lowercase()))
        });

        tracing::debug!(
            path = %target.display(),
            entries = entries.len(),
            "bids directory listed"
        );

        Ok(BidsListing {
            path: relative_string(&root, &target),
            entries,
        })
    }

    /// Read a NIfTI file.
    pub fn read_file(&self, relative: &str) -> Result<BidsFile, BrowseError> {
        let root = self.canonical_root()?;
        let target = self.resolve(Some(relative))?;
        if !target.is_file() {
            return Err(BrowseError::NotFound(relative.to_string()));
        }
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_nifti_name(&name) {
            return Err(BrowseError::NotNifti(relative.to_string()));
        }

        let bytes = fs::read(&target).map_err(|e| BrowseError::Io(e.to_string()))?;
        Ok(BidsFile {
            name,
            path: relative_string(&root, &target),
            bytes,
        })
    }

    fn canonical_root(&self) -> Result<PathBuf, BrowseError> {
        self.root
            .canonicalize()
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| BrowseError::RootMissing(self.root.display().to_string()))
    }
}

/// Collapse `.` and `..` without touching the filesystem.
///
/// Returns `None` for absolute paths and for paths that climb above the
/// starting directory.
fn lexical_normalize(path: &str) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}

fn relative_string(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}
