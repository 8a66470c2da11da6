//! Watched paths and their change markers.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Paths under the renderer root that trigger a reload, relative to the root.
pub const WATCHED_PATHS: [&str; 5] = [
    "config/menu.xml",
    "config/settings.xml",
    "config/default_settings.xml",
    "fonts",
    "assets",
];

/// Cheap fingerprint of a path's on-disk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Missing,
    File {
        modified: Option<SystemTime>,
        len: u64,
    },
    /// Aggregate over every file below the directory
    Dir {
        latest: Option<SystemTime>,
        files: u64,
        bytes: u64,
    },
}

impl Marker {
    pub fn read(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => dir_marker(path),
            Ok(meta) => Marker::File {
                modified: meta.modified().ok(),
                len: meta.len(),
            },
            Err(_) => Marker::Missing,
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Marker::Missing)
    }
}

fn dir_marker(root: &Path) -> Marker {
    let mut latest = None;
    let mut files = 0u64;
    let mut bytes = 0u64;
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            files += 1;
            bytes = bytes.saturating_add(meta.len());
            let modified = meta.modified().ok();
            if modified > latest {
                latest = modified;
            }
        }
    }

    Marker::Dir {
        latest,
        files,
        bytes,
    }
}

/// A path plus the marker it had at the last scan.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    path: PathBuf,
    marker: Marker,
}

impl WatchTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let marker = Marker::read(&path);
        Self { path, marker }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Re-read the marker; true when it differs from the last one.
    pub fn refresh(&mut self) -> bool {
        let marker = Marker::read(&self.path);
        if marker == self.marker {
            return false;
        }
        self.marker = marker;
        true
    }
}

/// The fixed set of targets, scanned together.
#[derive(Debug, Clone)]
pub struct WatchSet {
    targets: Vec<WatchTarget>,
}

impl WatchSet {
    pub fn for_root(root: &Path) -> Self {
        Self::from_paths(WATCHED_PATHS.iter().map(|rel| root.join(rel)))
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let targets: Vec<WatchTarget> = paths.into_iter().map(WatchTarget::new).collect();
        for target in &targets {
            if !target.marker().exists() {
                log::debug!("{} does not exist yet; watching for it", target.path().display());
            }
        }
        Self { targets }
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Paths whose marker changed since the previous scan.
    pub fn scan(&mut self) -> Vec<PathBuf> {
        self.targets
            .iter_mut()
            .filter_map(|target| target.refresh().then(|| target.path().to_path_buf()))
            .collect()
    }
}
