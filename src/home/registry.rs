//! Home Registry
//!
//! Maps every regular file under the root directory (as a `/`-separated path
//! relative to the root) to its digest. Discovery order is preserved so the
//! master can hand files out in the order the scan found them.

use super::types::{FileDigests, HomeError, HomeState};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub struct Home {
    root: PathBuf,
    loaded: bool,
    /// Relative paths in scan order.
    discovered: Vec<String>,
    digests: HashMap<String, Option<String>>,
}

impl Home {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loaded: false,
            discovered: Vec::new(),
            digests: HashMap::new(),
        }
    }

    /// Builds an already-loaded registry from a known list of relative paths.
    pub fn from_paths<I, S>(root: impl Into<PathBuf>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut home = Self::new(root);
        for path in paths {
            home.insert(path.into());
        }
        home.loaded = true;
        home
    }

    /// Walks the root directory once and registers every regular file.
    ///
    /// Entries are visited sorted by file name so the scan order is stable.
    /// Symlinks to files are registered under their own name; symlinked
    /// directories are not followed. Unreadable entries are logged and skipped.
    /// Calling this a second time is a programming error and returns
    /// `HomeError::AlreadyLoaded`.
    pub fn load(&mut self) -> Result<(), HomeError> {
        if self.loaded {
            return Err(HomeError::AlreadyLoaded);
        }
        if !self.root.is_dir() {
            return Err(HomeError::RootNotADirectory(self.root.clone()));
        }

        tracing::info!("Loading home files from {}", self.root.display());

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under home: {}", e);
                    continue;
                }
            };

            if !Self::is_regular_file(&entry) {
                continue;
            }

            match self.relative_path(entry.path()) {
                Some(path) => self.insert(path),
                None => tracing::warn!(
                    "Skipping entry outside of home: {}",
                    entry.path().display()
                ),
            }
        }

        self.loaded = true;
        tracing::info!("Home files loaded: {} files", self.discovered.len());
        Ok(())
    }

    /// Regular files, plus symlinks whose target is a regular file.
    /// Directory symlinks are never descended into.
    fn is_regular_file(entry: &DirEntry) -> bool {
        if entry.file_type().is_file() {
            return true;
        }
        entry.path_is_symlink()
            && fs::metadata(entry.path())
                .map(|metadata| metadata.is_file())
                .unwrap_or(false)
    }

    fn insert(&mut self, path: String) {
        if self.digests.insert(path.clone(), None).is_none() {
            self.discovered.push(path);
        }
    }

    fn relative_path(&self, full_path: &Path) -> Option<String> {
        let relative = full_path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Records a digest for `path`, replacing any earlier one.
    ///
    /// This is the only place digests change. Unknown paths are ignored;
    /// callers check `exists` first.
    pub fn set_digest(&mut self, path: &str, digest: impl Into<String>) {
        if let Some(slot) = self.digests.get_mut(path) {
            *slot = Some(digest.into());
        }
    }

    pub fn digest(&self, path: &str) -> Option<&str> {
        self.digests.get(path).and_then(|digest| digest.as_deref())
    }

    pub fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.digests.contains_key(path)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Registered paths in scan order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.discovered.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.discovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty()
    }

    pub fn state(&self) -> HomeState {
        HomeState {
            total: self.digests.len(),
            finished: self.digests.values().filter(|d| d.is_some()).count(),
        }
    }

    /// True once every registered file has a digest.
    pub fn is_finished(&self) -> bool {
        self.digests.values().all(Option::is_some)
    }

    pub fn snapshot(&self) -> FileDigests {
        self.digests
            .iter()
            .map(|(path, digest)| (path.clone(), digest.clone()))
            .collect()
    }
}
