//! Ordered, duplicate-free list of directories the application is loaded from.
//!
//! The list is a plain value handed to the supervisor at launch; nothing here
//! touches process-wide state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from `entries` as given, dropping repeats.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut search_path = Self::new();
        for entry in entries {
            if !search_path.contains(&entry) {
                search_path.entries.push(entry);
            }
        }
        search_path
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry == path)
    }

    /// Inserts each directory at the front, in order, so the last one given
    /// ends up first. Paths are made absolute; ones already present are kept
    /// where they are.
    pub fn prepend_all(&mut self, directories: &[PathBuf]) -> Result<()> {
        for directory in directories {
            let absolute = std::path::absolute(directory).with_context(|| {
                format!("failed to resolve search path entry {}", directory.display())
            })?;
            if !self.contains(&absolute) {
                self.entries.insert(0, absolute);
            }
        }
        Ok(())
    }

    /// Copy of this list with `directories` prepended.
    pub fn with_prepended(&self, directories: &[PathBuf]) -> Result<Self> {
        let mut search_path = self.clone();
        search_path.prepend_all(directories)?;
        Ok(search_path)
    }
}
