//! Ordered, duplicate-free search path.

use std::fmt;
use std::path::{Path, PathBuf};

/// The host's plugin search path as an insertion-ordered set.
///
/// Entries keep the order in which plugins registered; inserting an entry that
/// is already present is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut path = Self::new();
        for entry in entries {
            path.insert(entry);
        }
        path
    }

    /// Appends `entry` unless present. Returns `true` if it was added.
    pub fn insert(&mut self, entry: impl Into<PathBuf>) -> bool {
        let entry = entry.into();
        if self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, entry: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e != entry);
        self.entries.len() != before
    }

    pub fn contains(&self, entry: &Path) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, entry: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e == entry)
    }
}

/// Comma-separated, the format editors use for runtime path options.
impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", entry.display())?;
        }
        Ok(())
    }
}
