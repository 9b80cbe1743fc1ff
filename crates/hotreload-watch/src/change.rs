//! Change kinds and grouped change sets.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use serde::Serialize;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// File was created.
    Added,
    /// File content or metadata was modified.
    Modified,
    /// File was removed.
    Deleted,
}

impl ChangeKind {
    /// Label used in logs and serialized change sets.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    /// Classify a notify event into per-path changes.
    ///
    /// The old name of a renamed file counts as deleted and the new name as
    /// added, so a temporary file renamed over its target disappears from
    /// the batch. Irrelevant event kinds (e.g., Access) yield nothing.
    pub(crate) fn from_notify(event: &Event) -> Vec<(Self, &Path)> {
        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                Self::Added
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                Self::Deleted
            }
            // Paired renames are also delivered as separate From and To events
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
            // The backend does not say which side of the rename a path is on
            EventKind::Modify(ModifyKind::Name(_)) => {
                return event
                    .paths
                    .iter()
                    .map(|path| {
                        let kind = if fs::symlink_metadata(path).is_ok() {
                            Self::Added
                        } else {
                            Self::Deleted
                        };
                        (kind, path.as_path())
                    })
                    .collect();
            }
            EventKind::Modify(_) => Self::Modified,
            _ => return Vec::new(),
        };

        event
            .paths
            .iter()
            .map(|path| (kind, path.as_path()))
            .collect()
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths that changed within one aggregation window, grouped by kind.
///
/// Only kinds that actually occurred have an entry. Within a kind, paths keep
/// the order in which their events were observed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: BTreeMap<ChangeKind, Vec<String>>,
}

impl ChangeSet {
    /// Group a batch of raw events by kind.
    ///
    /// Every entry of the batch ends up in the change set: runs of the same
    /// kind that are interrupted by other kinds are appended, not replaced.
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = (ChangeKind, PathBuf)>,
    {
        let mut changes: BTreeMap<ChangeKind, Vec<String>> = BTreeMap::new();
        for (kind, path) in events {
            changes
                .entry(kind)
                .or_default()
                .push(path.to_string_lossy().into_owned());
        }
        Self { changes }
    }

    /// Paths recorded for `kind`, if any.
    #[must_use]
    pub fn get(&self, kind: ChangeKind) -> Option<&[String]> {
        self.changes.get(&kind).map(Vec::as_slice)
    }

    /// Iterate over `(kind, paths)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ChangeKind, &[String])> + '_ {
        self.changes
            .iter()
            .map(|(kind, paths)| (*kind, paths.as_slice()))
    }

    /// Kinds present in this change set.
    pub fn kinds(&self) -> impl Iterator<Item = ChangeKind> + '_ {
        self.changes.keys().copied()
    }

    /// All paths, flattened across kinds.
    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.changes.values().flatten().map(String::as_str)
    }

    /// Total number of paths across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
