// Membership cache: which posts the session user has liked or reposted.
//
// Read by every view to render button state; written only by the toggle
// controller (after an optimistic flip or a server answer) and by a
// rebuild from the server's relation list. Persisted as a small JSON file
// so a restarted client renders correct state before the first sync.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::models::RelationKind;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    like: Vec<i64>,
    #[serde(default)]
    repost: Vec<i64>,
}

#[derive(Debug, Default)]
struct Sets {
    like: HashSet<i64>,
    repost: HashSet<i64>,
}

impl Sets {
    fn of(&mut self, kind: RelationKind) -> &mut HashSet<i64> {
        match kind {
            RelationKind::Like => &mut self.like,
            RelationKind::Repost => &mut self.repost,
        }
    }
}

#[derive(Debug, Default)]
pub struct MembershipCache {
    sets: Mutex<Sets>,
    path: Option<PathBuf>,
}

impl MembershipCache {
    /// Empty cache that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty cache; an unreadable
    /// one is logged and discarded, since the server can rebuild it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Snapshot>(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Discarding corrupt membership cache");
                Snapshot::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read membership cache");
                Snapshot::default()
            }
        };

        let sets = Sets {
            like: snapshot.like.into_iter().collect(),
            repost: snapshot.repost.into_iter().collect(),
        };
        Self {
            sets: Mutex::new(sets),
            path: Some(path),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sets> {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has(&self, kind: RelationKind, post_id: i64) -> bool {
        self.lock().of(kind).contains(&post_id)
    }

    /// Post ids for one kind, sorted.
    pub fn ids(&self, kind: RelationKind) -> Vec<i64> {
        let mut ids: Vec<i64> = self.lock().of(kind).iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Record a relation state. Returns the previous state.
    pub(crate) fn set(&self, kind: RelationKind, post_id: i64, active: bool) -> bool {
        let mut sets = self.lock();
        let set = sets.of(kind);
        if active {
            !set.insert(post_id)
        } else {
            set.remove(&post_id)
        }
    }

    /// Replace one kind's set wholesale with the server's answer.
    pub(crate) fn rebuild(&self, kind: RelationKind, ids: impl IntoIterator<Item = i64>) {
        let mut sets = self.lock();
        *sets.of(kind) = ids.into_iter().collect();
        debug!(kind = %kind, count = sets.of(kind).len(), "Membership cache rebuilt");
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the cache to its file, if it has one.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            like: self.ids(RelationKind::Like),
            repost: self.ids(RelationKind::Repost),
        };
        let json = serde_json::to_string(&snapshot)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}
