//! Persistent work queue: a durable, priority-ordered store of work items.
//!
//! The whole queue lives in memory and is written to a single JSON file
//! (`{"items": [...]}`) after every mutation. Items are ranked by priority
//! (critical first), then tier (lower first), then discovery time (older
//! first). When the queue is full, one member is evicted to make room for a
//! new item: the lowest-ranked finished item (completed, failed or escalated)
//! if there is one, otherwise the lowest-ranked item overall.
//!
//! Loading is forgiving: a missing, unreadable or corrupted file yields an
//! empty queue and a warning. Writing is not: a failed persist is returned to
//! the caller and the in-memory state is left as it was.

use chrono::{DateTime, Utc};
use nightshift_core::error::QueueError;
use nightshift_core::work::{DiscoveredWork, Priority, Tier, WorkStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default upper bound on queued items.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// On-disk layout of the queue file.
#[derive(Debug, Default, Deserialize)]
struct QueueFile {
    #[serde(default)]
    items: Vec<DiscoveredWork>,
}

#[derive(Serialize)]
struct QueueFileRef<'a> {
    items: &'a [DiscoveredWork],
}

/// Ordering key shared by selection and eviction.
fn rank(work: &DiscoveredWork) -> (Priority, Tier, DateTime<Utc>) {
    (work.priority, work.tier, work.discovered_at)
}

fn compare(a: &DiscoveredWork, b: &DiscoveredWork) -> Ordering {
    rank(a).cmp(&rank(b))
}

/// Aggregate counts over the queue contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: usize,
    pub by_status: BTreeMap<WorkStatus, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    pub by_tier: BTreeMap<Tier, usize>,
}

impl QueueStats {
    pub fn count(&self, status: WorkStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn pending(&self) -> usize {
        self.count(WorkStatus::Pending)
    }

    pub fn in_progress(&self) -> usize {
        self.count(WorkStatus::InProgress)
    }
}

/// A bounded work queue persisted to a JSON file.
///
/// The queue is the sole owner of its file. It is not safe to run two
/// instances against the same path: each holds its own in-memory copy and
/// the last writer wins.
#[derive(Debug)]
pub struct PersistentQueue {
    path: PathBuf,
    max_items: usize,
    items: Vec<DiscoveredWork>,
}

impl PersistentQueue {
    /// Open the queue at `path`, loading any existing items.
    ///
    /// A `max_items` of zero is treated as one.
    pub fn open(path: impl Into<PathBuf>, max_items: usize) -> Self {
        let path = path.into();
        let items = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = items.len(), "Work queue loaded");
        Self {
            path,
            max_items: max_items.max(1),
            items,
        }
    }

    fn load_from_disk(path: &Path) -> Vec<DiscoveredWork> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Work queue unreadable, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<QueueFile>(&content) {
            Ok(file) => file.items,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Work queue corrupted, starting empty");
                Vec::new()
            }
        }
    }

    /// Replace the in-memory state with whatever is on disk now.
    pub fn reload(&mut self) {
        self.items = Self::load_from_disk(&self.path);
    }

    /// Write `items` to disk via a temp file and rename.
    fn persist(&self, items: &[DiscoveredWork]) -> Result<(), QueueError> {
        let persist_err = |reason: String| QueueError::Persist {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| persist_err(e.to_string()))?;
            }
        }

        let json = serde_json::to_string_pretty(&QueueFileRef { items }).map_err(|e| persist_err(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| persist_err(e.to_string()))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(persist_err(e.to_string()));
        }
        Ok(())
    }

    /// Persist `items`, then make them the in-memory state.
    fn commit(&mut self, items: Vec<DiscoveredWork>) -> Result<(), QueueError> {
        self.persist(&items)?;
        self.items = items;
        Ok(())
    }

    /// Index of the member to drop when the queue is full.
    fn eviction_victim(&self) -> Option<usize> {
        let lowest = |finished: bool| {
            self.items
                .iter()
                .enumerate()
                .filter(|(_, w)| !finished || w.status.is_terminal())
                .max_by(|(_, a), (_, b)| compare(a, b))
                .map(|(idx, _)| idx)
        };
        lowest(true).or_else(|| lowest(false))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|w| w.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&DiscoveredWork> {
        self.items.iter().find(|w| w.id == id)
    }

    /// All items in rank order.
    pub fn list(&self) -> Vec<DiscoveredWork> {
        let mut items = self.items.clone();
        items.sort_by(compare);
        items
    }

    /// Insert a new item.
    ///
    /// Fails with [`QueueError::DuplicateId`] if the id is already queued. If
    /// the queue is full, a member is evicted first and returned.
    pub fn add(&mut self, work: DiscoveredWork) -> Result<Option<DiscoveredWork>, QueueError> {
        if self.contains(&work.id) {
            return Err(QueueError::DuplicateId(work.id));
        }

        let mut items = self.items.clone();
        let mut evicted = None;
        if items.len() >= self.max_items {
            if let Some(idx) = self.eviction_victim() {
                evicted = Some(items.remove(idx));
            }
        }

        let id = work.id.clone();
        let priority = work.priority;
        items.push(work);
        self.commit(items)?;

        if let Some(removed) = &evicted {
            info!(
                work_id = %removed.id,
                status = %removed.status,
                priority = %removed.priority,
                tier = %removed.tier,
                "Queue full, evicted item"
            );
        }
        debug!(work_id = %id, priority = %priority, "Queued work item");
        Ok(evicted)
    }

    /// Remove an item by id. Returns it if it was present.
    pub fn remove(&mut self, id: &str) -> Result<Option<DiscoveredWork>, QueueError> {
        let Some(idx) = self.items.iter().position(|w| w.id == id) else {
            return Ok(None);
        };
        let mut items = self.items.clone();
        let removed = items.remove(idx);
        self.commit(items)?;
        Ok(Some(removed))
    }

    /// Apply `f` to the item with `id` and persist the result.
    ///
    /// The id is preserved and the status change, if any, must be a legal
    /// lifecycle transition; otherwise nothing is written.
    pub fn update<F>(&mut self, id: &str, f: F) -> Result<DiscoveredWork, QueueError>
    where
        F: FnOnce(&mut DiscoveredWork),
    {
        let idx = self
            .items
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        let current = &self.items[idx];
        let mut next = current.clone();
        f(&mut next);
        next.id = current.id.clone();

        if !current.status.can_transition_to(next.status) {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                to: next.status,
            });
        }

        let mut items = self.items.clone();
        items[idx] = next.clone();
        self.commit(items)?;
        Ok(next)
    }

    /// Drop every item.
    pub fn clear(&mut self) -> Result<(), QueueError> {
        self.commit(Vec::new())
    }

    /// The highest-ranked pending item, if any.
    pub fn get_next_work(&self) -> Option<&DiscoveredWork> {
        self.items
            .iter()
            .filter(|w| w.is_pending())
            .min_by(|a, b| compare(a, b))
    }

    pub fn get_stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.items.len(),
            ..QueueStats::default()
        };
        for work in &self.items {
            *stats.by_status.entry(work.status).or_default() += 1;
            *stats.by_priority.entry(work.priority).or_default() += 1;
            *stats.by_tier.entry(work.tier).or_default() += 1;
        }
        stats
    }
}
