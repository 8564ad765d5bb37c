//! Working set for one removal: the requested statuses, their reblogs, and
//! everything fan-out needs once the rows are gone.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};

use murmur_db::Database;
use murmur_types::events::StreamEvent;
use murmur_types::models::{Account, Status, StatusId};

/// One status with its data captured before destruction.
#[derive(Debug, Clone)]
pub struct Entry {
    pub status: Status,
    pub mentions: Vec<Account>,
    pub tags: Vec<String>,
    /// Serialized delete event, built once and reused for every channel.
    pub payload: String,
}

#[derive(Debug, Default)]
pub struct WorkingSet {
    entries: Vec<Entry>,
}

impl WorkingSet {
    /// Resolve `ids`, expand each status with its reblogs and capture
    /// mentions, tags and delete payloads.
    ///
    /// Order: each requested status followed by its reblogs. Every status
    /// appears once, however many times it was requested or reached.
    pub fn load(db: &Database, ids: &[StatusId]) -> Result<Self> {
        let roots = db.find_statuses(ids)?;
        let root_ids: Vec<StatusId> = roots.iter().map(|s| s.id).collect();

        let mut reblogs_by_original: HashMap<StatusId, Vec<Status>> = HashMap::new();
        for reblog in db.find_reblogs(&root_ids)? {
            if let Some(original) = reblog.reblog_of_id {
                reblogs_by_original.entry(original).or_default().push(reblog);
            }
        }

        let mut seen = HashSet::new();
        let mut statuses = Vec::new();
        for root in roots {
            let reblogs = reblogs_by_original.remove(&root.id).unwrap_or_default();
            for status in std::iter::once(root).chain(reblogs) {
                if seen.insert(status.id) {
                    statuses.push(status);
                }
            }
        }

        let all_ids: Vec<StatusId> = statuses.iter().map(|s| s.id).collect();
        let mut mentions = db.get_active_mentions(&all_ids)?;
        let mut tags = db.get_tag_names(&all_ids)?;

        let entries = statuses
            .into_iter()
            .map(|status| {
                let payload = StreamEvent::delete(status.id)
                    .to_json()
                    .with_context(|| format!("serialize delete event for {}", status.id))?;
                Ok(Entry {
                    mentions: mentions.remove(&status.id).unwrap_or_default(),
                    tags: tags.remove(&status.id).unwrap_or_default(),
                    payload,
                    status,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn get(&self, id: StatusId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.status.id == id)
    }

    pub fn ids(&self) -> Vec<StatusId> {
        self.entries.iter().map(|e| e.status.id).collect()
    }

    pub fn mark_for_mass_destruction(&mut self) {
        for entry in &mut self.entries {
            entry.status.mark_for_mass_destruction();
        }
    }

    /// Snapshot of the statuses, as handed to the store for destruction.
    pub fn statuses(&self) -> Vec<Status> {
        self.entries.iter().map(|e| e.status.clone()).collect()
    }

    /// Keep only entries this removal actually destroyed. Whoever destroyed
    /// the others owns their fan-out.
    pub fn retain_destroyed(&mut self, destroyed: &[StatusId]) {
        let destroyed: HashSet<StatusId> = destroyed.iter().copied().collect();
        self.entries.retain(|e| destroyed.contains(&e.status.id));
    }
}
