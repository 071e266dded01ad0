//! Checked-state synchronization.
//!
//! A group's elements can be replaced wholesale (a "load more" click re-renders the list),
//! so the checked labels are captured right before and re-applied right after. The external
//! tag filter is the other source of checked state: reconciling with it plans every write
//! first and flushes them together, once per frame.

use std::collections::{HashMap, HashSet};

use crate::group::{Group, GroupRegistry};
use crate::item::{ItemId, ItemStore, normalize_text};

/// Active external filter values, keyed by field name
pub type ExternalTags = HashMap<String, HashSet<String>>;

/// Per-group record of `label -> checked`, kept across captures
#[derive(Debug, Default)]
pub struct StateSynchronizer {
    captured: HashMap<String, HashMap<String, bool>>,
}

impl StateSynchronizer {
    /// Record the checked state of every item of `group`, hidden ones included.
    ///
    /// The live element is read first, the mirrored flag is used if it is gone.
    pub fn capture(&mut self, group: &Group, store: &mut ItemStore) -> usize {
        let record = self.captured.entry(group.name().to_owned()).or_default();
        for &id in group.item_ids() {
            let checked = store.refresh_checked(id);
            if let Some(item) = store.get(id) {
                record.insert(item.label_text().to_owned(), checked);
            }
        }
        debug!("captured {} checked label(s) in group {}", record.values().filter(|c| **c).count(), group.name());
        group.len()
    }

    /// Re-check every item of `group` whose label was captured as checked.
    ///
    /// Returns the number of elements written.
    pub fn restore(&self, group: &Group, store: &mut ItemStore) -> usize {
        let Some(record) = self.captured.get(group.name()) else {
            return 0;
        };

        let mut restored = 0;
        for &id in group.item_ids() {
            let Some(item) = store.get(id) else { continue };
            if record.get(item.label_text()) == Some(&true) && !store.refresh_checked(id) {
                store.set_checked(id, true);
                restored += 1;
            }
        }
        debug!("restored {restored} checked item(s) in group {}", group.name());
        restored
    }

    /// The captured state of `label` in `group`
    pub fn recorded(&self, group: &str, label: &str) -> Option<bool> {
        self.captured.get(group)?.get(label).copied()
    }

    fn update(&mut self, group: &str, label: &str, checked: bool) {
        if let Some(record) = self.captured.get_mut(group) {
            record.insert(label.to_owned(), checked);
        }
    }
}

//------------------------------------------------------------------------------
struct Write {
    group: String,
    id: ItemId,
    checked: bool,
}

/// Checked-state writes planned from the external tags, applied in one flush
#[derive(Default)]
pub struct FrameBatch {
    writes: Vec<Write>,
}

impl FrameBatch {
    /// Compare every item against `active` and plan a write for each one that differs.
    ///
    /// An item matches when the value it reports for its group's field (its label by default)
    /// is among the active values of that field.
    pub fn plan(store: &mut ItemStore, groups: &GroupRegistry, active: &ExternalTags) -> Self {
        let mut writes = Vec::new();
        for group in groups.iter() {
            let values: HashSet<String> = active
                .get(group.field())
                .map(|values| values.iter().map(|v| normalize_text(v, false)).collect())
                .unwrap_or_default();

            for &id in group.item_ids() {
                let current = store.refresh_checked(id);
                let Some(item) = store.get(id) else { continue };
                let value = store
                    .handle(id)
                    .and_then(|handle| handle.field_value(group.field()))
                    .unwrap_or_else(|| item.label_text().to_owned());
                let wanted = values.contains(&normalize_text(&value, false));
                if wanted != current {
                    writes.push(Write {
                        group: group.name().to_owned(),
                        id,
                        checked: wanted,
                    });
                }
            }
        }
        Self { writes }
    }

    /// Number of planned writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether the batch has no writes
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Groups touched by at least one write
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for write in &self.writes {
            if !groups.contains(&write.group) {
                groups.push(write.group.clone());
            }
        }
        groups
    }

    /// Apply every write. Items removed since planning are skipped.
    ///
    /// Captured states are updated too, so a later restore does not undo the tags.
    pub fn flush(self, store: &mut ItemStore, sync: &mut StateSynchronizer) -> usize {
        let mut updated = 0;
        for write in self.writes {
            let Some(label) = store.get(write.id).map(|item| item.label_text().to_owned()) else {
                continue;
            };
            store.set_checked(write.id, write.checked);
            sync.update(&write.group, &label, write.checked);
            updated += 1;
        }
        updated
    }
}
