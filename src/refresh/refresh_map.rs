//! Per-pass record of which albums an asset belonged to before and after
//! the batch.

use std::collections::{HashMap, HashSet};

use super::model::is_valid_file_id;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshEntry {
    pub before: HashSet<i32>,
    pub after: HashSet<i32>,
}

impl RefreshEntry {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefreshMap {
    entries: HashMap<i32, RefreshEntry>,
}

impl RefreshMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buckets `album_ids` by the sign of `delta`: negative goes to the
    /// before set, positive to the after set, zero to both.
    pub fn insert_by_delta<I>(&mut self, file_id: i32, album_ids: I, delta: i32)
    where
        I: IntoIterator<Item = i32>,
    {
        if !is_valid_file_id(file_id) {
            return;
        }

        let entry = self.entries.entry(file_id).or_default();
        for album_id in album_ids {
            if delta <= 0 {
                entry.before.insert(album_id);
            }
            if delta >= 0 {
                entry.after.insert(album_id);
            }
        }
    }

    /// Replaces the entry for `file_id` wholesale.
    pub fn insert(&mut self, file_id: i32, before: HashSet<i32>, after: HashSet<i32>) {
        self.entries.insert(file_id, RefreshEntry { before, after });
    }

    pub fn get(&self, file_id: i32) -> Option<&RefreshEntry> {
        self.entries.get(&file_id)
    }

    pub fn contains(&self, file_id: i32) -> bool {
        self.entries.contains_key(&file_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
