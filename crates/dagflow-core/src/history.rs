//! Undo/redo history. Each entry is a
//! zlib-compressed JSON snapshot of the graph plus its SHA-256 hash;
//! SHA-256 is used here (rather than the blake3 used for node hashing)
//! to keep snapshot hashes independently verifiable with a widely
//! available, non-cryptographically-exotic digest.

use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

use crate::error::{DagflowError, Result};

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub hash: String,
    pub compressed: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    /// Short machine-readable label for the edit that produced this entry,
    /// e.g. `"add_node"`, `"delete_edge"`, `"commit_settings"`.
    pub action_type: String,
    /// Human-readable description shown in an undo/redo menu.
    pub action_description: String,
}

/// Result of an `undo`/`redo` call: whether it moved the cursor, and which
/// action is now the one being undone/redone (the entry landed *on*, not
/// the one that triggered the capture).
#[derive(Debug, Clone)]
pub struct HistoryChange {
    pub success: bool,
    pub action_type: Option<String>,
    pub action_description: Option<String>,
}

impl HistoryChange {
    fn none() -> Self {
        Self { success: false, action_type: None, action_description: None }
    }
}

/// Linear undo/redo stack over compressed graph snapshots. `cursor` points
/// at the entry representing the current state; `undo` moves it back,
/// `redo` moves it forward. Capturing a new state while `cursor` is not at
/// the end clears everything after it ("a new edit after undo
/// discards the redo branch").
#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
    max_size: usize,
    is_restoring: bool,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            max_size,
            is_restoring: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.entries.len())
    }

    /// True while a restore is in progress; callers should skip
    /// `capture_if_changed` calls triggered as a side effect of applying a
    /// restored snapshot, so undoing does not itself get recorded as a new
    /// edit.
    pub fn is_restoring(&self) -> bool {
        self.is_restoring
    }

    fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
        encoder.write_all(bytes).map_err(anyhow::Error::from)?;
        encoder.finish().map_err(|e| anyhow::Error::from(e).into())
    }

    fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(anyhow::Error::from)?;
        Ok(out)
    }

    /// Capture `snapshot` as a new history entry if it differs from the
    /// entry at the current cursor (deduplication by content hash). Returns
    /// `true` if a new entry was recorded. No-ops while `is_restoring`.
    /// `action_type`/`description` label the edit that produced this
    /// snapshot (e.g. `("add_node", "Add Filter node")`) for undo/redo UIs.
    pub fn capture_if_changed<T: Serialize>(
        &mut self,
        snapshot: &T,
        action_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<bool> {
        if self.is_restoring {
            return Ok(false);
        }

        let json = serde_json::to_vec(snapshot).map_err(anyhow::Error::from)?;
        let hash = format!("{:x}", Sha256::digest(&json));

        if let Some(cursor) = self.cursor {
            if self.entries[cursor].hash == hash {
                return Ok(false);
            }
        }

        let entry = HistoryEntry {
            hash,
            compressed: Self::compress(&json)?,
            captured_at: Utc::now(),
            action_type: action_type.into(),
            action_description: description.into(),
        };

        let insert_at = self.cursor.map(|c| c + 1).unwrap_or(0);
        self.entries.truncate(insert_at);
        self.entries.push(entry);
        self.cursor = Some(self.entries.len() - 1);

        while self.entries.len() > self.max_size {
            self.entries.remove(0);
            self.cursor = self.cursor.map(|c| c.saturating_sub(1));
        }

        Ok(true)
    }

    fn restore_at<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| DagflowError::GraphInvalid("no history entry at index".into()))?;
        let json = Self::decompress(&entry.compressed)?;
        serde_json::from_slice(&json).map_err(|e| anyhow::Error::from(e).into())
    }

    /// Run `apply` with `is_restoring` set so any `capture_if_changed` the
    /// caller triggers while reconstructing its state from the snapshot is
    /// suppressed.
    fn with_restore_guard<T>(&mut self, index: usize, apply: impl FnOnce(T)) -> Result<()>
    where
        T: DeserializeOwned,
    {
        let snapshot: T = self.restore_at(index)?;
        self.is_restoring = true;
        apply(snapshot);
        self.is_restoring = false;
        Ok(())
    }

    /// Undo moves the cursor back one entry and restores that entry's
    /// snapshot. The returned action label describes the entry *being
    /// undone* (the one the cursor moved away from), matching what an
    /// undo-menu item should display before the click.
    pub fn undo<T: DeserializeOwned>(&mut self, apply: impl FnOnce(T)) -> Result<HistoryChange> {
        let Some(cursor) = self.cursor else {
            return Ok(HistoryChange::none());
        };
        if cursor == 0 {
            return Ok(HistoryChange::none());
        }
        let undone = &self.entries[cursor];
        let action_type = undone.action_type.clone();
        let action_description = undone.action_description.clone();
        let target = cursor - 1;
        self.with_restore_guard(target, apply)?;
        self.cursor = Some(target);
        Ok(HistoryChange { success: true, action_type: Some(action_type), action_description: Some(action_description) })
    }

    /// Redo moves the cursor forward one entry; the returned label
    /// describes the entry being re-applied.
    pub fn redo<T: DeserializeOwned>(&mut self, apply: impl FnOnce(T)) -> Result<HistoryChange> {
        let Some(cursor) = self.cursor else {
            return Ok(HistoryChange::none());
        };
        if cursor + 1 >= self.entries.len() {
            return Ok(HistoryChange::none());
        }
        let target = cursor + 1;
        let redone = &self.entries[target];
        let action_type = redone.action_type.clone();
        let action_description = redone.action_description.clone();
        self.with_restore_guard(target, apply)?;
        self.cursor = Some(target);
        Ok(HistoryChange { success: true, action_type: Some(action_type), action_description: Some(action_description) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snap {
        value: i64,
    }

    #[test]
    fn dedup_skips_identical_snapshot() {
        let mut h = HistoryManager::new(50);
        assert!(h.capture_if_changed(&Snap { value: 1 }, "set", "Set value").unwrap());
        assert!(!h.capture_if_changed(&Snap { value: 1 }, "set", "Set value").unwrap());
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn undo_redo_round_trip() {
        let mut h = HistoryManager::new(50);
        h.capture_if_changed(&Snap { value: 1 }, "set", "Set value to 1").unwrap();
        h.capture_if_changed(&Snap { value: 2 }, "set", "Set value to 2").unwrap();
        h.capture_if_changed(&Snap { value: 3 }, "set", "Set value to 3").unwrap();

        let mut current = Snap { value: 3 };
        let change = h.undo(|s: Snap| current = s).unwrap();
        assert!(change.success);
        assert_eq!(change.action_description.as_deref(), Some("Set value to 3"));
        assert_eq!(current.value, 2);
        assert!(h.undo(|s: Snap| current = s).unwrap().success);
        assert_eq!(current.value, 1);
        assert!(!h.undo(|s: Snap| current = s).unwrap().success);

        let change = h.redo(|s: Snap| current = s).unwrap();
        assert!(change.success);
        assert_eq!(change.action_description.as_deref(), Some("Set value to 2"));
        assert_eq!(current.value, 2);
    }

    #[test]
    fn capture_after_undo_clears_redo_branch() {
        let mut h = HistoryManager::new(50);
        h.capture_if_changed(&Snap { value: 1 }, "set", "Set value to 1").unwrap();
        h.capture_if_changed(&Snap { value: 2 }, "set", "Set value to 2").unwrap();
        let mut current = Snap { value: 2 };
        h.undo(|s: Snap| current = s).unwrap();
        assert_eq!(current.value, 1);

        h.capture_if_changed(&Snap { value: 42 }, "set", "Set value to 42").unwrap();
        assert!(!h.can_redo());
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn eviction_respects_max_size() {
        let mut h = HistoryManager::new(3);
        for v in 0..10 {
            h.capture_if_changed(&Snap { value: v }, "set", format!("Set value to {v}")).unwrap();
        }
        assert_eq!(h.len(), 3);
        let mut current = Snap { value: -1 };
        h.undo(|s: Snap| current = s).unwrap();
        assert_eq!(current.value, 8);
    }
}
