use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::edit::EditState;
use crate::error::HistoryError;

/// One snapshot in the edit history.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub state: Arc<EditState>,
    pub label: String,
}

/// What the host needs after any history operation.
#[derive(Clone, Debug)]
pub struct HistoryStatus {
    pub state: Arc<EditState>,
    pub index: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    /// Label of the edit an undo would revert, for "Undo <label>" menus.
    pub undo_label: Option<String>,
    pub redo_label: Option<String>,
}

/// Linear snapshot history with a cursor. There is always at least one
/// entry (the initial state) and `index < entries.len()`.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    index: usize,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(EditState::default(), 100)
    }
}

impl HistoryManager {
    pub fn new(initial: EditState, max_history_size: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(HistoryEntry { state: Arc::new(initial), label: "Open".to_string() });
        Self { entries, index: 0, max_history_size: max_history_size.max(1) }
    }

    pub fn current(&self) -> Arc<EditState> {
        Arc::clone(&self.entries[self.index].state)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            state: self.current(),
            index: self.index,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            undo_label: self.undo_description().map(str::to_string),
            redo_label: self.redo_description().map(str::to_string),
        }
    }

    /// Append `state` after the cursor, discarding any redo branch.
    pub fn commit(&mut self, state: EditState, label: impl Into<String>) -> HistoryStatus {
        let label = label.into();
        self.entries.truncate(self.index + 1);
        self.entries.push_back(HistoryEntry { state: Arc::new(state), label });
        self.index = self.entries.len() - 1;
        self.prune();
        debug!(index = self.index, len = self.entries.len(), label = %self.entries[self.index].label, "history commit");
        self.status()
    }

    pub fn undo(&mut self) -> Result<HistoryStatus, HistoryError> {
        if !self.can_undo() {
            return Err(HistoryError::NothingToUndo);
        }
        self.index -= 1;
        Ok(self.status())
    }

    pub fn redo(&mut self) -> Result<HistoryStatus, HistoryError> {
        if !self.can_redo() {
            return Err(HistoryError::NothingToRedo);
        }
        self.index += 1;
        Ok(self.status())
    }

    /// Move the cursor to any entry without discarding the others.
    pub fn jump_to(&mut self, index: usize) -> Result<HistoryStatus, HistoryError> {
        if index >= self.entries.len() {
            return Err(HistoryError::IndexOutOfRange { index, len: self.entries.len() });
        }
        self.index = index;
        Ok(self.status())
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo().then(|| self.entries[self.index].label.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.can_redo().then(|| self.entries[self.index + 1].label.as_str())
    }

    /// Labels oldest-first, for the host's history list.
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Drop everything and start over from `initial`.
    pub fn clear(&mut self, initial: EditState) {
        *self = Self::new(initial, self.max_history_size);
    }

    fn prune(&mut self) {
        while self.entries.len() > self.max_history_size {
            self.entries.pop_front();
            self.index = self.index.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{EditPatch, FilterPatch};

    fn with_blur(blur: f32) -> EditState {
        EditState::default()
            .apply(&EditPatch::Filter(FilterPatch { blur: Some(blur), ..Default::default() }))
            .unwrap()
    }

    #[test]
    fn test_commit_truncates_redo_branch() {
        let (a, b, c, d) = (with_blur(1.0), with_blur(2.0), with_blur(3.0), with_blur(4.0));
        let mut h = HistoryManager::new(a.clone(), 100);
        h.commit(b.clone(), "B");
        h.commit(c, "C");
        let st = h.undo().unwrap();
        assert_eq!(*st.state, b);
        let st = h.commit(d.clone(), "D");
        assert!(!st.can_redo);
        assert_eq!(h.len(), 3);
        let states: Vec<EditState> = h.entries().map(|e| (*e.state).clone()).collect();
        assert_eq!(states, vec![a, b, d]);
        assert_eq!(h.redo().unwrap_err(), HistoryError::NothingToRedo);
    }

    #[test]
    fn test_undo_at_start_fails() {
        let mut h = HistoryManager::default();
        assert_eq!(h.undo().unwrap_err(), HistoryError::NothingToUndo);
        assert!(!h.status().can_undo);
    }

    #[test]
    fn test_status_carries_undo_redo_labels() {
        let mut h = HistoryManager::default();
        let st = h.commit(with_blur(1.0), "Blur");
        assert_eq!(st.undo_label.as_deref(), Some("Blur"));
        assert_eq!(st.redo_label, None);
        h.commit(with_blur(2.0), "Sharpen");
        let st = h.undo().unwrap();
        assert_eq!(st.undo_label.as_deref(), Some("Blur"));
        assert_eq!(st.redo_label.as_deref(), Some("Sharpen"));
        let st = h.undo().unwrap();
        assert_eq!(st.undo_label, None);
        assert_eq!(h.undo_description(), None);
    }

    #[test]
    fn test_jump_to() {
        let mut h = HistoryManager::default();
        h.commit(with_blur(1.0), "one");
        h.commit(with_blur(2.0), "two");
        let st = h.jump_to(0).unwrap();
        assert_eq!(st.index, 0);
        assert!(st.can_redo);
        assert_eq!(h.redo_description(), Some("one"));
        assert_eq!(h.jump_to(3).unwrap_err(), HistoryError::IndexOutOfRange { index: 3, len: 3 });
    }

    #[test]
    fn test_bounded_history_drops_oldest() {
        let mut h = HistoryManager::new(EditState::default(), 3);
        for i in 1..=5 {
            h.commit(with_blur(i as f32), format!("blur {}", i));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.index(), 2);
        assert_eq!(h.labels(), vec!["blur 3", "blur 4", "blur 5"]);
        assert_eq!(h.current().filters.blur, 5.0);
    }
}
