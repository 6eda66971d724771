use crate::model::grid::Grid;

/// Default number of grid snapshots kept
pub const UNDO_CAPACITY: usize = 20;

/// Bounded stack of whole-grid snapshots with a cursor.
///
/// The snapshot under the cursor is the current grid. `undo` steps the
/// cursor back and hands out a copy of the earlier grid. There is no redo:
/// pushing after an undo discards everything above the cursor.
#[derive(Debug, Clone)]
pub struct UndoManager {
    snapshots: Vec<Grid>,
    cursor: usize,
    capacity: usize,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(UNDO_CAPACITY)
    }
}

impl UndoManager {
    pub fn new(capacity: usize) -> Self {
        UndoManager {
            snapshots: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Reset to a single snapshot of `state`.
    pub fn initialize(&mut self, state: &Grid) {
        self.snapshots.clear();
        self.snapshots.push(state.clone());
        self.cursor = 0;
    }

    /// Record `state` as the newest snapshot.
    pub fn push_state(&mut self, state: &Grid) {
        if !self.snapshots.is_empty() && self.cursor + 1 < self.snapshots.len() {
            self.snapshots.truncate(self.cursor + 1);
        }
        self.snapshots.push(state.clone());
        if self.snapshots.len() > self.capacity {
            let excess = self.snapshots.len() - self.capacity;
            self.snapshots.drain(..excess);
        }
        self.cursor = self.snapshots.len() - 1;
    }

    /// Step back one snapshot. `None` means there is nothing to undo.
    pub fn undo(&mut self) -> Option<Grid> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.snapshots.get(self.cursor).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cell::{Assignment, Cell};

    /// A grid whose single cell holds `n`, so snapshots are distinguishable
    fn grid(n: usize) -> Grid {
        let mut g = Grid::new();
        g.set("7:30", "anna", Cell::whole(Assignment::new(n.to_string())));
        g
    }

    fn marker(g: &Grid) -> String {
        g.get("7:30", "anna")
            .map(|c| c.body.effective_content())
            .unwrap_or_default()
    }

    #[test]
    fn new_manager_has_nothing_to_undo() {
        let mut undo = UndoManager::default();
        assert!(undo.is_empty());
        assert!(!undo.can_undo());
        assert!(undo.undo().is_none());
        assert_eq!(undo.capacity(), UNDO_CAPACITY);
    }

    #[test]
    fn initialize_resets() {
        let mut undo = UndoManager::default();
        undo.push_state(&grid(1));
        undo.push_state(&grid(2));
        undo.initialize(&grid(0));
        assert_eq!(undo.len(), 1);
        assert!(undo.undo().is_none());
    }

    #[test]
    fn undo_walks_back() {
        let mut undo = UndoManager::default();
        undo.initialize(&grid(0));
        undo.push_state(&grid(1));
        undo.push_state(&grid(2));
        assert_eq!(marker(&undo.undo().unwrap()), "1");
        assert_eq!(marker(&undo.undo().unwrap()), "0");
        assert!(undo.undo().is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut undo = UndoManager::default();
        for i in 1..=21 {
            undo.push_state(&grid(i));
        }
        assert_eq!(undo.len(), UNDO_CAPACITY);

        let mut last = None;
        for _ in 0..19 {
            last = undo.undo();
        }
        // Push #1 was evicted; the oldest reachable state is push #2
        assert_eq!(marker(&last.unwrap()), "2");
        assert!(undo.undo().is_none());
    }

    #[test]
    fn push_after_undo_discards_forward_entries() {
        let mut undo = UndoManager::default();
        undo.initialize(&grid(0));
        undo.push_state(&grid(1));
        undo.push_state(&grid(2));
        undo.undo();
        undo.push_state(&grid(3));
        assert_eq!(undo.len(), 3);
        assert_eq!(marker(&undo.undo().unwrap()), "1");
    }

    #[test]
    fn snapshots_are_deep_copies() {
        let mut undo = UndoManager::default();
        let mut g = grid(0);
        undo.initialize(&g);
        g.set("7:30", "anna", Cell::break_cell());
        undo.push_state(&g);
        let restored = undo.undo().unwrap();
        assert_eq!(marker(&restored), "0");
    }
}
