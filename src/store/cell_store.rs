use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::io::document_io::DocumentError;
use crate::model::cell::{Cell, CellBody, HISTORY_LIMIT, HistoryEntry};
use crate::model::config::ScheduleConfig;
use crate::model::document::ScheduleDocument;
use crate::model::grid::{CellRef, Grid};
use crate::model::wire::{cell_from_wire, cell_to_wire};
use crate::ops::cell_ops::ensure_treatment_windows;
use crate::ops::validate::{sanitize_cell_state, validate_cell_state};
use crate::store::save::{SaveChannel, SaveCoordinator, SaveRequest, SaveStatus};
use crate::store::undo::{UNDO_CAPACITY, UndoManager};
use crate::util::clock::Clock;

/// Mutates a cell in place. Mutators are total: they cannot fail, so any
/// precondition is checked before the update is issued.
pub type Mutator = Box<dyn FnOnce(&mut CellBody)>;

/// One cell of a multi-cell update
pub struct CellUpdate {
    pub cell: CellRef,
    pub mutator: Mutator,
}

impl CellUpdate {
    pub fn new(cell: CellRef, mutator: impl FnOnce(&mut CellBody) + 'static) -> Self {
        CellUpdate {
            cell,
            mutator: Box::new(mutator),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("nothing to undo")]
    NothingToUndo,
}

/// Delivered to subscribers after the store changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    CellsChanged(Vec<CellRef>),
    /// The grid was replaced by an undo snapshot
    Restored,
    /// The grid was replaced by a newer document from elsewhere
    RemoteApplied,
    /// Nothing changed; views should re-render from store state
    Refresh,
    SaveStatus(SaveStatus),
}

/// Snapshot of the store for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub document_id: String,
    pub save_status: SaveStatus,
    pub can_undo: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub author_id: String,
    pub undo_capacity: usize,
    pub history_limit: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            author_id: "local".to_string(),
            undo_capacity: UNDO_CAPACITY,
            history_limit: HISTORY_LIMIT,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        StoreOptions {
            author_id: config.schedule.author_id.clone(),
            undo_capacity: config.limits.undo_capacity,
            history_limit: config.limits.history_limit.min(HISTORY_LIMIT),
        }
    }
}

type Observer = Box<dyn FnMut(&StoreEvent)>;

/// Owns the grid. Every change goes through `update_cell_state` or
/// `update_multiple_cells`, which record history, normalize and sanitize
/// the touched cells, take one undo snapshot and schedule one save.
pub struct CellStore {
    document_id: String,
    grid: Grid,
    last_updated: Option<DateTime<Utc>>,
    undo: UndoManager,
    saves: SaveCoordinator,
    status: SaveStatus,
    channel: Box<dyn SaveChannel>,
    clock: Box<dyn Clock>,
    options: StoreOptions,
    observers: Vec<Observer>,
}

impl CellStore {
    pub fn new(
        document: ScheduleDocument,
        channel: Box<dyn SaveChannel>,
        clock: Box<dyn Clock>,
        options: StoreOptions,
    ) -> Self {
        let mut undo = UndoManager::new(options.undo_capacity);
        undo.initialize(&document.schedule_cells);
        CellStore {
            document_id: document.document_id,
            grid: document.schedule_cells,
            last_updated: document.last_updated,
            undo,
            saves: SaveCoordinator::default(),
            status: SaveStatus::Idle,
            channel,
            clock,
            options,
            observers: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The stored cell, or an empty one
    pub fn get_cell_state(&self, time: &str, employee: &str) -> Cell {
        self.grid.cell_or_default(time, employee)
    }

    /// Deep copy of the whole grid
    pub fn get_current_table_state(&self) -> Grid {
        self.grid.clone()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            document_id: self.document_id.clone(),
            save_status: self.status.clone(),
            can_undo: self.undo.can_undo(),
            last_updated: self.last_updated,
        }
    }

    /// The document as it would be persisted now, without stamping it
    pub fn document(&self) -> ScheduleDocument {
        ScheduleDocument {
            document_id: self.document_id.clone(),
            schedule_cells: self.grid.clone(),
            last_updated: self.last_updated,
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn update_cell_state<F>(&mut self, time: &str, employee: &str, mutator: F)
    where
        F: FnOnce(&mut CellBody) + 'static,
    {
        self.update_multiple_cells(vec![CellUpdate::new(
            CellRef::new(time, employee),
            mutator,
        )]);
    }

    /// Apply several mutations as one transaction: one undo snapshot, one
    /// notification and one save for the whole batch.
    pub fn update_multiple_cells(&mut self, updates: Vec<CellUpdate>) {
        if updates.is_empty() {
            return;
        }
        let today = self.clock.today();
        let mut changed = Vec::with_capacity(updates.len());
        for update in updates {
            let cell = self.grid.cell_or_default(&update.cell.time, &update.cell.employee);
            let cell = self.apply_update(cell, update.mutator, today);
            self.grid.set(&update.cell.time, &update.cell.employee, cell);
            if !changed.contains(&update.cell) {
                changed.push(update.cell);
            }
        }
        self.undo.push_state(&self.grid);
        self.notify(&StoreEvent::CellsChanged(changed));
        self.schedule_save();
    }

    /// Like `update_cell_state`, for operations that can reject the cell's
    /// current shape. The operation is tried on a copy first; a rejection
    /// leaves the store untouched.
    pub fn try_update_cell_state<F, E>(&mut self, time: &str, employee: &str, op: F) -> Result<(), E>
    where
        F: Fn(&mut CellBody) -> Result<(), E> + 'static,
    {
        let mut trial = self.get_cell_state(time, employee).body;
        op(&mut trial)?;
        self.update_cell_state(time, employee, move |body| {
            if op(body).is_err() {
                log::error!("cell operation rejected after a successful trial run");
            }
        });
        Ok(())
    }

    fn apply_update(&self, mut cell: Cell, mutator: Mutator, today: NaiveDate) -> Cell {
        let before = cell.body.clone();

        mutator(&mut cell.body);
        cell.body.normalize();
        ensure_treatment_windows(&before, &mut cell.body, today);
        let mut cell = clean_cell(&cell);

        // Only overwritten bookings count; flag, treatment and shape edits don't
        let booked_before = booked_contents(&before);
        if !booked_before.is_empty() && booked_before != booked_contents(&cell.body) {
            cell.history.record(
                HistoryEntry {
                    old_value: before.effective_content(),
                    timestamp: self.clock.now(),
                    author_id: self.options.author_id.clone(),
                },
                self.options.history_limit,
            );
        }
        cell
    }

    /// Step back to the previous snapshot.
    pub fn undo(&mut self) -> Result<(), StoreError> {
        let grid = self.undo.undo().ok_or(StoreError::NothingToUndo)?;
        self.grid = grid;
        self.notify(&StoreEvent::Restored);
        self.schedule_save();
        Ok(())
    }

    /// Replace local state with `doc` if it is the same document and newer.
    /// Undo cannot step back across the replacement.
    pub fn apply_remote(&mut self, doc: ScheduleDocument) -> bool {
        if doc.document_id != self.document_id {
            log::debug!(
                "ignoring remote document {} (local is {})",
                doc.document_id,
                self.document_id
            );
            return false;
        }
        if !doc.is_newer_than(self.last_updated) {
            log::debug!("remote document is not newer than local state");
            return false;
        }
        let mut grid = Grid::new();
        for (time, employee, cell) in doc.schedule_cells.iter() {
            grid.set(time, employee, clean_cell(cell));
        }
        self.grid = grid;
        self.last_updated = doc.last_updated;
        self.undo.initialize(&self.grid);
        self.notify(&StoreEvent::RemoteApplied);
        true
    }

    /// Ask subscribers to re-render without changing anything.
    pub fn refresh(&mut self) {
        self.notify(&StoreEvent::Refresh);
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&StoreEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&mut self, event: &StoreEvent) {
        for observer in &mut self.observers {
            observer(event);
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn schedule_save(&mut self) {
        match self.saves.request() {
            SaveRequest::Start => self.submit_current(),
            SaveRequest::Queued => log::debug!("save in flight; queued a follow-up write"),
        }
    }

    fn submit_current(&mut self) {
        self.last_updated = Some(self.clock.now());
        let doc = self.document();
        self.set_status(SaveStatus::Saving);
        self.channel.submit(doc);
    }

    fn set_status(&mut self, status: SaveStatus) {
        if self.status != status {
            self.status = status.clone();
            self.notify(&StoreEvent::SaveStatus(status));
        }
    }

    fn finish_save(&mut self, result: Result<(), DocumentError>) {
        match result {
            Ok(()) => self.set_status(SaveStatus::Saved),
            Err(e) => {
                log::warn!("save failed: {}", e);
                self.set_status(SaveStatus::Error(e.to_string()));
            }
        }
        if self.saves.complete() {
            log::debug!("issuing queued follow-up write");
            self.submit_current();
        }
    }

    /// Handle finished writes. Returns how many completed.
    pub fn poll(&mut self) -> usize {
        let mut completed = 0;
        while let Some(result) = self.channel.try_complete() {
            completed += 1;
            self.finish_save(result);
        }
        completed
    }

    /// Block until no write is in flight or queued.
    pub fn flush(&mut self) {
        while self.saves.in_flight() {
            match self.channel.wait() {
                Some(result) => self.finish_save(result),
                None => {
                    log::error!("save channel closed with a write in flight");
                    self.saves.reset();
                }
            }
        }
    }
}

/// Non-empty booking texts of a cell, order-independent
fn booked_contents(body: &CellBody) -> Vec<&str> {
    let mut contents: Vec<&str> = body
        .assignments()
        .into_iter()
        .map(|(_, a)| a.content.as_str())
        .filter(|c| !c.trim().is_empty())
        .collect();
    contents.sort_unstable();
    contents
}

/// Validate a cell in its persisted form and return the sanitized copy.
fn clean_cell(cell: &Cell) -> Cell {
    let wire = cell_to_wire(cell);
    let result = validate_cell_state(&wire);
    if !result.valid {
        for error in &result.errors {
            log::warn!("cell failed validation, sanitizing: {}", error);
        }
    }
    cell_from_wire(&sanitize_cell_state(&wire))
}
