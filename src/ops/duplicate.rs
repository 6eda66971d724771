use crate::model::cell::{Assignment, CellBody, Part, TreatmentWindow};
use crate::model::grid::{CellRef, Grid};
use crate::ops::cell_ops::{self, CellOpError};
use crate::ops::move_ops::Endpoint;
use crate::store::cell_store::{CellStore, CellUpdate};

/// Another place in the grid holding the same text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub endpoint: Endpoint,
    pub assignment: Assignment,
}

/// How to treat text that already appears elsewhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateChoice {
    /// Move the existing booking here, with its flags and treatment window
    Move,
    /// Keep both; the new entry starts its own treatment window
    AddAnyway,
    /// Write nothing
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Saved,
    Cleared,
    Moved { from: Endpoint },
    AddedAnyway,
    Cancelled,
}

fn normalized(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Every whole cell and split part outside `exclude` whose content equals
/// `text`, ignoring case and surrounding whitespace. In grid order.
pub fn find_duplicates(grid: &Grid, text: &str, exclude: &CellRef) -> Vec<DuplicateMatch> {
    let needle = normalized(text);
    if needle.is_empty() {
        return Vec::new();
    }
    let mut matches = Vec::new();
    for (time, employee, cell) in grid.iter() {
        if exclude.time == time && exclude.employee == employee {
            continue;
        }
        for (part, assignment) in cell.body.assignments() {
            if normalized(&assignment.content) == needle {
                matches.push(DuplicateMatch {
                    endpoint: Endpoint {
                        cell: CellRef::new(time, employee),
                        part,
                    },
                    assignment: assignment.clone(),
                });
            }
        }
    }
    matches
}

/// Commit `text` typed into `target`. When the text already appears
/// elsewhere, `resolve` is asked what to do with the first match.
pub fn commit_text_edit<R>(
    store: &mut CellStore,
    target: &Endpoint,
    text: &str,
    resolve: R,
) -> Result<EditOutcome, CellOpError>
where
    R: FnOnce(&[DuplicateMatch]) -> DuplicateChoice,
{
    let text = text.trim().to_string();
    let current = store.get_cell_state(&target.cell.time, &target.cell.employee);
    let existing = cell_ops::target(&current.body, target.part)?.clone();
    let part = resolved_part(&current.body, target);

    if text.is_empty() {
        store.update_cell_state(&target.cell.time, &target.cell.employee, move |body| {
            cell_ops::clear(body, part);
        });
        return Ok(EditOutcome::Cleared);
    }

    let duplicates = find_duplicates(store.grid(), &text, &target.cell);
    let Some(first) = duplicates.first().cloned() else {
        store.update_cell_state(&target.cell.time, &target.cell.employee, move |body| {
            let _ = cell_ops::set_text(body, part, &text);
        });
        return Ok(EditOutcome::Saved);
    };

    match resolve(&duplicates) {
        DuplicateChoice::Move => {
            let moved = Assignment {
                content: text,
                flags: first.assignment.flags,
                treatment: first.assignment.treatment.clone(),
            };
            let from = first.endpoint.clone();
            store.update_multiple_cells(vec![
                CellUpdate::new(first.endpoint.cell.clone(), move |body| {
                    cell_ops::take_assignment(body, first.endpoint.part);
                }),
                CellUpdate::new(target.cell.clone(), move |body| {
                    let _ = cell_ops::replace_assignment(body, part, moved);
                }),
            ]);
            Ok(EditOutcome::Moved { from })
        }
        DuplicateChoice::AddAnyway => {
            let added = Assignment {
                content: text,
                flags: existing.flags,
                treatment: Some(TreatmentWindow::starting(store.today())),
            };
            store.update_cell_state(&target.cell.time, &target.cell.employee, move |body| {
                let _ = cell_ops::replace_assignment(body, part, added);
            });
            Ok(EditOutcome::AddedAnyway)
        }
        DuplicateChoice::Cancel => {
            store.refresh();
            Ok(EditOutcome::Cancelled)
        }
    }
}

/// Parts only matter on split cells
fn resolved_part(body: &CellBody, target: &Endpoint) -> Option<Part> {
    if body.is_split() { target.part } else { None }
}

/// Tracks the cell being edited between focus and commit
#[derive(Debug, Default)]
pub struct EditSession {
    active: Option<Endpoint>,
    original: String,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start editing `target`; returns the text to pre-fill.
    pub fn begin(&mut self, store: &CellStore, target: Endpoint) -> Result<String, CellOpError> {
        let cell = store.get_cell_state(&target.cell.time, &target.cell.employee);
        let text = cell_ops::target(&cell.body, target.part)?.content.clone();
        self.active = Some(target);
        self.original = text.clone();
        Ok(text)
    }

    pub fn active(&self) -> Option<&Endpoint> {
        self.active.as_ref()
    }

    /// Commit the edited text. Unchanged text writes nothing.
    pub fn commit<R>(
        &mut self,
        store: &mut CellStore,
        text: &str,
        resolve: R,
    ) -> Result<EditOutcome, CellOpError>
    where
        R: FnOnce(&[DuplicateMatch]) -> DuplicateChoice,
    {
        let Some(target) = self.active.take() else {
            return Ok(EditOutcome::Cancelled);
        };
        if text.trim() == self.original.trim() {
            store.refresh();
            return Ok(EditOutcome::Cancelled);
        }
        commit_text_edit(store, &target, text, resolve)
    }

    /// Abandon the edit; views re-render the stored text.
    pub fn cancel(&mut self, store: &mut CellStore) {
        if self.active.take().is_some() {
            store.refresh();
        }
    }
}
