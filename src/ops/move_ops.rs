use std::fmt;

use crate::model::cell::{Assignment, Cell, CellBody, Part};
use crate::model::grid::{CellRef, Grid};
use crate::ops::cell_ops;
use crate::store::cell_store::{CellStore, CellUpdate};

/// A cell, or one part of a split cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub cell: CellRef,
    pub part: Option<Part>,
}

impl Endpoint {
    pub fn whole(cell: CellRef) -> Self {
        Endpoint { cell, part: None }
    }

    pub fn part(cell: CellRef, part: Part) -> Self {
        Endpoint {
            cell,
            part: Some(part),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part {
            Some(p) => write!(f, "{} part {}", self.cell, p),
            None => write!(f, "{}", self.cell),
        }
    }
}

/// A rejected move. Nothing is changed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("{0} is split; choose a part")]
    PartNotChosen(CellRef),
    #[error("{cell} part {part} is occupied")]
    PartOccupied { cell: CellRef, part: Part },
    #[error("{0} is a break")]
    BreakCell(CellRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The source had no content, or source and target are the same place
    Nothing,
    Moved {
        /// The target held someone and was split to make room
        auto_split: bool,
        /// The source was a split cell and merged back to a whole cell
        source_merged: bool,
    },
}

/// Read access to the current cell at an address
pub trait CellLookup {
    fn cell_at(&self, cell: &CellRef) -> Cell;
}

impl CellLookup for Grid {
    fn cell_at(&self, cell: &CellRef) -> Cell {
        self.cell_or_default(&cell.time, &cell.employee)
    }
}

impl CellLookup for CellStore {
    fn cell_at(&self, cell: &CellRef) -> Cell {
        self.get_cell_state(&cell.time, &cell.employee)
    }
}

/// Where a moved assignment lands in the target cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Into an empty whole cell
    Whole,
    /// Into an empty part of a split cell
    IntoPart(Part),
    /// The occupied whole target is split: its occupant stays in part 1,
    /// the moved assignment goes to part 2
    AutoSplit,
}

/// Decide where an assignment dropped on `target` would go.
pub fn plan_placement(body: &CellBody, target: &Endpoint) -> Result<Placement, MoveError> {
    match (body, target.part) {
        (CellBody::Break, _) => Err(MoveError::BreakCell(target.cell.clone())),
        (CellBody::Split { .. }, None) => Err(MoveError::PartNotChosen(target.cell.clone())),
        (CellBody::Split { .. }, Some(part)) => {
            if body.part(part).is_some_and(|a| !a.is_empty()) {
                Err(MoveError::PartOccupied {
                    cell: target.cell.clone(),
                    part,
                })
            } else {
                Ok(Placement::IntoPart(part))
            }
        }
        // A part index on a whole cell carries no meaning
        (CellBody::Whole(a), _) if a.is_empty() => Ok(Placement::Whole),
        (CellBody::Whole(_), _) => Ok(Placement::AutoSplit),
    }
}

/// Put `assignment` into `body` as planned. The plan must have been made
/// against this body.
pub fn apply_placement(body: &mut CellBody, placement: Placement, assignment: Assignment) {
    match placement {
        Placement::Whole => *body = CellBody::Whole(assignment),
        Placement::IntoPart(part) => match body.part_mut(part) {
            Some(slot) => *slot = assignment,
            None => log::warn!("placement into part {} of a cell that is not split", part),
        },
        Placement::AutoSplit => {
            let existing = match std::mem::take(body) {
                CellBody::Whole(a) => a,
                _ => Assignment::default(),
            };
            *body = CellBody::Split {
                part1: existing,
                part2: assignment,
            };
        }
    }
}

/// The assignment at `source`, if there is one to move
fn source_assignment(body: &CellBody, source: &Endpoint) -> Result<Option<Assignment>, MoveError> {
    match (body, source.part) {
        (CellBody::Break, _) => Ok(None),
        (CellBody::Split { .. }, None) => Err(MoveError::PartNotChosen(source.cell.clone())),
        _ => {
            let assignment = cell_ops::target(body, source.part)
                .ok()
                .filter(|a| !a.is_empty())
                .cloned();
            Ok(assignment)
        }
    }
}

/// Check a move without performing it.
pub fn check_move(
    lookup: &impl CellLookup,
    source: &Endpoint,
    target: &Endpoint,
) -> Result<Option<Placement>, MoveError> {
    let source_cell = lookup.cell_at(&source.cell);
    if source_assignment(&source_cell.body, source)?.is_none() {
        return Ok(None);
    }
    if source.cell == target.cell {
        return check_move_within(&source_cell.body, source, target);
    }
    let target_cell = lookup.cell_at(&target.cell);
    plan_placement(&target_cell.body, target).map(Some)
}

/// Moves inside one cell only make sense between the two parts of a split.
fn check_move_within(
    body: &CellBody,
    source: &Endpoint,
    target: &Endpoint,
) -> Result<Option<Placement>, MoveError> {
    match (source.part, target.part) {
        (Some(from), Some(to)) if from != to && body.is_split() => {
            plan_placement(body, target).map(Some)
        }
        (Some(_), None) if body.is_split() => Err(MoveError::PartNotChosen(target.cell.clone())),
        _ => Ok(None),
    }
}

/// Move the assignment at `source` to `target`.
///
/// The target update and the source clear are one store transaction, so a
/// move is a single undo step. Rejections leave the store untouched.
pub fn move_assignment(
    store: &mut CellStore,
    source: &Endpoint,
    target: &Endpoint,
) -> Result<MoveOutcome, MoveError> {
    let Some(placement) = check_move(&*store, source, target)? else {
        return Ok(MoveOutcome::Nothing);
    };
    let source_body = store.cell_at(&source.cell).body;
    let Some(assignment) = source_assignment(&source_body, source)? else {
        return Ok(MoveOutcome::Nothing);
    };

    if source.cell == target.cell {
        let (Some(from), Placement::IntoPart(to)) = (source.part, placement) else {
            return Ok(MoveOutcome::Nothing);
        };
        store.update_cell_state(&source.cell.time, &source.cell.employee, move |body| {
            if let Some(slot) = body.part_mut(from) {
                *slot = Assignment::default();
            }
            apply_placement(body, Placement::IntoPart(to), assignment);
        });
        return Ok(MoveOutcome::Moved {
            auto_split: false,
            source_merged: false,
        });
    }

    let source_part = source.part;
    let source_merged = source_body.is_split();
    store.update_multiple_cells(vec![
        CellUpdate::new(target.cell.clone(), move |body| {
            apply_placement(body, placement, assignment);
        }),
        CellUpdate::new(source.cell.clone(), move |body| {
            cell_ops::take_assignment(body, source_part);
        }),
    ]);
    log::debug!("moved {} to {} ({:?})", source, target, placement);
    Ok(MoveOutcome::Moved {
        auto_split: placement == Placement::AutoSplit,
        source_merged,
    })
}

// ---------------------------------------------------------------------------
// Drag session
// ---------------------------------------------------------------------------

/// Feedback for the cell under the pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropHint {
    /// Nothing is being dragged, or dropping here changes nothing
    NoEffect,
    Allowed,
    /// Allowed, and the occupied target will be split
    AutoSplit,
    Rejected(MoveError),
}

/// Pointer-driven move: remembers the drag source and the hovered target
/// between events.
#[derive(Debug, Default)]
pub struct DragSession {
    source: Option<Endpoint>,
    hover: Option<Endpoint>,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin dragging from `source`. Returns false, starting nothing, when
    /// there is no content there.
    pub fn handle_drag_start(&mut self, lookup: &impl CellLookup, source: Endpoint) -> bool {
        let cell = lookup.cell_at(&source.cell);
        match source_assignment(&cell.body, &source) {
            Ok(Some(_)) => {
                self.source = Some(source);
                self.hover = None;
                true
            }
            _ => false,
        }
    }

    pub fn handle_drag_over(&mut self, lookup: &impl CellLookup, target: Endpoint) -> DropHint {
        let Some(source) = &self.source else {
            return DropHint::NoEffect;
        };
        let hint = match check_move(lookup, source, &target) {
            Ok(None) => DropHint::NoEffect,
            Ok(Some(Placement::AutoSplit)) => DropHint::AutoSplit,
            Ok(Some(_)) => DropHint::Allowed,
            Err(e) => DropHint::Rejected(e),
        };
        self.hover = Some(target);
        hint
    }

    pub fn handle_drag_leave(&mut self, target: &Endpoint) {
        if self.hover.as_ref() == Some(target) {
            self.hover = None;
        }
    }

    /// Drop on `target`. The session ends whatever the outcome.
    pub fn handle_drop(
        &mut self,
        store: &mut CellStore,
        target: Endpoint,
    ) -> Result<MoveOutcome, MoveError> {
        let source = self.source.take();
        self.hover = None;
        match source {
            Some(source) => move_assignment(store, &source, &target),
            None => Ok(MoveOutcome::Nothing),
        }
    }

    pub fn handle_drag_end(&mut self) {
        self.source = None;
        self.hover = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&Endpoint> {
        self.source.as_ref()
    }

    pub fn hover(&self) -> Option<&Endpoint> {
        self.hover.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::document_io::MemoryDocumentStore;
    use crate::model::cell::TreatmentWindow;
    use crate::model::document::ScheduleDocument;
    use crate::store::cell_store::StoreOptions;
    use crate::store::save::InlineSaveChannel;
    use crate::util::clock::FixedClock;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn store_with(cells: &[(&str, &str, CellBody)]) -> CellStore {
        let mut doc = ScheduleDocument::empty("main");
        for (time, employee, body) in cells {
            doc.schedule_cells.set(time, employee, Cell::new(body.clone()));
        }
        CellStore::new(
            doc,
            Box::new(InlineSaveChannel::new(MemoryDocumentStore::new())),
            Box::new(FixedClock::on(today())),
            StoreOptions::default(),
        )
    }

    fn treated(content: &str) -> Assignment {
        let mut a = Assignment::new(content);
        a.treatment = Some(TreatmentWindow::starting(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
        a
    }

    fn whole(content: &str) -> CellBody {
        CellBody::Whole(treated(content))
    }

    fn split_of(c1: &str, c2: &str) -> CellBody {
        let part = |c: &str| if c.is_empty() { Assignment::default() } else { treated(c) };
        CellBody::Split {
            part1: part(c1),
            part2: part(c2),
        }
    }

    fn at(time: &str, employee: &str) -> Endpoint {
        Endpoint::whole(CellRef::new(time, employee))
    }

    fn at_part(time: &str, employee: &str, part: Part) -> Endpoint {
        Endpoint::part(CellRef::new(time, employee), part)
    }

    fn body(store: &CellStore, time: &str, employee: &str) -> CellBody {
        store.get_cell_state(time, employee).body
    }

    #[test]
    fn move_into_empty_cell() {
        let mut store = store_with(&[("7:30", "anna", whole("Nowak"))]);
        let outcome = move_assignment(&mut store, &at("7:30", "anna"), &at("8:00", "bob")).unwrap();
        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                auto_split: false,
                source_merged: false
            }
        );
        assert_eq!(body(&store, "8:00", "bob"), whole("Nowak"));
        assert_eq!(body(&store, "7:30", "anna"), CellBody::default());
    }

    #[test]
    fn move_onto_occupied_whole_auto_splits() {
        let mut store = store_with(&[
            ("7:30", "anna", whole("Nowak")),
            ("8:00", "bob", whole("Lis")),
        ]);
        let outcome = move_assignment(&mut store, &at("7:30", "anna"), &at("8:00", "bob")).unwrap();
        assert!(matches!(outcome, MoveOutcome::Moved { auto_split: true, .. }));
        assert_eq!(body(&store, "8:00", "bob"), split_of("Lis", "Nowak"));
    }

    #[test]
    fn part_index_on_whole_target_is_ignored() {
        let mut store = store_with(&[
            ("7:30", "anna", whole("Nowak")),
            ("8:00", "bob", whole("Lis")),
        ]);
        move_assignment(&mut store, &at("7:30", "anna"), &at_part("8:00", "bob", Part::One)).unwrap();
        assert_eq!(body(&store, "8:00", "bob"), split_of("Lis", "Nowak"));
    }

    #[test]
    fn split_target_needs_a_part() {
        let mut store = store_with(&[
            ("7:30", "anna", whole("Nowak")),
            ("8:00", "bob", split_of("Lis", "")),
        ]);
        let before = store.get_current_table_state();
        let err = move_assignment(&mut store, &at("7:30", "anna"), &at("8:00", "bob")).unwrap_err();
        assert_eq!(err, MoveError::PartNotChosen(CellRef::new("8:00", "bob")));
        assert_eq!(store.get_current_table_state(), before);
    }

    #[test]
    fn occupied_part_is_rejected() {
        let mut store = store_with(&[
            ("7:30", "anna", whole("Nowak")),
            ("8:00", "bob", split_of("Lis", "")),
        ]);
        let before = store.get_current_table_state();
        let err = move_assignment(
            &mut store,
            &at("7:30", "anna"),
            &at_part("8:00", "bob", Part::One),
        )
        .unwrap_err();
        assert_eq!(
            err,
            MoveError::PartOccupied {
                cell: CellRef::new("8:00", "bob"),
                part: Part::One
            }
        );
        assert_eq!(store.get_current_table_state(), before);
        assert!(!store.app_state().can_undo);
    }

    #[test]
    fn move_into_free_part() {
        let mut store = store_with(&[
            ("7:30", "anna", whole("Nowak")),
            ("8:00", "bob", split_of("Lis", "")),
        ]);
        move_assignment(
            &mut store,
            &at("7:30", "anna"),
            &at_part("8:00", "bob", Part::Two),
        )
        .unwrap();
        assert_eq!(body(&store, "8:00", "bob"), split_of("Lis", "Nowak"));
    }

    #[test]
    fn moving_out_of_split_merges_source() {
        let mut store = store_with(&[("7:30", "anna", split_of("Nowak", "Lis"))]);
        let outcome = move_assignment(
            &mut store,
            &at_part("7:30", "anna", Part::One),
            &at("8:00", "bob"),
        )
        .unwrap();
        assert!(matches!(outcome, MoveOutcome::Moved { source_merged: true, .. }));
        assert_eq!(body(&store, "7:30", "anna"), whole("Lis"));
        assert_eq!(body(&store, "8:00", "bob"), whole("Nowak"));
    }

    #[test]
    fn moving_last_occupant_of_split_empties_source() {
        let mut store = store_with(&[("7:30", "anna", split_of("", "Lis"))]);
        move_assignment(
            &mut store,
            &at_part("7:30", "anna", Part::Two),
            &at("8:00", "bob"),
        )
        .unwrap();
        assert_eq!(body(&store, "7:30", "anna"), CellBody::default());
    }

    #[test]
    fn moving_sole_first_part_carries_everything() {
        let mut moved = treated("Nowak");
        moved.flags.pnf = true;
        moved.flags.every_other_day = true;
        if let Some(window) = moved.treatment.as_mut() {
            window.extension_days = 4;
            window.additional_info = "bark".into();
            window.recompute_end();
        }
        let source = CellBody::Split {
            part1: moved.clone(),
            part2: Assignment::default(),
        };
        let mut store = store_with(&[("7:30", "anna", source)]);
        let outcome = move_assignment(
            &mut store,
            &at_part("7:30", "anna", Part::One),
            &at("8:00", "bob"),
        )
        .unwrap();
        assert!(matches!(outcome, MoveOutcome::Moved { source_merged: true, .. }));
        assert_eq!(body(&store, "7:30", "anna"), CellBody::default());
        assert_eq!(body(&store, "8:00", "bob"), CellBody::Whole(moved));
    }

    #[test]
    fn empty_source_is_a_no_op() {
        let mut store = store_with(&[("8:00", "bob", whole("Lis"))]);
        let outcome = move_assignment(&mut store, &at("7:30", "anna"), &at("8:00", "bob")).unwrap();
        assert_eq!(outcome, MoveOutcome::Nothing);
        assert!(!store.app_state().can_undo);
    }

    #[test]
    fn break_cells_do_not_take_part() {
        let mut store = store_with(&[
            ("7:30", "anna", CellBody::Break),
            ("8:00", "bob", whole("Lis")),
        ]);
        let outcome = move_assignment(&mut store, &at("7:30", "anna"), &at("9:00", "bob")).unwrap();
        assert_eq!(outcome, MoveOutcome::Nothing);
        let err = move_assignment(&mut store, &at("8:00", "bob"), &at("7:30", "anna")).unwrap_err();
        assert_eq!(err, MoveError::BreakCell(CellRef::new("7:30", "anna")));
    }

    #[test]
    fn move_onto_itself_is_a_no_op() {
        let mut store = store_with(&[("7:30", "anna", whole("Nowak"))]);
        let outcome = move_assignment(&mut store, &at("7:30", "anna"), &at("7:30", "anna")).unwrap();
        assert_eq!(outcome, MoveOutcome::Nothing);
        assert_eq!(body(&store, "7:30", "anna"), whole("Nowak"));
    }

    #[test]
    fn move_between_parts_of_one_cell() {
        let mut store = store_with(&[("7:30", "anna", split_of("Nowak", ""))]);
        move_assignment(
            &mut store,
            &at_part("7:30", "anna", Part::One),
            &at_part("7:30", "anna", Part::Two),
        )
        .unwrap();
        assert_eq!(body(&store, "7:30", "anna"), split_of("", "Nowak"));
    }

    #[test]
    fn a_move_is_one_undo_step() {
        let mut store = store_with(&[
            ("7:30", "anna", whole("Nowak")),
            ("8:00", "bob", whole("Lis")),
        ]);
        let before = store.get_current_table_state();
        move_assignment(&mut store, &at("7:30", "anna"), &at("8:00", "bob")).unwrap();
        store.undo().unwrap();
        assert_eq!(store.get_current_table_state(), before);
    }

    #[test]
    fn moved_assignment_keeps_flags_and_window() {
        let mut moved = treated("Nowak");
        moved.flags.massage = true;
        let mut store = store_with(&[("7:30", "anna", CellBody::Whole(moved.clone()))]);
        move_assignment(&mut store, &at("7:30", "anna"), &at("8:00", "bob")).unwrap();
        assert_eq!(body(&store, "8:00", "bob"), CellBody::Whole(moved));
    }

    #[test]
    fn drag_session_flow() {
        let mut store = store_with(&[
            ("7:30", "anna", whole("Nowak")),
            ("8:00", "bob", whole("Lis")),
            ("9:00", "bob", split_of("Kos", "")),
        ]);
        let mut drag = DragSession::new();
        assert!(!drag.handle_drag_start(&store, at("7:00", "anna")));
        assert!(drag.handle_drag_start(&store, at("7:30", "anna")));

        assert_eq!(drag.handle_drag_over(&store, at("8:00", "bob")), DropHint::AutoSplit);
        assert_eq!(drag.handle_drag_over(&store, at("8:30", "bob")), DropHint::Allowed);
        assert_eq!(
            drag.handle_drag_over(&store, at("9:00", "bob")),
            DropHint::Rejected(MoveError::PartNotChosen(CellRef::new("9:00", "bob")))
        );
        drag.handle_drag_leave(&at("9:00", "bob"));
        assert!(drag.hover().is_none());

        let outcome = drag.handle_drop(&mut store, at("8:30", "bob")).unwrap();
        assert!(matches!(outcome, MoveOutcome::Moved { .. }));
        assert!(!drag.is_dragging());
        assert_eq!(body(&store, "8:30", "bob"), whole("Nowak"));
    }

    #[test]
    fn drag_end_cancels() {
        let store = store_with(&[("7:30", "anna", whole("Nowak"))]);
        let mut drag = DragSession::new();
        drag.handle_drag_start(&store, at("7:30", "anna"));
        drag.handle_drag_end();
        assert_eq!(drag.handle_drag_over(&store, at("8:00", "bob")), DropHint::NoEffect);
    }

    #[test]
    fn grid_is_a_lookup() {
        let mut grid = Grid::new();
        grid.set("7:30", "anna", Cell::new(whole("Nowak")));
        let placement = check_move(&grid, &at("7:30", "anna"), &at("8:00", "bob")).unwrap();
        assert_eq!(placement, Some(Placement::Whole));
    }
}
