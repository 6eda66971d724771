use chrono::NaiveDate;

use crate::model::cell::{Assignment, CellBody, Flag, Part, TreatmentWindow};
use crate::ops::dates::MAX_EXTENSION_DAYS;

/// A cell operation that does not apply to the cell's current shape.
/// Nothing is changed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellOpError {
    #[error("cell is a break")]
    BreakCell,
    #[error("cell is empty")]
    EmptyCell,
    #[error("cell is already split")]
    AlreadySplit,
    #[error("cell is not split")]
    NotSplit,
    #[error("both parts are occupied; clear one first")]
    BothPartsOccupied,
    #[error("cell has content; clear it first")]
    Occupied,
    #[error("choose a part of the split cell")]
    PartNotChosen,
}

/// Changes to a treatment window; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreatmentUpdate {
    pub start_date: Option<NaiveDate>,
    pub extension_days: Option<u32>,
    pub additional_info: Option<String>,
}

/// The assignment an operation addresses. A part on a whole cell is
/// ignored; a split cell needs one.
pub fn target_mut(body: &mut CellBody, part: Option<Part>) -> Result<&mut Assignment, CellOpError> {
    match (body, part) {
        (CellBody::Break, _) => Err(CellOpError::BreakCell),
        (CellBody::Whole(a), _) => Ok(a),
        (CellBody::Split { .. }, None) => Err(CellOpError::PartNotChosen),
        (CellBody::Split { part1, .. }, Some(Part::One)) => Ok(part1),
        (CellBody::Split { part2, .. }, Some(Part::Two)) => Ok(part2),
    }
}

pub fn target(body: &CellBody, part: Option<Part>) -> Result<&Assignment, CellOpError> {
    match (body, part) {
        (CellBody::Break, _) => Err(CellOpError::BreakCell),
        (CellBody::Whole(a), _) => Ok(a),
        (CellBody::Split { .. }, None) => Err(CellOpError::PartNotChosen),
        (CellBody::Split { part1, .. }, Some(Part::One)) => Ok(part1),
        (CellBody::Split { part2, .. }, Some(Part::Two)) => Ok(part2),
    }
}

/// Remove the assignment at `part`, leaving the cell as it reads after a
/// drag away: a whole cell becomes whole-empty, and a split cell that loses
/// one occupant merges, promoting the other occupant (if any) to the whole
/// cell. Returns `None`, changing nothing, when there is no content there.
pub fn take_assignment(body: &mut CellBody, part: Option<Part>) -> Option<Assignment> {
    match body {
        CellBody::Break => None,
        CellBody::Whole(a) => {
            if a.is_empty() {
                return None;
            }
            Some(std::mem::take(a))
        }
        CellBody::Split { part1, part2 } => {
            let (taken, other) = match part? {
                Part::One => (part1, part2),
                Part::Two => (part2, part1),
            };
            if taken.is_empty() {
                return None;
            }
            let taken = std::mem::take(taken);
            let remaining = std::mem::take(other);
            *body = if remaining.is_empty() {
                CellBody::default()
            } else {
                CellBody::Whole(remaining)
            };
            Some(taken)
        }
    }
}

/// Clear a whole cell, a break, a whole split cell (no part) or one part.
pub fn clear(body: &mut CellBody, part: Option<Part>) {
    match part {
        Some(p) if body.is_split() => {
            take_assignment(body, Some(p));
        }
        _ => *body = CellBody::default(),
    }
}

/// Set the content at `part`. Blank text clears it.
pub fn set_text(body: &mut CellBody, part: Option<Part>, text: &str) -> Result<(), CellOpError> {
    let text = text.trim();
    if text.is_empty() {
        if body.is_break() {
            return Err(CellOpError::BreakCell);
        }
        target(body, part)?;
        clear(body, part);
        return Ok(());
    }
    target_mut(body, part)?.content = text.to_string();
    Ok(())
}

/// Replace the whole assignment at `part`.
pub fn replace_assignment(
    body: &mut CellBody,
    part: Option<Part>,
    assignment: Assignment,
) -> Result<(), CellOpError> {
    *target_mut(body, part)? = assignment;
    Ok(())
}

/// Whole → split, keeping the current assignment in part 1.
pub fn split(body: &mut CellBody) -> Result<(), CellOpError> {
    match body {
        CellBody::Break => Err(CellOpError::BreakCell),
        CellBody::Split { .. } => Err(CellOpError::AlreadySplit),
        CellBody::Whole(a) if a.is_empty() => Err(CellOpError::EmptyCell),
        CellBody::Whole(a) => {
            let part1 = std::mem::take(a);
            *body = CellBody::Split {
                part1,
                part2: Assignment::default(),
            };
            Ok(())
        }
    }
}

/// Split → whole, promoting the single occupant.
pub fn merge(body: &mut CellBody) -> Result<(), CellOpError> {
    let CellBody::Split { part1, part2 } = body else {
        return Err(CellOpError::NotSplit);
    };
    let occupant = match (part1.is_empty(), part2.is_empty()) {
        (false, false) => return Err(CellOpError::BothPartsOccupied),
        (false, true) => std::mem::take(part1),
        (true, false) => std::mem::take(part2),
        (true, true) => Assignment::default(),
    };
    *body = CellBody::Whole(occupant);
    Ok(())
}

/// Empty cell ↔ break.
pub fn toggle_break(body: &mut CellBody) -> Result<(), CellOpError> {
    if body.is_break() {
        *body = CellBody::default();
        return Ok(());
    }
    if !body.is_empty() {
        return Err(CellOpError::Occupied);
    }
    *body = CellBody::Break;
    Ok(())
}

pub fn toggle_flag(body: &mut CellBody, part: Option<Part>, flag: Flag) -> Result<(), CellOpError> {
    target_mut(body, part)?.flags.toggle(flag);
    Ok(())
}

/// Edit the treatment window at `part`, starting one today if the
/// assignment has none. The end date is always recomputed.
pub fn set_treatment(
    body: &mut CellBody,
    part: Option<Part>,
    update: TreatmentUpdate,
    today: NaiveDate,
) -> Result<(), CellOpError> {
    let slot = target_mut(body, part)?;
    if slot.is_empty() {
        return Err(CellOpError::EmptyCell);
    }
    let window = slot
        .treatment
        .get_or_insert_with(|| TreatmentWindow::starting(today));
    if let Some(start) = update.start_date {
        window.start_date = start;
    }
    if let Some(days) = update.extension_days {
        window.extension_days = days.min(MAX_EXTENSION_DAYS);
    }
    if let Some(info) = update.additional_info {
        window.additional_info = info;
    }
    window.recompute_end();
    Ok(())
}

/// Start a treatment window today for every assignment that just became
/// occupied and has none.
pub fn ensure_treatment_windows(before: &CellBody, after: &mut CellBody, today: NaiveDate) {
    match after {
        CellBody::Break => {}
        CellBody::Whole(a) => {
            if before.is_empty() {
                seed(a, today);
            }
        }
        CellBody::Split { part1, part2 } => {
            if content_before(before, Part::One).trim().is_empty() {
                seed(part1, today);
            }
            if content_before(before, Part::Two).trim().is_empty() {
                seed(part2, today);
            }
        }
    }
}

fn seed(a: &mut Assignment, today: NaiveDate) {
    if !a.is_empty() && a.treatment.is_none() {
        a.treatment = Some(TreatmentWindow::starting(today));
    }
}

/// What a part held before the mutation. A whole cell's content counts as
/// part 1, which is where a split puts it.
fn content_before(before: &CellBody, part: Part) -> &str {
    match (before, part) {
        (CellBody::Split { .. }, p) => before.part(p).map_or("", |a| a.content.as_str()),
        (CellBody::Whole(a), Part::One) => &a.content,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn whole(content: &str) -> CellBody {
        CellBody::Whole(Assignment::new(content))
    }

    fn split_of(c1: &str, c2: &str) -> CellBody {
        CellBody::Split {
            part1: Assignment::new(c1),
            part2: Assignment::new(c2),
        }
    }

    #[test]
    fn take_from_whole_leaves_empty() {
        let mut body = whole("Nowak");
        let taken = take_assignment(&mut body, None).unwrap();
        assert_eq!(taken.content, "Nowak");
        assert_eq!(body, CellBody::default());
    }

    #[test]
    fn take_from_split_promotes_other_part() {
        let mut body = split_of("Nowak", "Lis");
        body.part_mut(Part::Two).unwrap().flags.pnf = true;
        let taken = take_assignment(&mut body, Some(Part::One)).unwrap();
        assert_eq!(taken.content, "Nowak");
        let CellBody::Whole(a) = &body else {
            panic!("expected whole cell, got {:?}", body)
        };
        assert_eq!(a.content, "Lis");
        assert!(a.flags.pnf);
    }

    #[test]
    fn take_last_occupant_of_split_leaves_empty() {
        let mut body = split_of("", "Lis");
        assert!(take_assignment(&mut body, Some(Part::Two)).is_some());
        assert_eq!(body, CellBody::default());
    }

    #[test]
    fn take_nothing_changes_nothing() {
        let mut body = split_of("Nowak", "");
        assert!(take_assignment(&mut body, Some(Part::Two)).is_none());
        assert!(take_assignment(&mut body, None).is_none());
        assert_eq!(body, split_of("Nowak", ""));
        let mut brk = CellBody::Break;
        assert!(take_assignment(&mut brk, None).is_none());
    }

    #[test]
    fn set_text_trims_and_blank_clears() {
        let mut body = CellBody::default();
        set_text(&mut body, None, "  Nowak ").unwrap();
        assert_eq!(body, whole("Nowak"));
        set_text(&mut body, None, "   ").unwrap();
        assert_eq!(body, CellBody::default());
    }

    #[test]
    fn set_text_on_split_needs_part() {
        let mut body = split_of("Nowak", "");
        assert_eq!(set_text(&mut body, None, "x"), Err(CellOpError::PartNotChosen));
        set_text(&mut body, Some(Part::Two), "Lis").unwrap();
        assert_eq!(body, split_of("Nowak", "Lis"));
        set_text(&mut body, Some(Part::One), "").unwrap();
        assert_eq!(body, whole("Lis"));
    }

    #[test]
    fn set_text_on_break_is_rejected() {
        let mut body = CellBody::Break;
        assert_eq!(set_text(&mut body, None, "x"), Err(CellOpError::BreakCell));
        assert_eq!(set_text(&mut body, None, ""), Err(CellOpError::BreakCell));
    }

    #[test]
    fn split_and_merge() {
        let mut body = whole("Nowak");
        split(&mut body).unwrap();
        assert_eq!(body, split_of("Nowak", ""));
        assert_eq!(split(&mut body), Err(CellOpError::AlreadySplit));
        merge(&mut body).unwrap();
        assert_eq!(body, whole("Nowak"));
        assert_eq!(merge(&mut body), Err(CellOpError::NotSplit));
    }

    #[test]
    fn split_rejects_empty_and_break() {
        assert_eq!(split(&mut CellBody::default()), Err(CellOpError::EmptyCell));
        assert_eq!(split(&mut CellBody::Break), Err(CellOpError::BreakCell));
    }

    #[test]
    fn merge_rejects_two_occupants() {
        let mut body = split_of("Nowak", "Lis");
        assert_eq!(merge(&mut body), Err(CellOpError::BothPartsOccupied));
        assert_eq!(body, split_of("Nowak", "Lis"));
    }

    #[test]
    fn merge_promotes_second_part() {
        let mut body = split_of("", "Lis");
        merge(&mut body).unwrap();
        assert_eq!(body, whole("Lis"));
    }

    #[test]
    fn break_toggles_only_when_empty() {
        let mut body = CellBody::default();
        toggle_break(&mut body).unwrap();
        assert!(body.is_break());
        toggle_break(&mut body).unwrap();
        assert_eq!(body, CellBody::default());

        let mut occupied = whole("Nowak");
        assert_eq!(toggle_break(&mut occupied), Err(CellOpError::Occupied));
    }

    #[test]
    fn clear_break_and_split() {
        let mut body = CellBody::Break;
        clear(&mut body, None);
        assert_eq!(body, CellBody::default());

        let mut body = split_of("Nowak", "Lis");
        clear(&mut body, Some(Part::Two));
        assert_eq!(body, whole("Nowak"));

        let mut body = split_of("Nowak", "Lis");
        clear(&mut body, None);
        assert_eq!(body, CellBody::default());
    }

    #[test]
    fn flags_toggle_per_part() {
        let mut body = split_of("Nowak", "Lis");
        toggle_flag(&mut body, Some(Part::Two), Flag::Massage).unwrap();
        assert!(!body.part(Part::One).unwrap().flags.massage);
        assert!(body.part(Part::Two).unwrap().flags.massage);
    }

    #[test]
    fn treatment_update_recomputes_end() {
        let mut body = whole("Nowak");
        set_treatment(
            &mut body,
            None,
            TreatmentUpdate {
                start_date: Some(d(2024, 1, 15)),
                extension_days: Some(5),
                additional_info: Some("knee".into()),
            },
            d(2024, 3, 1),
        )
        .unwrap();
        let t = target(&body, None).unwrap().treatment.clone().unwrap();
        assert_eq!(t.start_date, d(2024, 1, 15));
        assert_eq!(t.end_date, d(2024, 2, 12));
        assert_eq!(t.additional_info, "knee");

        let update = TreatmentUpdate {
            extension_days: Some(1000),
            ..Default::default()
        };
        set_treatment(&mut body, None, update, d(2024, 3, 1)).unwrap();
        let t = target(&body, None).unwrap().treatment.clone().unwrap();
        assert_eq!(t.extension_days, MAX_EXTENSION_DAYS);
    }

    #[test]
    fn treatment_needs_content() {
        let mut body = CellBody::default();
        let result = set_treatment(&mut body, None, TreatmentUpdate::default(), d(2024, 1, 15));
        assert_eq!(result, Err(CellOpError::EmptyCell));
    }

    #[test]
    fn seeding_on_empty_to_filled() {
        let today = d(2024, 1, 15);
        let before = CellBody::default();
        let mut after = whole("Nowak");
        ensure_treatment_windows(&before, &mut after, today);
        let t = target(&after, None).unwrap().treatment.clone().unwrap();
        assert_eq!(t.start_date, today);
        assert_eq!(t.extension_days, 0);
        assert_eq!(t.end_date, d(2024, 2, 5));
    }

    #[test]
    fn no_seeding_for_edits_of_filled_cell() {
        let before = whole("Nowak");
        let mut after = whole("Nowak Jan");
        ensure_treatment_windows(&before, &mut after, d(2024, 1, 15));
        assert!(target(&after, None).unwrap().treatment.is_none());
    }

    #[test]
    fn seeding_applies_to_the_new_part_only() {
        let today = d(2024, 1, 15);
        let before = whole("Nowak");
        let mut after = split_of("Nowak", "Lis");
        ensure_treatment_windows(&before, &mut after, today);
        assert!(after.part(Part::One).unwrap().treatment.is_none());
        assert!(after.part(Part::Two).unwrap().treatment.is_some());
    }

    #[test]
    fn existing_window_is_kept() {
        let start = d(2023, 12, 1);
        let mut moved = Assignment::new("Nowak");
        moved.treatment = Some(TreatmentWindow::starting(start));
        let mut after = CellBody::Whole(moved);
        ensure_treatment_windows(&CellBody::default(), &mut after, d(2024, 1, 15));
        let t = target(&after, None).unwrap().treatment.clone().unwrap();
        assert_eq!(t.start_date, start);
    }
}
