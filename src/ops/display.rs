use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::cell::{Assignment, Cell, CellBody};
use crate::util::unicode::capitalize_first;

/// Text shown for a break cell
pub const BREAK_TEXT: &str = "PRZERWA";

pub const CLASS_BREAK: &str = "break-cell";
pub const CLASS_SPLIT: &str = "split-cell";
pub const CLASS_MASSAGE: &str = "massage-text";
pub const CLASS_PNF: &str = "pnf-text";
pub const CLASS_EVERY_OTHER_DAY: &str = "every-other-day-text";
pub const CLASS_TREATMENT_END: &str = "treatment-end-marker";

/// Style key carrying the background token of a whole cell
pub const STYLE_BACKGROUND: &str = "background";
pub const BACKGROUND_FILLED: &str = "cell-filled";
pub const BACKGROUND_EMPTY: &str = "cell-empty";

/// Renderable shape of one part of a split cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDisplay {
    pub text: String,
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_end: Option<NaiveDate>,
}

/// Renderable shape of a cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayData {
    pub text: String,
    pub classes: Vec<String>,
    pub styles: BTreeMap<String, String>,
    pub is_split: bool,
    pub parts: Vec<PartDisplay>,
    pub is_break: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_end: Option<NaiveDate>,
}

impl DisplayData {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

impl PartDisplay {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// Project a stored cell into its display shape.
///
/// Breaks short-circuit; split cells yield two parts, each with its own
/// style tags and end marker; whole cells carry the tags directly plus a
/// background token. Only the first character of the display text is
/// capitalized; stored content is never touched.
pub fn cell_display_data(cell: &Cell, today: NaiveDate) -> DisplayData {
    match &cell.body {
        CellBody::Break => DisplayData {
            text: BREAK_TEXT.to_string(),
            classes: vec![CLASS_BREAK.to_string()],
            styles: BTreeMap::new(),
            is_split: false,
            parts: Vec::new(),
            is_break: true,
            treatment_end: None,
        },
        CellBody::Split { part1, part2 } => DisplayData {
            text: String::new(),
            classes: vec![CLASS_SPLIT.to_string()],
            styles: BTreeMap::new(),
            is_split: true,
            parts: vec![part_display(part1, today), part_display(part2, today)],
            is_break: false,
            treatment_end: None,
        },
        CellBody::Whole(a) => {
            let mut classes = flag_classes(a);
            if ends_by(a, today) {
                classes.push(CLASS_TREATMENT_END.to_string());
            }
            let background = if a.is_empty() {
                BACKGROUND_EMPTY
            } else {
                BACKGROUND_FILLED
            };
            let mut styles = BTreeMap::new();
            styles.insert(STYLE_BACKGROUND.to_string(), background.to_string());
            DisplayData {
                text: capitalize_first(&a.content),
                classes,
                styles,
                is_split: false,
                parts: Vec::new(),
                is_break: false,
                treatment_end: a.treatment.as_ref().map(|t| t.end_date),
            }
        }
    }
}

fn part_display(a: &Assignment, today: NaiveDate) -> PartDisplay {
    let mut classes = flag_classes(a);
    if ends_by(a, today) {
        classes.push(CLASS_TREATMENT_END.to_string());
    }
    PartDisplay {
        text: capitalize_first(&a.content),
        classes,
        treatment_end: a.treatment.as_ref().map(|t| t.end_date),
    }
}

fn flag_classes(a: &Assignment) -> Vec<String> {
    let mut classes = Vec::new();
    if a.flags.massage {
        classes.push(CLASS_MASSAGE.to_string());
    }
    if a.flags.pnf {
        classes.push(CLASS_PNF.to_string());
    }
    if a.flags.every_other_day {
        classes.push(CLASS_EVERY_OTHER_DAY.to_string());
    }
    classes
}

/// The course has reached its end date and someone is still booked
fn ends_by(a: &Assignment, today: NaiveDate) -> bool {
    !a.is_empty()
        && a
            .treatment
            .as_ref()
            .is_some_and(|t| t.end_date <= today)
}
