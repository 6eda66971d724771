use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ops::dates::calculate_end_date;

/// Maximum length of an assignment's content, in characters
pub const CONTENT_MAX_CHARS: usize = 35;
/// Maximum length of a treatment's additional info, in characters
pub const INFO_MAX_CHARS: usize = 50;
/// Maximum number of history entries kept per cell
pub const HISTORY_LIMIT: usize = 10;

/// One half of a split cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Part {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
}

impl Part {
    pub fn from_index(index: u8) -> Option<Part> {
        match index {
            1 => Some(Part::One),
            2 => Some(Part::Two),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Part::One => 1,
            Part::Two => 2,
        }
    }

    pub fn other(self) -> Part {
        match self {
            Part::One => Part::Two,
            Part::Two => Part::One,
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Style flags carried by an assignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub massage: bool,
    pub pnf: bool,
    pub every_other_day: bool,
}

/// Names a single flag for toggling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Massage,
    Pnf,
    EveryOtherDay,
}

impl Flags {
    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::Massage => self.massage,
            Flag::Pnf => self.pnf,
            Flag::EveryOtherDay => self.every_other_day,
        }
    }

    pub fn toggle(&mut self, flag: Flag) {
        match flag {
            Flag::Massage => self.massage = !self.massage,
            Flag::Pnf => self.pnf = !self.pnf,
            Flag::EveryOtherDay => self.every_other_day = !self.every_other_day,
        }
    }
}

/// The active date range of a therapy course
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentWindow {
    pub start_date: NaiveDate,
    pub extension_days: u32,
    pub end_date: NaiveDate,
    pub additional_info: String,
}

impl TreatmentWindow {
    /// A fresh course starting on `start_date` with no extension
    pub fn starting(start_date: NaiveDate) -> Self {
        Self::new(start_date, 0)
    }

    pub fn new(start_date: NaiveDate, extension_days: u32) -> Self {
        TreatmentWindow {
            start_date,
            extension_days,
            end_date: calculate_end_date(start_date, extension_days),
            additional_info: String::new(),
        }
    }

    /// Recompute `end_date` from the start date and extension.
    pub fn recompute_end(&mut self) {
        self.end_date = calculate_end_date(self.start_date, self.extension_days);
    }
}

/// A patient or activity assigned to a cell or to one part of a split cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub content: String,
    pub flags: Flags,
    pub treatment: Option<TreatmentWindow>,
}

impl Assignment {
    pub fn new(content: impl Into<String>) -> Self {
        Assignment {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// The three mutually exclusive shapes a cell can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellBody {
    Break,
    Whole(Assignment),
    Split { part1: Assignment, part2: Assignment },
}

impl Default for CellBody {
    fn default() -> Self {
        CellBody::Whole(Assignment::default())
    }
}

impl CellBody {
    pub fn is_break(&self) -> bool {
        matches!(self, CellBody::Break)
    }

    pub fn is_split(&self) -> bool {
        matches!(self, CellBody::Split { .. })
    }

    /// True when the cell holds no assignment at all (breaks included)
    pub fn is_empty(&self) -> bool {
        match self {
            CellBody::Break => true,
            CellBody::Whole(a) => a.is_empty(),
            CellBody::Split { part1, part2 } => part1.is_empty() && part2.is_empty(),
        }
    }

    pub fn part(&self, part: Part) -> Option<&Assignment> {
        match (self, part) {
            (CellBody::Split { part1, .. }, Part::One) => Some(part1),
            (CellBody::Split { part2, .. }, Part::Two) => Some(part2),
            _ => None,
        }
    }

    pub fn part_mut(&mut self, part: Part) -> Option<&mut Assignment> {
        match (self, part) {
            (CellBody::Split { part1, .. }, Part::One) => Some(part1),
            (CellBody::Split { part2, .. }, Part::Two) => Some(part2),
            _ => None,
        }
    }

    /// Content used for history: whole content, or `content1/content2`.
    pub fn effective_content(&self) -> String {
        match self {
            CellBody::Break => String::new(),
            CellBody::Whole(a) => a.content.clone(),
            CellBody::Split { part1, part2 } => format!("{}/{}", part1.content, part2.content),
        }
    }

    /// Collapse a split cell whose parts are both empty back to whole-empty.
    pub fn normalize(&mut self) {
        if let CellBody::Split { part1, part2 } = self
            && part1.is_empty()
            && part2.is_empty()
        {
            *self = CellBody::default();
        }
    }

    /// Iterate over the assignments with the part they occupy
    /// (`None` for a whole cell).
    pub fn assignments(&self) -> Vec<(Option<Part>, &Assignment)> {
        match self {
            CellBody::Break => Vec::new(),
            CellBody::Whole(a) => vec![(None, a)],
            CellBody::Split { part1, part2 } => {
                vec![(Some(Part::One), part1), (Some(Part::Two), part2)]
            }
        }
    }
}

/// A record of a cell's previous effective content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub old_value: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: String,
}

/// Newest-first list of previous values, capped at `HISTORY_LIMIT`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn from_entries(mut entries: Vec<HistoryEntry>) -> Self {
        entries.truncate(HISTORY_LIMIT);
        History { entries }
    }

    /// Prepend an entry unless the newest entry already holds the same value.
    /// Returns whether the entry was added.
    pub fn record(&mut self, entry: HistoryEntry, limit: usize) -> bool {
        if self
            .entries
            .first()
            .is_some_and(|newest| newest.old_value == entry.old_value)
        {
            return false;
        }
        self.entries.insert(0, entry);
        self.entries.truncate(limit.min(HISTORY_LIMIT));
        true
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A (time-slot, employee) assignment unit with its change history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub struct Cell {
    pub body: CellBody,
    pub history: History,
}

impl Cell {
    pub fn new(body: CellBody) -> Self {
        Cell {
            body,
            history: History::default(),
        }
    }

    pub fn whole(assignment: Assignment) -> Self {
        Cell::new(CellBody::Whole(assignment))
    }

    pub fn split(part1: Assignment, part2: Assignment) -> Self {
        Cell::new(CellBody::Split { part1, part2 })
    }

    pub fn break_cell() -> Self {
        Cell::new(CellBody::Break)
    }

    pub fn has_content(&self) -> bool {
        !self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: &str) -> HistoryEntry {
        HistoryEntry {
            old_value: value.into(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            author_id: "tester".into(),
        }
    }

    #[test]
    fn history_is_newest_first_and_capped() {
        let mut history = History::default();
        for i in 0..15 {
            history.record(entry(&format!("v{}", i)), HISTORY_LIMIT);
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.entries()[0].old_value, "v14");
        assert_eq!(history.entries()[9].old_value, "v5");
    }

    #[test]
    fn history_skips_consecutive_duplicate() {
        let mut history = History::default();
        assert!(history.record(entry("Kowalski"), HISTORY_LIMIT));
        assert!(!history.record(entry("Kowalski"), HISTORY_LIMIT));
        assert_eq!(history.len(), 1);
        // Non-consecutive repeats are kept
        assert!(history.record(entry("Nowak"), HISTORY_LIMIT));
        assert!(history.record(entry("Kowalski"), HISTORY_LIMIT));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn history_limit_never_exceeds_cap() {
        let mut history = History::default();
        for i in 0..30 {
            history.record(entry(&i.to_string()), 50);
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
    }

    #[test]
    fn normalize_collapses_empty_split() {
        let mut body = CellBody::Split {
            part1: Assignment::default(),
            part2: Assignment::new("  "),
        };
        body.normalize();
        assert_eq!(body, CellBody::default());
    }

    #[test]
    fn normalize_keeps_half_filled_split() {
        let mut body = CellBody::Split {
            part1: Assignment::new("Kowalski"),
            part2: Assignment::default(),
        };
        body.normalize();
        assert!(body.is_split());
    }

    #[test]
    fn effective_content_of_each_shape() {
        assert_eq!(CellBody::Break.effective_content(), "");
        assert_eq!(
            CellBody::Whole(Assignment::new("Nowak")).effective_content(),
            "Nowak"
        );
        let split = CellBody::Split {
            part1: Assignment::new("Nowak"),
            part2: Assignment::default(),
        };
        assert_eq!(split.effective_content(), "Nowak/");
    }

    #[test]
    fn flags_toggle() {
        let mut flags = Flags::default();
        flags.toggle(Flag::Pnf);
        assert!(flags.get(Flag::Pnf));
        assert!(!flags.get(Flag::Massage));
        flags.toggle(Flag::Pnf);
        assert_eq!(flags, Flags::default());
    }

    #[test]
    fn treatment_window_computes_end() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut window = TreatmentWindow::starting(start);
        assert_eq!(window.end_date, NaiveDate::from_ymd_opt(2024, 2, 5).unwrap());
        window.extension_days = 5;
        window.recompute_end();
        assert_eq!(window.end_date, NaiveDate::from_ymd_opt(2024, 2, 12).unwrap());
    }
}
