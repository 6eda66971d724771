use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::cell::Cell;

/// Address of a cell: time-slot label and employee id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub time: String,
    pub employee: String,
}

impl CellRef {
    pub fn new(time: impl Into<String>, employee: impl Into<String>) -> Self {
        CellRef {
            time: time.into(),
            employee: employee.into(),
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.employee)
    }
}

/// The whole schedule: time slot → employee id → cell.
///
/// Both levels keep insertion order so the persisted document and any
/// display follow the order in which slots and employees were first written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    rows: IndexMap<String, IndexMap<String, Cell>>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, time: &str, employee: &str) -> Option<&Cell> {
        self.rows.get(time)?.get(employee)
    }

    /// The stored cell, or an empty one for a slot never written
    pub fn cell_or_default(&self, time: &str, employee: &str) -> Cell {
        self.get(time, employee).cloned().unwrap_or_default()
    }

    /// Write a cell, creating the time row on first use
    pub fn set(&mut self, time: &str, employee: &str, cell: Cell) {
        self.rows
            .entry(time.to_string())
            .or_default()
            .insert(employee.to_string(), cell);
    }

    pub fn time_slots(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Every stored cell in row order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Cell)> {
        self.rows.iter().flat_map(|(time, row)| {
            row.iter()
                .map(move |(employee, cell)| (time.as_str(), employee.as_str(), cell))
        })
    }

    pub fn cell_count(&self) -> usize {
        self.rows.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }
}
