use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::model::cell::{Cell, HistoryEntry};
use crate::model::config::ScheduleConfig;
use crate::model::grid::{CellRef, Grid};
use crate::model::wire::cell_to_wire;
use crate::ops::display::{DisplayData, cell_display_data};
use crate::store::AppState;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CellJson {
    pub time: String,
    pub employee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    /// The cell as it is persisted
    pub state: Value,
    pub display: DisplayData,
}

#[derive(Serialize)]
pub struct GridJson {
    pub time_slots: Vec<String>,
    pub employees: Vec<String>,
    pub cells: Vec<CellJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppState>,
}

#[derive(Serialize)]
pub struct HistoryJson {
    pub time: String,
    pub employee: String,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub struct EndDateJson {
    pub start_date: NaiveDate,
    pub extension_days: u32,
    pub end_date: NaiveDate,
}

/// Result of a write command
#[derive(Serialize)]
pub struct ChangeJson {
    pub action: String,
    pub message: String,
    pub cells: Vec<CellJson>,
}

#[derive(Serialize)]
pub struct WatchEventJson {
    pub event: String,
    pub path: String,
    pub applied: bool,
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

pub fn cell_to_json(
    cell: &Cell,
    cell_ref: &CellRef,
    config: &ScheduleConfig,
    today: NaiveDate,
) -> CellJson {
    let name = config.employee_name(&cell_ref.employee);
    CellJson {
        time: cell_ref.time.clone(),
        employee: cell_ref.employee.clone(),
        employee_name: (name != cell_ref.employee).then(|| name.to_string()),
        state: cell_to_wire(cell),
        display: cell_display_data(cell, today),
    }
}

/// Every stored cell, in grid order
pub fn grid_to_json(grid: &Grid, config: &ScheduleConfig, today: NaiveDate) -> GridJson {
    let cells = grid
        .iter()
        .map(|(time, employee, cell)| {
            cell_to_json(cell, &CellRef::new(time, employee), config, today)
        })
        .collect();
    GridJson {
        time_slots: config.grid.time_slots.clone(),
        employees: config.grid.employees.iter().map(|e| e.id.clone()).collect(),
        cells,
        status: None,
    }
}

pub fn history_to_json(cell: &Cell, cell_ref: &CellRef) -> HistoryJson {
    HistoryJson {
        time: cell_ref.time.clone(),
        employee: cell_ref.employee.clone(),
        entries: cell.history.entries().to_vec(),
    }
}
