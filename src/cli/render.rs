use chrono::NaiveDate;

use crate::model::cell::{Assignment, Cell, CellBody, Part};
use crate::model::config::ScheduleConfig;
use crate::model::grid::{CellRef, Grid};
use crate::ops::dates::format_date;
use crate::ops::display::{
    CLASS_EVERY_OTHER_DAY, CLASS_MASSAGE, CLASS_PNF, CLASS_TREATMENT_END, PartDisplay,
    cell_display_data,
};
use crate::util::unicode::{display_width, pad_to_width, truncate_to_width};

const MAX_COLUMN_WIDTH: usize = 24;
const TIME_HEADER: &str = "TIME";
const COLUMN_GAP: &str = "  ";

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Row labels: configured slots first, then any others found in the grid
fn row_labels(grid: &Grid, config: &ScheduleConfig) -> Vec<String> {
    let mut rows = config.grid.time_slots.clone();
    for time in grid.time_slots() {
        if !rows.iter().any(|r| r == time) {
            rows.push(time.to_string());
        }
    }
    rows
}

/// Column keys: configured employees first, then any others found in the grid
fn column_keys(grid: &Grid, config: &ScheduleConfig) -> Vec<String> {
    let mut columns: Vec<String> = config.grid.employees.iter().map(|e| e.id.clone()).collect();
    for (_, employee, _) in grid.iter() {
        if !columns.iter().any(|c| c == employee) {
            columns.push(employee.to_string());
        }
    }
    columns
}

/// Render the grid as an aligned text table, one row per time slot.
pub fn render_grid(grid: &Grid, config: &ScheduleConfig, today: NaiveDate) -> String {
    let rows = row_labels(grid, config);
    let columns = column_keys(grid, config);
    if rows.is_empty() || columns.is_empty() {
        return "(empty schedule)\n".to_string();
    }

    let header: Vec<String> = columns
        .iter()
        .map(|id| config.employee_name(id).to_string())
        .collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|time| {
            columns
                .iter()
                .map(|employee| {
                    let cell = grid.cell_or_default(time, employee);
                    truncate_to_width(&cell_label(&cell, today), MAX_COLUMN_WIDTH)
                })
                .collect()
        })
        .collect();

    let time_width = rows
        .iter()
        .map(|r| display_width(r))
        .chain(std::iter::once(display_width(TIME_HEADER)))
        .max()
        .unwrap_or(0);
    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            body.iter()
                .map(|row| display_width(&row[i]))
                .chain(std::iter::once(display_width(&header[i])))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, TIME_HEADER, time_width, &header, &widths);
    for (time, row) in rows.iter().zip(&body) {
        push_line(&mut out, time, time_width, row, &widths);
    }
    out
}

fn push_line(out: &mut String, label: &str, label_width: usize, cells: &[String], widths: &[usize]) {
    let mut line = pad_to_width(label, label_width);
    for (cell, width) in cells.iter().zip(widths) {
        line.push_str(COLUMN_GAP);
        line.push_str(&pad_to_width(cell, *width));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// One-line label for a cell in the grid view
pub fn cell_label(cell: &Cell, today: NaiveDate) -> String {
    let display = cell_display_data(cell, today);
    if display.is_break {
        return display.text;
    }
    if display.is_split {
        let parts: Vec<String> = display
            .parts
            .iter()
            .map(|p| {
                let label = part_label(p);
                if label.is_empty() { "-".to_string() } else { label }
            })
            .collect();
        return parts.join(" | ");
    }
    part_label(&PartDisplay {
        text: display.text,
        classes: display.classes,
        treatment_end: display.treatment_end,
    })
}

fn part_label(part: &PartDisplay) -> String {
    if part.text.trim().is_empty() {
        return String::new();
    }
    let mut label = part.text.clone();
    for (class, marker) in [
        (CLASS_MASSAGE, " (M)"),
        (CLASS_PNF, " (PNF)"),
        (CLASS_EVERY_OTHER_DAY, " (EOD)"),
        (CLASS_TREATMENT_END, " !"),
    ] {
        if part.has_class(class) {
            label.push_str(marker);
        }
    }
    label
}

// ---------------------------------------------------------------------------
// Cell detail
// ---------------------------------------------------------------------------

fn cell_title(cell_ref: &CellRef, config: &ScheduleConfig) -> String {
    let name = config.employee_name(&cell_ref.employee);
    if name == cell_ref.employee {
        cell_ref.to_string()
    } else {
        format!("{} {} ({})", cell_ref.time, name, cell_ref.employee)
    }
}

/// Multi-line description of a single cell
pub fn render_cell(cell: &Cell, cell_ref: &CellRef, config: &ScheduleConfig, today: NaiveDate) -> String {
    let mut out = format!("{}\n", cell_title(cell_ref, config));
    match &cell.body {
        CellBody::Break => out.push_str("  break\n"),
        CellBody::Whole(a) if a.is_empty() => out.push_str("  empty\n"),
        CellBody::Whole(a) => push_assignment(&mut out, a, "  ", today),
        CellBody::Split { part1, part2 } => {
            for (part, a) in [(Part::One, part1), (Part::Two, part2)] {
                if a.is_empty() {
                    out.push_str(&format!("  part {}: (empty)\n", part));
                } else {
                    out.push_str(&format!("  part {}:\n", part));
                    push_assignment(&mut out, a, "    ", today);
                }
            }
        }
    }
    if !cell.history.is_empty() {
        out.push_str(&format!("  history: {} entries\n", cell.history.len()));
    }
    out
}

fn push_assignment(out: &mut String, a: &Assignment, indent: &str, today: NaiveDate) {
    out.push_str(&format!("{}content: {}\n", indent, a.content));
    let flags: Vec<&str> = [
        (a.flags.massage, "massage"),
        (a.flags.pnf, "pnf"),
        (a.flags.every_other_day, "every other day"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if !flags.is_empty() {
        out.push_str(&format!("{}flags: {}\n", indent, flags.join(", ")));
    }
    if let Some(t) = &a.treatment {
        let ended = if t.end_date <= today { " (ended)" } else { "" };
        out.push_str(&format!(
            "{}treatment: {} +{} -> {}{}\n",
            indent,
            format_date(t.start_date),
            t.extension_days,
            format_date(t.end_date),
            ended
        ));
        if !t.additional_info.is_empty() {
            out.push_str(&format!("{}info: {}\n", indent, t.additional_info));
        }
    }
}

/// Newest-first change history of a cell
pub fn render_history(cell: &Cell, cell_ref: &CellRef, config: &ScheduleConfig) -> String {
    let mut out = format!("{} history:\n", cell_title(cell_ref, config));
    if cell.history.is_empty() {
        out.push_str("  (no history)\n");
    }
    for entry in cell.history.entries() {
        out.push_str(&format!(
            "  {} {}: {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.author_id,
            entry.old_value
        ));
    }
    out
}
