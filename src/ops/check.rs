use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::model::cell::Part;
use crate::model::config::ScheduleConfig;
use crate::model::wire::cell_from_wire;
use crate::ops::validate::validate_cell_state;

/// Structured result from `sg check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub cells_checked: usize,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// Something in the persisted document that should be fixed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// The document itself is not shaped like a schedule
    #[serde(rename = "malformed_document")]
    MalformedDocument { reason: String },
    /// A time-slot row is not an object of cells
    #[serde(rename = "malformed_row")]
    MalformedRow { time: String },
    /// A cell fails validation
    #[serde(rename = "invalid_cell")]
    InvalidCell {
        time: String,
        employee: String,
        problems: Vec<String>,
    },
}

/// Non-critical findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// No document has been saved yet
    #[serde(rename = "no_document")]
    NoDocument,
    /// Row label not listed in [grid] time_slots
    #[serde(rename = "unknown_time_slot")]
    UnknownTimeSlot { time: String },
    /// Column key not listed in [grid] employees
    #[serde(rename = "unknown_employee")]
    UnknownEmployee { time: String, employee: String },
    /// The same text is booked in more than one place
    #[serde(rename = "duplicate_content")]
    DuplicateContent { content: String, places: Vec<String> },
    /// Document id differs from the configured one
    #[serde(rename = "document_id_mismatch")]
    DocumentIdMismatch { expected: String, found: String },
}

// ---------------------------------------------------------------------------
// Main check entry point
// ---------------------------------------------------------------------------

/// Validate a persisted document as it sits on disk.
///
/// This is a read-only operation. Checks performed:
/// 1. The document is an object with a `scheduleCells` map of rows
/// 2. Every cell passes the persisted-cell validation rules
/// 3. Rows and columns are known to the configuration (warnings)
/// 4. No text is booked twice (warning)
pub fn check_document(raw: Option<&Value>, config: &ScheduleConfig) -> CheckResult {
    let mut result = CheckResult::default();
    let Some(raw) = raw else {
        result.warnings.push(CheckWarning::NoDocument);
        result.valid = true;
        return result;
    };

    let Some(doc) = raw.as_object() else {
        result.errors.push(CheckError::MalformedDocument {
            reason: "document is not an object".to_string(),
        });
        return result;
    };

    if let Some(found) = doc.get("documentId").and_then(Value::as_str)
        && found != config.schedule.document_id
    {
        result.warnings.push(CheckWarning::DocumentIdMismatch {
            expected: config.schedule.document_id.clone(),
            found: found.to_string(),
        });
    }

    let rows = match doc.get("scheduleCells") {
        None | Some(Value::Null) => {
            result.valid = true;
            return result;
        }
        Some(Value::Object(rows)) => rows,
        Some(_) => {
            result.errors.push(CheckError::MalformedDocument {
                reason: "scheduleCells is not an object".to_string(),
            });
            return result;
        }
    };

    let mut bookings: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
    for (time, row) in rows {
        check_row(time, row, config, &mut result, &mut bookings);
    }

    for (_, (content, places)) in bookings {
        if places.len() > 1 {
            result
                .warnings
                .push(CheckWarning::DuplicateContent { content, places });
        }
    }

    result.valid = result.errors.is_empty();
    result
}

fn check_row(
    time: &str,
    row: &Value,
    config: &ScheduleConfig,
    result: &mut CheckResult,
    bookings: &mut BTreeMap<String, (String, Vec<String>)>,
) {
    let Some(cells) = row.as_object() else {
        result.errors.push(CheckError::MalformedRow {
            time: time.to_string(),
        });
        return;
    };
    if !config.has_time_slot(time) {
        result.warnings.push(CheckWarning::UnknownTimeSlot {
            time: time.to_string(),
        });
    }

    for (employee, value) in cells {
        result.cells_checked += 1;
        let known = config.grid.employees.is_empty()
            || config.grid.employees.iter().any(|e| &e.id == employee);
        if !known {
            result.warnings.push(CheckWarning::UnknownEmployee {
                time: time.to_string(),
                employee: employee.clone(),
            });
        }

        let validation = validate_cell_state(value);
        if !validation.valid {
            result.errors.push(CheckError::InvalidCell {
                time: time.to_string(),
                employee: employee.clone(),
                problems: validation.errors.iter().map(|e| e.to_string()).collect(),
            });
        }

        let cell = cell_from_wire(value);
        for (part, assignment) in cell.body.assignments() {
            if assignment.is_empty() {
                continue;
            }
            let content = assignment.content.trim().to_string();
            let place = place_label(time, employee, part);
            bookings
                .entry(content.to_lowercase())
                .or_insert_with(|| (content, Vec::new()))
                .1
                .push(place);
        }
    }
}

fn place_label(time: &str, employee: &str, part: Option<Part>) -> String {
    match part {
        Some(p) => format!("{} {}/{}", time, employee, p),
        None => format!("{} {}", time, employee),
    }
}
