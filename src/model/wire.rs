//! Conversion between [`Cell`] and the flat camelCase object persisted in
//! the schedule document.
//!
//! Decoding is total: any JSON value yields a cell. Unreadable flags read as
//! `false`, a treatment window without a usable start date is dropped, a
//! missing end date is recomputed, and a split whose parts are both empty
//! decodes as a whole-empty cell.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};

use crate::model::cell::{
    Assignment, Cell, CellBody, Flags, History, HistoryEntry, TreatmentWindow,
};
use crate::ops::dates::{calculate_end_date, format_date, parse_date, parse_extension};

/// Top-level keys a persisted cell may carry
pub const CELL_KEYS: &[&str] = &[
    "isBreak",
    "content",
    "isMassage",
    "isPnf",
    "isEveryOtherDay",
    "treatmentStartDate",
    "treatmentExtensionDays",
    "treatmentEndDate",
    "additionalInfo",
    "isSplit",
    "content1",
    "content2",
    "isMassage1",
    "isMassage2",
    "isPnf1",
    "isPnf2",
    "isEveryOtherDay1",
    "isEveryOtherDay2",
    "treatmentData1",
    "treatmentData2",
    "history",
];

/// Keys of a nested `treatmentData1` / `treatmentData2` object
pub const TREATMENT_KEYS: &[&str] = &["startDate", "extensionDays", "endDate", "additionalInfo"];

/// Keys of one history entry
pub const HISTORY_KEYS: &[&str] = &["oldValue", "timestamp", "authorId"];

/// Field names used for one assignment in the wire shape
struct AssignmentKeys {
    content: &'static str,
    massage: &'static str,
    pnf: &'static str,
    every_other_day: &'static str,
}

const WHOLE_KEYS: AssignmentKeys = AssignmentKeys {
    content: "content",
    massage: "isMassage",
    pnf: "isPnf",
    every_other_day: "isEveryOtherDay",
};

const PART1_KEYS: AssignmentKeys = AssignmentKeys {
    content: "content1",
    massage: "isMassage1",
    pnf: "isPnf1",
    every_other_day: "isEveryOtherDay1",
};

const PART2_KEYS: AssignmentKeys = AssignmentKeys {
    content: "content2",
    massage: "isMassage2",
    pnf: "isPnf2",
    every_other_day: "isEveryOtherDay2",
};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a cell into its persisted object form.
pub fn cell_to_wire(cell: &Cell) -> Value {
    let mut obj = Map::new();
    match &cell.body {
        CellBody::Break => {
            obj.insert("isBreak".into(), Value::Bool(true));
        }
        CellBody::Whole(a) => {
            write_assignment(&mut obj, a, &WHOLE_KEYS);
            if let Some(t) = &a.treatment {
                obj.insert("treatmentStartDate".into(), json!(format_date(t.start_date)));
                obj.insert("treatmentExtensionDays".into(), json!(t.extension_days));
                obj.insert("treatmentEndDate".into(), json!(format_date(t.end_date)));
                obj.insert("additionalInfo".into(), json!(t.additional_info));
            }
        }
        CellBody::Split { part1, part2 } => {
            obj.insert("isSplit".into(), Value::Bool(true));
            write_assignment(&mut obj, part1, &PART1_KEYS);
            write_assignment(&mut obj, part2, &PART2_KEYS);
            obj.insert("treatmentData1".into(), treatment_object(part1));
            obj.insert("treatmentData2".into(), treatment_object(part2));
        }
    }
    if !cell.history.is_empty() {
        let entries = cell
            .history
            .entries()
            .iter()
            .map(|e| {
                json!({
                    "oldValue": e.old_value,
                    "timestamp": e.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    "authorId": e.author_id,
                })
            })
            .collect();
        obj.insert("history".into(), Value::Array(entries));
    }
    Value::Object(obj)
}

fn write_assignment(obj: &mut Map<String, Value>, a: &Assignment, keys: &AssignmentKeys) {
    obj.insert(keys.content.into(), json!(a.content));
    obj.insert(keys.massage.into(), json!(a.flags.massage));
    obj.insert(keys.pnf.into(), json!(a.flags.pnf));
    obj.insert(keys.every_other_day.into(), json!(a.flags.every_other_day));
}

fn treatment_object(a: &Assignment) -> Value {
    match &a.treatment {
        Some(t) => json!({
            "startDate": format_date(t.start_date),
            "extensionDays": t.extension_days,
            "endDate": format_date(t.end_date),
            "additionalInfo": t.additional_info,
        }),
        None => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a persisted object into a cell.
pub fn cell_from_wire(value: &Value) -> Cell {
    let Some(obj) = value.as_object() else {
        return Cell::default();
    };

    let mut body = if bool_field(obj, "isBreak") {
        CellBody::Break
    } else if bool_field(obj, "isSplit") {
        let mut part1 = read_assignment(obj, &PART1_KEYS);
        part1.treatment = obj.get("treatmentData1").and_then(nested_treatment);
        let mut part2 = read_assignment(obj, &PART2_KEYS);
        part2.treatment = obj.get("treatmentData2").and_then(nested_treatment);
        CellBody::Split { part1, part2 }
    } else {
        let mut a = read_assignment(obj, &WHOLE_KEYS);
        a.treatment = read_treatment(
            obj.get("treatmentStartDate"),
            obj.get("treatmentExtensionDays"),
            obj.get("treatmentEndDate"),
            obj.get("additionalInfo"),
        );
        CellBody::Whole(a)
    };
    body.normalize();

    let history = obj
        .get("history")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(history_entry).collect())
        .unwrap_or_default();

    Cell {
        body,
        history: History::from_entries(history),
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or("")
}

fn read_assignment(obj: &Map<String, Value>, keys: &AssignmentKeys) -> Assignment {
    Assignment {
        content: str_field(obj, keys.content).to_string(),
        flags: Flags {
            massage: bool_field(obj, keys.massage),
            pnf: bool_field(obj, keys.pnf),
            every_other_day: bool_field(obj, keys.every_other_day),
        },
        treatment: None,
    }
}

fn nested_treatment(value: &Value) -> Option<TreatmentWindow> {
    let obj = value.as_object()?;
    read_treatment(
        obj.get("startDate"),
        obj.get("extensionDays"),
        obj.get("endDate"),
        obj.get("additionalInfo"),
    )
}

fn read_treatment(
    start: Option<&Value>,
    extension: Option<&Value>,
    end: Option<&Value>,
    info: Option<&Value>,
) -> Option<TreatmentWindow> {
    let start_date = start.and_then(Value::as_str).and_then(parse_date)?;
    let extension_days = extension.map(parse_extension).unwrap_or(0);
    let end_date = end
        .and_then(Value::as_str)
        .and_then(parse_date)
        .unwrap_or_else(|| calculate_end_date(start_date, extension_days));
    Some(TreatmentWindow {
        start_date,
        extension_days,
        end_date,
        additional_info: info.and_then(Value::as_str).unwrap_or("").to_string(),
    })
}

fn history_entry(value: &Value) -> Option<HistoryEntry> {
    let obj = value.as_object()?;
    let old_value = obj.get("oldValue")?.as_str()?.to_string();
    let timestamp = match obj.get("timestamp")? {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        // Milliseconds since the epoch
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single()?,
        _ => return None,
    };
    let author_id = obj
        .get("authorId")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    Some(HistoryEntry {
        old_value,
        timestamp,
        author_id,
    })
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        cell_from_wire(&value)
    }
}

impl From<Cell> for Value {
    fn from(cell: Cell) -> Self {
        cell_to_wire(&cell)
    }
}
