use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

/// File name of the recovery log inside the schedule directory
pub const RECOVERY_LOG: &str = ".recovery.log";

/// Written at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- sg recovery log: documents that could not be saved normally.
     Each entry holds the full JSON body that was lost or overwritten.
     Safe to delete once the schedule looks right. -->

---
";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// A document write failed; the body is the unsaved document
    Write,
    /// Another writer changed the document since we last saw it; the body is
    /// the on-disk version that our write replaced
    Conflict,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Write => write!(f, "write"),
            RecoveryCategory::Conflict => write!(f, "conflict"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "write" => Some(RecoveryCategory::Write),
            "conflict" => Some(RecoveryCategory::Conflict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

pub fn recovery_log_path(schedule_dir: &Path) -> PathBuf {
    schedule_dir.join(RECOVERY_LOG)
}

// ---------------------------------------------------------------------------
// Atomic file write
// ---------------------------------------------------------------------------

/// Write `content` to `path` through a temp file in the same directory,
/// then rename over the target.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry formatting
// ---------------------------------------------------------------------------

impl RecoveryEntry {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} | {}: {}\n\n",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.body.is_empty() {
            out.push_str("\n```json\n");
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out.push_str("\n---\n");
        out
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Append an entry to the recovery log. Failures are reported through `log`
/// and otherwise swallowed: the caller is already on an error path.
pub fn log_recovery(schedule_dir: &Path, entry: RecoveryEntry) {
    log::warn!(
        "recording {} recovery entry: {}",
        entry.category,
        entry.description
    );
    if let Err(e) = append_entry(schedule_dir, &entry) {
        log::error!("could not write to recovery log: {}", e);
    }
}

fn append_entry(schedule_dir: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    let path = recovery_log_path(schedule_dir);
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading entries
// ---------------------------------------------------------------------------

/// All entries in the log, newest first. A missing log reads as empty.
pub fn read_recovery_entries(schedule_dir: &Path) -> Vec<RecoveryEntry> {
    let content = match std::fs::read_to_string(recovery_log_path(schedule_dir)) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let mut entries = parse_entries(&content);
    entries.reverse();
    entries
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some(header) = line.strip_prefix("## ") else {
            continue;
        };
        let Some((timestamp, category, description)) = parse_entry_header(header) else {
            continue;
        };

        let mut fields = Vec::new();
        let mut body = String::new();
        let mut in_body = false;
        for line in lines.by_ref() {
            if in_body {
                if line == "```" {
                    in_body = false;
                } else {
                    body.push_str(line);
                    body.push('\n');
                }
                continue;
            }
            if line == "---" {
                break;
            }
            if line.starts_with("```") {
                in_body = true;
                continue;
            }
            if let Some((key, value)) = line.trim().split_once(": ") {
                fields.push((key.to_string(), value.to_string()));
            }
        }

        entries.push(RecoveryEntry {
            timestamp,
            category,
            description,
            fields,
            body,
        });
    }
    entries
}

/// `<timestamp> | <category>: <description>`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (stamp, rest) = header.split_once(" | ")?;
    let timestamp = DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc);
    let (category, description) = rest.split_once(": ")?;
    let category = RecoveryCategory::parse_category(category)?;
    Some((timestamp, category, description.to_string()))
}

impl RecoveryEntry {
    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "category": self.category.to_string(),
            "description": self.description,
            "fields": fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn entry(category: RecoveryCategory, description: &str, body: &str) -> RecoveryEntry {
        RecoveryEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            category,
            description: description.to_string(),
            fields: vec![("Target".to_string(), "schedule.json".to_string())],
            body: body.to_string(),
        }
    }

    #[test]
    fn entry_markdown_layout() {
        let md = entry(RecoveryCategory::Write, "document write failed", "{}").to_markdown();
        insta::assert_snapshot!(md, @r"
        ## 2024-01-15T10:30:00Z | write: document write failed

        Target: schedule.json

        ```json
        {}
        ```

        ---
        ");
    }

    #[test]
    fn log_then_read_newest_first() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), entry(RecoveryCategory::Write, "first", "{\"a\":1}"));
        log_recovery(tmp.path(), entry(RecoveryCategory::Conflict, "second", ""));

        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.starts_with("<!-- sg recovery log"));

        let entries = read_recovery_entries(tmp.path());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "second");
        assert_eq!(entries[0].category, RecoveryCategory::Conflict);
        assert_eq!(entries[1].body, "{\"a\":1}\n");
        assert_eq!(
            entries[1].fields,
            vec![("Target".to_string(), "schedule.json".to_string())]
        );
    }

    #[test]
    fn missing_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_recovery_entries(tmp.path()).is_empty());
    }

    #[test]
    fn atomic_write_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("schedule.json");
        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn header_rejects_unknown_category() {
        assert!(parse_entry_header("2024-01-15T10:30:00Z | parser: x").is_none());
        assert!(parse_entry_header("garbage").is_none());
    }

    #[test]
    fn json_form_omits_body() {
        let json = entry(RecoveryCategory::Conflict, "overwritten", "{}").to_json();
        assert_eq!(json["category"], "conflict");
        assert_eq!(json["fields"]["Target"], "schedule.json");
        assert!(json.get("body").is_none());
    }
}
