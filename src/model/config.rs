use serde::{Deserialize, Serialize};

/// Configuration from schedule.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub schedule: ScheduleInfo,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub name: String,
    /// Identifier of the persisted document (`<document_id>.json`)
    #[serde(default = "default_document_id")]
    pub document_id: String,
    /// Recorded as the author of history entries
    #[serde(default = "default_author_id")]
    pub author_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridConfig {
    /// Time-slot labels in display order. Empty = accept any label.
    #[serde(default)]
    pub time_slots: Vec<String>,
    #[serde(default)]
    pub employees: Vec<EmployeeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            undo_capacity: default_undo_capacity(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_document_id() -> String {
    "schedule".to_string()
}

fn default_author_id() -> String {
    "local".to_string()
}

fn default_undo_capacity() -> usize {
    20
}

fn default_history_limit() -> usize {
    10
}

impl ScheduleConfig {
    /// A config with the given name and every other field at its default
    pub fn named(name: impl Into<String>) -> Self {
        ScheduleConfig {
            schedule: ScheduleInfo {
                name: name.into(),
                document_id: default_document_id(),
                author_id: default_author_id(),
            },
            grid: GridConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    /// Resolve an employee by id, or by display name (case-insensitive).
    pub fn resolve_employee(&self, key: &str) -> Option<&EmployeeConfig> {
        self.grid
            .employees
            .iter()
            .find(|e| e.id == key)
            .or_else(|| {
                self.grid
                    .employees
                    .iter()
                    .find(|e| e.name.eq_ignore_ascii_case(key) || e.id.eq_ignore_ascii_case(key))
            })
    }

    /// Display name for an employee id, falling back to the id itself
    pub fn employee_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.grid
            .employees
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
            .unwrap_or(id)
    }

    pub fn has_time_slot(&self, time: &str) -> bool {
        self.grid.time_slots.is_empty() || self.grid.time_slots.iter().any(|t| t == time)
    }
}
