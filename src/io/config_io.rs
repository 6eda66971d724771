use std::fs;
use std::path::{Path, PathBuf};

use crate::io::document_io::{DocumentError, SCHEDULE_DIR};
use crate::model::config::ScheduleConfig;

/// Name of the configuration file inside the schedule directory
pub const CONFIG_FILE: &str = "schedule.toml";

const CONFIG_HEADER: &str = "\
# sg schedule configuration
#
# [grid] time_slots lists the row labels in display order; leave it empty to
# accept any label. employees are { id, name } pairs; commands accept either.
# [limits] undo_capacity bounds the undo stack, history_limit (max 10) the
# per-cell change history.

";

pub fn read_config(schedule_dir: &Path) -> Result<ScheduleConfig, DocumentError> {
    let config_path = schedule_dir.join(CONFIG_FILE);
    let text = fs::read_to_string(&config_path).map_err(|e| DocumentError::ReadError {
        path: config_path,
        source: e,
    })?;
    Ok(toml::from_str(&text)?)
}

pub fn write_config(schedule_dir: &Path, config: &ScheduleConfig) -> Result<(), DocumentError> {
    let config_path = schedule_dir.join(CONFIG_FILE);
    let text = format!("{}{}", CONFIG_HEADER, toml::to_string_pretty(config)?);
    fs::write(&config_path, text).map_err(|e| DocumentError::WriteError {
        path: config_path,
        source: e,
    })
}

/// Create `<root>/schedule/` with the given configuration.
/// Returns the schedule directory.
pub fn create_schedule(root: &Path, config: &ScheduleConfig) -> Result<PathBuf, DocumentError> {
    let schedule_dir = root.join(SCHEDULE_DIR);
    fs::create_dir_all(&schedule_dir).map_err(|e| DocumentError::WriteError {
        path: schedule_dir.clone(),
        source: e,
    })?;
    write_config(&schedule_dir, config)?;
    Ok(schedule_dir)
}

/// Create a schedule with default settings
pub fn init_schedule(root: &Path, name: &str) -> Result<PathBuf, DocumentError> {
    create_schedule(root, &ScheduleConfig::named(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::EmployeeConfig;
    use tempfile::TempDir;

    #[test]
    fn written_config_reads_back() {
        let tmp = TempDir::new().unwrap();
        let mut config = ScheduleConfig::named("Clinic");
        config.grid.time_slots = vec!["7:30".into(), "8:00".into()];
        config.grid.employees = vec![EmployeeConfig {
            id: "e1".into(),
            name: "Anna".into(),
        }];
        config.limits.undo_capacity = 5;
        let dir = create_schedule(tmp.path(), &config).unwrap();

        let text = fs::read_to_string(dir.join(CONFIG_FILE)).unwrap();
        assert!(text.starts_with("# sg schedule configuration"));

        let back = read_config(&dir).unwrap();
        assert_eq!(back.schedule.name, "Clinic");
        assert_eq!(back.grid.time_slots, vec!["7:30", "8:00"]);
        assert_eq!(back.grid.employees, config.grid.employees);
        assert_eq!(back.limits.undo_capacity, 5);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "[schedule\n").unwrap();
        assert!(matches!(
            read_config(tmp.path()),
            Err(DocumentError::ConfigParseError(_))
        ));
    }

    #[test]
    fn missing_config_is_a_read_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            read_config(tmp.path()),
            Err(DocumentError::ReadError { .. })
        ));
    }
}
