use std::path::PathBuf;

use crate::model::config::ScheduleConfig;

/// A loaded schedule directory
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Directory containing `schedule/`
    pub root: PathBuf,
    /// The `schedule/` directory itself
    pub schedule_dir: PathBuf,
    pub config: ScheduleConfig,
}

impl Schedule {
    /// Path of the persisted document
    pub fn document_path(&self) -> PathBuf {
        self.schedule_dir
            .join(format!("{}.json", self.config.schedule.document_id))
    }
}
