use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Name of the lock file inside the schedule directory
pub const LOCK_FILE: &str = ".lock";

/// How long writers wait for a competing `sg` process by default
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Advisory lock serializing document writes within a schedule directory.
///
/// Uses flock (Unix) so that two `sg` processes never interleave writes to
/// the same document. The holder writes its pid into the lock file, which
/// lets a waiting process report who it is waiting on.
pub struct DocumentLock {
    file: File,
    path: PathBuf,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not acquire lock on {path}: held by {}", holder_label(*.holder))]
    Timeout { path: PathBuf, holder: Option<u32> },
    #[error("lock error: {0}")]
    IoError(#[from] std::io::Error),
}

fn holder_label(holder: Option<u32>) -> String {
    match holder {
        Some(pid) => format!("sg process {}", pid),
        None => "another sg process".to_string(),
    }
}

impl DocumentLock {
    /// Acquire the lock, polling every 10ms for up to `timeout`.
    pub fn acquire(schedule_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = schedule_dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::CreateError {
                path: path.clone(),
                source: e,
            })?;

        let start = Instant::now();
        while try_lock(&file).is_err() {
            if start.elapsed() >= timeout {
                let holder = read_holder(&mut file);
                return Err(LockError::Timeout { path, holder });
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(DocumentLock { file, path })
    }

    pub fn acquire_default(schedule_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(schedule_dir, DEFAULT_LOCK_TIMEOUT)
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        // flock is released with the file handle
        let _ = self.file.set_len(0);
        let _ = fs::remove_file(&self.path);
    }
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}

/// Try to acquire an exclusive flock on the file (non-blocking)
#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_release_and_reacquire() {
        let tmp = TempDir::new().unwrap();
        let lock = DocumentLock::acquire_default(tmp.path()).unwrap();
        let pid = fs::read_to_string(tmp.path().join(LOCK_FILE)).unwrap();
        assert_eq!(pid, std::process::id().to_string());
        drop(lock);
        assert!(!tmp.path().join(LOCK_FILE).exists());

        assert!(DocumentLock::acquire_default(tmp.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn contention_times_out_and_names_holder() {
        let tmp = TempDir::new().unwrap();
        let _held = DocumentLock::acquire_default(tmp.path()).unwrap();

        match DocumentLock::acquire(tmp.path(), Duration::from_millis(50)) {
            Err(LockError::Timeout { holder, .. }) => {
                assert_eq!(holder, Some(std::process::id()));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("second lock should not be granted"),
        }
    }

    #[test]
    fn timeout_message_without_holder() {
        let err = LockError::Timeout {
            path: PathBuf::from("/tmp/x/.lock"),
            holder: None,
        };
        assert_eq!(
            err.to_string(),
            "could not acquire lock on /tmp/x/.lock: held by another sg process"
        );
    }
}
