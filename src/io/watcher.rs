use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Notification that the watched document changed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Changed(PathBuf),
    Removed(PathBuf),
}

/// Watches the schedule directory for writes to one document file.
///
/// Temp files created by atomic writes are ignored; the rename onto the
/// document path is what surfaces as a change.
pub struct DocumentWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<DocumentEvent>,
}

impl DocumentWatcher {
    pub fn start(document_path: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let target = document_path.to_path_buf();
        let dir = document_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let Ok(event) = result else {
                    return;
                };
                let removed = match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => false,
                    EventKind::Remove(_) => true,
                    _ => return,
                };
                if !event.paths.iter().any(|p| is_target(p, &target)) {
                    return;
                }
                let evt = if removed {
                    DocumentEvent::Removed(target.clone())
                } else {
                    DocumentEvent::Changed(target.clone())
                };
                let _ = tx.send(evt);
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok(DocumentWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Drain pending events without blocking. Bursts of events for the
    /// same write collapse to one.
    pub fn poll(&self) -> Vec<DocumentEvent> {
        let mut events: Vec<DocumentEvent> = Vec::new();
        while let Ok(evt) = self.rx.try_recv() {
            if events.last() != Some(&evt) {
                events.push(evt);
            }
        }
        events
    }

    /// Block up to `timeout` for the next event, then drain the rest.
    pub fn wait(&self, timeout: Duration) -> Vec<DocumentEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                let mut events = vec![first];
                for evt in self.poll() {
                    if events.last() != Some(&evt) {
                        events.push(evt);
                    }
                }
                events
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Watched paths may arrive canonicalized (e.g. /private/var on macOS), so
/// compare file names within the same parent when the full path differs.
fn is_target(path: &Path, target: &Path) -> bool {
    if path == target {
        return true;
    }
    match (path.file_name(), target.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
