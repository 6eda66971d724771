use std::sync::mpsc;
use std::thread::JoinHandle;

use serde::Serialize;

use crate::io::document_io::{DocumentError, DocumentStore};
use crate::model::document::ScheduleDocument;

/// What the user sees of persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Error(String),
}

/// Carries documents to storage. At most one document is ever outstanding;
/// the coordinator in the cell store guarantees it.
pub trait SaveChannel {
    /// Start writing `doc`.
    fn submit(&mut self, doc: ScheduleDocument);
    /// The outcome of the outstanding write, if it has finished.
    fn try_complete(&mut self) -> Option<Result<(), DocumentError>>;
    /// Block until the outstanding write finishes. `None` when nothing is
    /// outstanding or the channel is gone.
    fn wait(&mut self) -> Option<Result<(), DocumentError>>;
}

// ---------------------------------------------------------------------------
// Coalescing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveRequest {
    /// Nothing in flight: submit now
    Start,
    /// A write is in flight; one follow-up will be issued when it completes
    Queued,
}

/// One write in flight, at most one queued behind it
#[derive(Debug, Default)]
pub struct SaveCoordinator {
    in_flight: bool,
    queued: bool,
}

impl SaveCoordinator {
    pub fn request(&mut self) -> SaveRequest {
        if self.in_flight {
            self.queued = true;
            SaveRequest::Queued
        } else {
            self.in_flight = true;
            SaveRequest::Start
        }
    }

    /// Mark the in-flight write finished. Returns true when a follow-up
    /// write must be issued now; the coordinator then stays in flight.
    pub fn complete(&mut self) -> bool {
        if self.queued {
            self.queued = false;
            true
        } else {
            self.in_flight = false;
            false
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn queued(&self) -> bool {
        self.queued
    }

    /// Forget everything, e.g. after the channel went away.
    pub fn reset(&mut self) {
        self.in_flight = false;
        self.queued = false;
    }
}

// ---------------------------------------------------------------------------
// Inline channel
// ---------------------------------------------------------------------------

/// Writes synchronously inside `submit`; the outcome is reported on the next
/// poll, so the store sees the same completion sequence as with a worker.
pub struct InlineSaveChannel<S: DocumentStore> {
    store: S,
    pending: Option<Result<(), DocumentError>>,
}

impl<S: DocumentStore> InlineSaveChannel<S> {
    pub fn new(store: S) -> Self {
        InlineSaveChannel {
            store,
            pending: None,
        }
    }
}

impl<S: DocumentStore> SaveChannel for InlineSaveChannel<S> {
    fn submit(&mut self, doc: ScheduleDocument) {
        self.pending = Some(self.store.save(&doc));
    }

    fn try_complete(&mut self) -> Option<Result<(), DocumentError>> {
        self.pending.take()
    }

    fn wait(&mut self) -> Option<Result<(), DocumentError>> {
        self.pending.take()
    }
}

// ---------------------------------------------------------------------------
// Worker channel
// ---------------------------------------------------------------------------

/// Writes on a background thread fed over an mpsc channel.
pub struct WorkerSaveChannel {
    jobs: Option<mpsc::Sender<ScheduleDocument>>,
    done: mpsc::Receiver<Result<(), DocumentError>>,
    worker: Option<JoinHandle<()>>,
    /// A submit that never reached the worker
    undelivered: Option<DocumentError>,
}

impl WorkerSaveChannel {
    pub fn spawn<S: DocumentStore + Send + 'static>(mut store: S) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<ScheduleDocument>();
        let (done_tx, done_rx) = mpsc::channel();
        let worker = std::thread::spawn(move || {
            for doc in job_rx {
                if done_tx.send(store.save(&doc)).is_err() {
                    break;
                }
            }
        });
        WorkerSaveChannel {
            jobs: Some(job_tx),
            done: done_rx,
            worker: Some(worker),
            undelivered: None,
        }
    }
}

impl SaveChannel for WorkerSaveChannel {
    fn submit(&mut self, doc: ScheduleDocument) {
        let sent = self.jobs.as_ref().is_some_and(|jobs| jobs.send(doc).is_ok());
        if !sent {
            log::error!("save worker is gone; document not written");
            self.undelivered = Some(DocumentError::WorkerStopped);
        }
    }

    fn try_complete(&mut self) -> Option<Result<(), DocumentError>> {
        if let Some(err) = self.undelivered.take() {
            return Some(Err(err));
        }
        self.done.try_recv().ok()
    }

    fn wait(&mut self) -> Option<Result<(), DocumentError>> {
        if let Some(err) = self.undelivered.take() {
            return Some(Err(err));
        }
        self.done.recv().ok()
    }
}

impl Drop for WorkerSaveChannel {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::document_io::MemoryDocumentStore;
    use crate::ops::cell_ops;
    use crate::store::cell_store::{CellStore, StoreOptions};
    use crate::util::clock::FixedClock;
    use chrono::NaiveDate;

    #[test]
    fn coordinator_queues_one_follow_up() {
        let mut saves = SaveCoordinator::default();
        assert_eq!(saves.request(), SaveRequest::Start);
        assert_eq!(saves.request(), SaveRequest::Queued);
        assert_eq!(saves.request(), SaveRequest::Queued);
        assert!(saves.complete());
        assert!(saves.in_flight());
        assert!(!saves.complete());
        assert!(!saves.in_flight());
    }

    #[test]
    fn inline_channel_reports_on_next_poll() {
        let handle = MemoryDocumentStore::new();
        let mut channel = InlineSaveChannel::new(handle.clone());
        assert!(channel.try_complete().is_none());
        channel.submit(ScheduleDocument::empty("main"));
        assert_eq!(handle.save_count(), 1);
        assert!(matches!(channel.try_complete(), Some(Ok(()))));
        assert!(channel.try_complete().is_none());
    }

    #[test]
    fn worker_channel_delivers_results() {
        let handle = MemoryDocumentStore::new();
        let mut channel = WorkerSaveChannel::spawn(handle.clone());
        channel.submit(ScheduleDocument::empty("main"));
        assert!(matches!(channel.wait(), Some(Ok(()))));

        handle.set_failing(true);
        channel.submit(ScheduleDocument::empty("main"));
        assert!(matches!(channel.wait(), Some(Err(_))));
        assert_eq!(handle.save_count(), 1);
    }

    fn stopped_worker() -> WorkerSaveChannel {
        let (_, done) = mpsc::channel();
        WorkerSaveChannel {
            jobs: None,
            done,
            worker: None,
            undelivered: None,
        }
    }

    #[test]
    fn undeliverable_submit_completes_with_error() {
        let mut channel = stopped_worker();
        assert!(channel.try_complete().is_none());
        channel.submit(ScheduleDocument::empty("main"));
        assert!(matches!(
            channel.try_complete(),
            Some(Err(DocumentError::WorkerStopped))
        ));
        assert!(channel.try_complete().is_none());
    }

    #[test]
    fn store_reports_error_when_worker_is_gone() {
        let mut store = CellStore::new(
            ScheduleDocument::empty("main"),
            Box::new(stopped_worker()),
            Box::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())),
            StoreOptions::default(),
        );
        store.update_cell_state("7:30", "anna", |body| {
            let _ = cell_ops::set_text(body, None, "Nowak");
        });
        assert_eq!(store.poll(), 1);
        assert!(matches!(store.app_state().save_status, SaveStatus::Error(_)));

        // The next change is written, not queued behind a lost write
        store.update_cell_state("7:30", "anna", |body| {
            let _ = cell_ops::set_text(body, None, "Lis");
        });
        assert_eq!(store.poll(), 1);
        store.flush();
    }

    #[test]
    fn status_serializes_with_message() {
        let json = serde_json::to_value(SaveStatus::Error("disk full".into())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "error", "message": "disk full"}));
        let json = serde_json::to_value(SaveStatus::Saved).unwrap();
        assert_eq!(json, serde_json::json!({"state": "saved"}));
    }
}
