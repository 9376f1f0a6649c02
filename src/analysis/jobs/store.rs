use super::types::{JobError, JobProgress, JobSnapshot, JobStatus};
use crate::store::CorrelationRecord;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const NOTIFY_CAPACITY: usize = 64;

struct JobEntry {
    snapshot: JobSnapshot,
    notifier: broadcast::Sender<JobSnapshot>,
    cancel: CancellationToken,
}

/// Process-wide registry of analysis jobs: snapshot reads, status
/// transitions, and per-job broadcast of every change.
///
/// Jobs are never evicted; the caller owns the lifetime of the ids it holds.
/// Terminal states are sticky: once a job completes, fails, or is canceled,
/// further transitions are ignored.
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<Uuid, JobEntry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new pending job and return its initial snapshot.
    pub fn create(&self) -> JobSnapshot {
        let snapshot = JobSnapshot {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            canceled_at: None,
        };
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        self.lock().insert(
            snapshot.id,
            JobEntry {
                snapshot: snapshot.clone(),
                notifier,
                cancel: CancellationToken::new(),
            },
        );
        snapshot
    }

    pub fn get(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.lock().get(&job_id).map(|entry| entry.snapshot.clone())
    }

    /// Attach a subscriber. Only changes made after this call are delivered;
    /// dropping the receiver unsubscribes.
    pub fn subscribe(&self, job_id: Uuid) -> Option<broadcast::Receiver<JobSnapshot>> {
        self.lock()
            .get(&job_id)
            .map(|entry| entry.notifier.subscribe())
    }

    pub fn cancel_token(&self, job_id: Uuid) -> Option<CancellationToken> {
        self.lock().get(&job_id).map(|entry| entry.cancel.clone())
    }

    /// Claim a pending job for execution. Returns false when the job is
    /// missing or no longer pending (e.g. canceled before it ever ran).
    pub fn begin_running(&self, job_id: Uuid) -> bool {
        let mut jobs = self.lock();
        let Some(entry) = jobs.get_mut(&job_id) else {
            return false;
        };
        if entry.snapshot.status != JobStatus::Pending {
            return false;
        }
        entry.snapshot.status = JobStatus::Running;
        entry.snapshot.started_at = Some(Utc::now());
        let _ = entry.notifier.send(entry.snapshot.clone());
        true
    }

    pub fn update_progress(&self, job_id: Uuid, progress: JobProgress) {
        self.mutate_live(job_id, |snapshot| {
            snapshot.progress = progress;
        });
    }

    pub fn mark_completed(&self, job_id: Uuid, result: Vec<CorrelationRecord>) {
        self.mutate_live(job_id, |snapshot| {
            snapshot.status = JobStatus::Completed;
            snapshot.completed_at = Some(Utc::now());
            snapshot.result = Some(result);
        });
    }

    pub fn mark_failed(&self, job_id: Uuid, error: JobError) {
        self.mutate_live(job_id, |snapshot| {
            snapshot.status = JobStatus::Failed;
            snapshot.completed_at = Some(Utc::now());
            snapshot.error = Some(error);
        });
    }

    pub fn mark_canceled(&self, job_id: Uuid) {
        self.mutate_live(job_id, |snapshot| {
            snapshot.status = JobStatus::Canceled;
            snapshot.canceled_at = Some(Utc::now());
        });
    }

    /// Cancel a job. Pending jobs land in `Canceled` immediately; running
    /// jobs get their token canceled and stop at the next yield point.
    /// Returns the snapshot after the request, None for unknown or already
    /// terminal jobs.
    pub fn request_cancel(&self, job_id: Uuid) -> Option<JobSnapshot> {
        let mut jobs = self.lock();
        let entry = jobs.get_mut(&job_id)?;
        match entry.snapshot.status {
            JobStatus::Pending => {
                entry.snapshot.status = JobStatus::Canceled;
                entry.snapshot.canceled_at = Some(Utc::now());
                entry.snapshot.progress.message = Some("Canceled before start".to_string());
                entry.cancel.cancel();
                let snapshot = entry.snapshot.clone();
                let _ = entry.notifier.send(snapshot.clone());
                Some(snapshot)
            }
            JobStatus::Running => {
                entry.cancel.cancel();
                Some(entry.snapshot.clone())
            }
            _ => None,
        }
    }

    fn mutate_live(&self, job_id: Uuid, apply: impl FnOnce(&mut JobSnapshot)) {
        let mut jobs = self.lock();
        let Some(entry) = jobs.get_mut(&job_id) else {
            tracing::warn!(job_id = %job_id, "update for unknown job dropped");
            return;
        };
        if entry.snapshot.status.is_terminal() {
            tracing::warn!(
                job_id = %job_id,
                status = entry.snapshot.status.as_str(),
                "update for terminal job dropped"
            );
            return;
        }
        apply(&mut entry.snapshot);
        let _ = entry.notifier.send(entry.snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_are_independent_copies() {
        let store = JobStore::new();
        let created = store.create();
        let before = store.get(created.id).unwrap();

        store.begin_running(created.id);
        assert_eq!(before.status, JobStatus::Pending);
        assert_eq!(store.get(created.id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let store = JobStore::new();
        let job = store.create();
        store.begin_running(job.id);
        store.mark_completed(job.id, Vec::new());

        store.mark_failed(
            job.id,
            JobError {
                code: "late".to_string(),
                message: "too late".to_string(),
                details: None,
            },
        );
        let snapshot = store.get(job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn begin_running_claims_only_pending_jobs() {
        let store = JobStore::new();
        let job = store.create();
        assert!(store.begin_running(job.id));
        assert!(!store.begin_running(job.id));
        assert!(!store.begin_running(Uuid::new_v4()));
    }

    #[test]
    fn cancel_of_pending_job_is_immediate() {
        let store = JobStore::new();
        let job = store.create();
        let snapshot = store.request_cancel(job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Canceled);
        assert!(snapshot.canceled_at.is_some());

        // The claim must now fail, so the deferred task never runs the job.
        assert!(!store.begin_running(job.id));
        assert!(store.request_cancel(job.id).is_none());
    }

    #[test]
    fn cancel_of_running_job_only_flags_the_token() {
        let store = JobStore::new();
        let job = store.create();
        store.begin_running(job.id);
        let token = store.cancel_token(job.id).unwrap();
        assert!(!token.is_cancelled());

        let snapshot = store.request_cancel(job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Running);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn late_subscribers_see_only_future_updates() {
        let store = JobStore::new();
        let job = store.create();
        store.begin_running(job.id);

        let mut rx = store.subscribe(job.id).unwrap();
        store.mark_completed(job.id, Vec::new());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_update() {
        let store = JobStore::new();
        let job = store.create();
        let mut a = store.subscribe(job.id).unwrap();
        let mut b = store.subscribe(job.id).unwrap();

        store.begin_running(job.id);
        assert_eq!(a.recv().await.unwrap().status, JobStatus::Running);
        assert_eq!(b.recv().await.unwrap().status, JobStatus::Running);
    }
}
