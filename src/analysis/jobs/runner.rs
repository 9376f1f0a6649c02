use super::food_symptom_v1;
use super::store::JobStore;
use super::types::{AnalysisRequest, JobError, JobSnapshot};
use crate::config::CoreConfig;
use crate::error::StoreResult;
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use uuid::Uuid;

/// In-process façade for background food-symptom analyses.
///
/// `start_analysis` returns immediately with a job id; the pipeline itself
/// runs on a spawned task, cooperatively yielding so it never monopolizes the
/// runtime. Callers observe the job through [`get_job`](Self::get_job)
/// snapshots or a [`subscribe`](Self::subscribe) stream; failures never
/// propagate back through the trigger call.
pub struct AnalysisJobService {
    store: Arc<Store>,
    jobs: Arc<JobStore>,
    config: CoreConfig,
}

impl AnalysisJobService {
    pub fn new(store: Arc<Store>, config: CoreConfig) -> Self {
        Self {
            store,
            jobs: Arc::new(JobStore::new()),
            config,
        }
    }

    /// Create a pending job and schedule its execution off the current call
    /// stack. Concurrent jobs run independently; the last one to persist
    /// wins the result table.
    pub fn start_analysis(&self, request: AnalysisRequest) -> Uuid {
        let snapshot = self.jobs.create();
        let job_id = snapshot.id;
        tracing::info!(job_id = %job_id, range = request.range.is_some(), "analysis job created");

        let store = self.store.clone();
        let jobs = self.jobs.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            run_one(store, jobs, config, job_id, request).await;
        });
        job_id
    }

    pub fn get_job(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.jobs.get(job_id)
    }

    pub fn subscribe(&self, job_id: Uuid) -> Option<broadcast::Receiver<JobSnapshot>> {
        self.jobs.subscribe(job_id)
    }

    pub fn request_cancel(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.jobs.request_cancel(job_id)
    }

    /// Timestamp of the most recent persisted result, None when none exist.
    pub fn get_last_analysis_time(&self) -> StoreResult<Option<DateTime<Utc>>> {
        self.store.last_analysis_time()
    }

    /// Whether the persisted results are missing or older than the freshness
    /// window. Read-only; triggering a run stays the caller's decision.
    pub fn needs_analysis(&self) -> StoreResult<bool> {
        let last = self.store.last_analysis_time()?;
        Ok(match last {
            None => true,
            Some(ts) => Utc::now() - ts > Duration::hours(self.config.freshness_window_hours),
        })
    }
}

async fn run_one(
    store: Arc<Store>,
    jobs: Arc<JobStore>,
    config: CoreConfig,
    job_id: Uuid,
    request: AnalysisRequest,
) {
    if !jobs.begin_running(job_id) {
        tracing::info!(job_id = %job_id, "analysis job no longer pending; not running");
        return;
    }
    let Some(cancel) = jobs.cancel_token(job_id) else {
        return;
    };

    let started = Instant::now();
    let outcome = food_symptom_v1::execute(
        &store,
        &jobs,
        &config,
        job_id,
        request.range.as_ref(),
        &cancel,
    )
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(results) => {
            tracing::info!(
                job_id = %job_id,
                status = "completed",
                duration_ms,
                kept = results.len(),
                "analysis job finished"
            );
            jobs.mark_completed(job_id, results);
        }
        Err(JobFailure::Canceled) => {
            tracing::info!(
                job_id = %job_id,
                status = "canceled",
                duration_ms,
                "analysis job finished"
            );
            jobs.mark_canceled(job_id);
        }
        Err(JobFailure::Failed(error)) => {
            tracing::warn!(
                job_id = %job_id,
                status = "failed",
                duration_ms,
                error_code = %error.code,
                error_message = %error.message,
                "analysis job finished"
            );
            jobs.mark_failed(job_id, error);
        }
    }
}

pub(super) enum JobFailure {
    Canceled,
    Failed(JobError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::jobs::types::JobStatus;
    use crate::store::CorrelationRecord;
    use crate::store::{correlation_id, ConfidenceLevel};
    use crate::test_support;

    fn service(store: Arc<Store>) -> AnalysisJobService {
        AnalysisJobService::new(store, CoreConfig::default())
    }

    async fn wait_terminal(
        rx: &mut broadcast::Receiver<JobSnapshot>,
    ) -> (Vec<JobSnapshot>, JobSnapshot) {
        let mut seen = Vec::new();
        loop {
            let snapshot = rx.recv().await.expect("job channel closed early");
            let terminal = snapshot.status.is_terminal();
            seen.push(snapshot.clone());
            if terminal {
                return (seen, snapshot);
            }
        }
    }

    #[tokio::test]
    async fn job_walks_pending_running_completed_with_monotonic_progress() {
        test_support::init_tracing();
        let seeded = test_support::seeded_store();
        let service = service(seeded.store.clone());

        let job_id = service.start_analysis(AnalysisRequest::default());
        // No await yet: the deferred task cannot have started.
        assert_eq!(service.get_job(job_id).unwrap().status, JobStatus::Pending);

        let mut rx = service.subscribe(job_id).unwrap();
        let (seen, terminal) = wait_terminal(&mut rx).await;

        assert_eq!(terminal.status, JobStatus::Completed);
        assert!(terminal.completed_at.is_some());
        assert!(terminal.result.is_some());
        assert!(seen
            .iter()
            .any(|snapshot| snapshot.status == JobStatus::Running));

        let fractions: Vec<f64> = seen
            .iter()
            .map(|snapshot| snapshot.progress.fraction())
            .collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn completed_job_persists_ranked_filtered_results() {
        let seeded = test_support::seeded_store();
        let service = service(seeded.store.clone());

        let job_id = service.start_analysis(AnalysisRequest::default());
        let mut rx = service.subscribe(job_id).unwrap();
        let (_, terminal) = wait_terminal(&mut rx).await;
        assert_eq!(terminal.status, JobStatus::Completed);

        let stored = seeded.store.list_correlations().unwrap();
        assert!(!stored.is_empty());
        assert!(stored.len() <= 100);
        assert!(stored.iter().all(|r| r.score.abs() > 0.2));
        assert!(stored.iter().all(|r| r.sample_size >= 3));
        let magnitudes: Vec<f64> = stored.iter().map(|r| r.score.abs()).collect();
        assert!(magnitudes.windows(2).all(|w| w[0] >= w[1]));

        // The in-memory result matches what was persisted.
        let attached = terminal.result.unwrap();
        assert_eq!(attached.len(), stored.len());

        let strongest = &stored[0];
        assert_eq!(strongest.food_id, seeded.protective);
        assert_eq!(
            strongest.id,
            correlation_id(seeded.protective, seeded.migraine)
        );
        assert_eq!(strongest.confidence, ConfidenceLevel::Low);
    }

    #[tokio::test]
    async fn needs_analysis_follows_result_freshness() {
        let seeded = test_support::seeded_store();
        let service = service(seeded.store.clone());
        assert!(service.needs_analysis().unwrap());
        assert!(service.get_last_analysis_time().unwrap().is_none());

        let job_id = service.start_analysis(AnalysisRequest::default());
        let mut rx = service.subscribe(job_id).unwrap();
        let (_, terminal) = wait_terminal(&mut rx).await;
        assert_eq!(terminal.status, JobStatus::Completed);

        assert!(!service.needs_analysis().unwrap());
        assert!(service.get_last_analysis_time().unwrap().is_some());

        // Age the persisted set past the 24 h window.
        let mut stale: Vec<CorrelationRecord> = seeded.store.list_correlations().unwrap();
        for record in &mut stale {
            record.computed_at = Utc::now() - Duration::hours(25);
        }
        seeded.store.replace_correlations(&stale).unwrap();
        assert!(service.needs_analysis().unwrap());
    }

    #[tokio::test]
    async fn failed_job_reports_error_and_persists_nothing() {
        let seeded = test_support::seeded_store();
        test_support::corrupt_meal_log_documents(&seeded.store);
        let service = service(seeded.store.clone());

        let job_id = service.start_analysis(AnalysisRequest::default());
        let mut rx = service.subscribe(job_id).unwrap();
        let (_, terminal) = wait_terminal(&mut rx).await;

        assert_eq!(terminal.status, JobStatus::Failed);
        let error = terminal.error.unwrap();
        assert_eq!(error.code, "event_load_failed");
        assert!(!error.message.is_empty());
        assert!(terminal.result.is_none());
        assert!(seeded.store.list_correlations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn canceling_a_pending_job_prevents_it_from_running() {
        let seeded = test_support::seeded_store();
        let service = service(seeded.store.clone());

        let job_id = service.start_analysis(AnalysisRequest::default());
        let canceled = service.request_cancel(job_id).unwrap();
        assert_eq!(canceled.status, JobStatus::Canceled);

        // Let the deferred task observe the claim failure.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(service.get_job(job_id).unwrap().status, JobStatus::Canceled);
        assert!(seeded.store.list_correlations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_events_do_not_contribute() {
        let seeded = test_support::seeded_store();
        let service = service(seeded.store.clone());

        // A window that excludes all seeded June events.
        use chrono::TimeZone;
        let range = crate::store::DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        };
        let job_id = service.start_analysis(AnalysisRequest { range: Some(range) });
        let mut rx = service.subscribe(job_id).unwrap();
        let (_, terminal) = wait_terminal(&mut rx).await;

        assert_eq!(terminal.status, JobStatus::Completed);
        assert_eq!(terminal.result.unwrap().len(), 0);
        assert!(seeded.store.list_correlations().unwrap().is_empty());
    }
}
