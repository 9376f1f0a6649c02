use super::runner::JobFailure;
use super::store::JobStore;
use super::types::{JobError, JobProgress};
use crate::analysis::daily::build_daily_series;
use crate::analysis::sweep::{sweep_pairs, SweepParams};
use crate::config::CoreConfig;
use crate::store::{CorrelationRecord, DateRange, Store};
use chrono::{Local, Utc};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Full food-symptom analysis: load logged events, aggregate into daily
/// vectors, sweep every pair, persist the ranked survivors.
///
/// Stage order is fixed; nothing is persisted unless the sweep ran to the
/// end, so a failed or canceled run leaves the previous result set intact.
pub(super) async fn execute(
    store: &Store,
    jobs: &JobStore,
    config: &CoreConfig,
    job_id: Uuid,
    range: Option<&DateRange>,
    cancel: &CancellationToken,
) -> Result<Vec<CorrelationRecord>, JobFailure> {
    jobs.update_progress(
        job_id,
        JobProgress {
            phase: "load_events".to_string(),
            completed: 0,
            total: None,
            message: Some("Loading logged events".to_string()),
        },
    );

    let load_started = Instant::now();
    let foods = store.list_foods().map_err(|err| {
        JobFailure::Failed(JobError {
            code: "catalog_load_failed".to_string(),
            message: err.to_string(),
            details: None,
        })
    })?;
    let symptoms = store.list_symptoms().map_err(|err| {
        JobFailure::Failed(JobError {
            code: "catalog_load_failed".to_string(),
            message: err.to_string(),
            details: None,
        })
    })?;
    let meals = store.meal_logs_in_range(range).map_err(|err| {
        JobFailure::Failed(JobError {
            code: "event_load_failed".to_string(),
            message: err.to_string(),
            details: None,
        })
    })?;
    let symptom_logs = store.symptom_logs_in_range(range).map_err(|err| {
        JobFailure::Failed(JobError {
            code: "event_load_failed".to_string(),
            message: err.to_string(),
            details: None,
        })
    })?;
    tracing::info!(
        phase = "load_events",
        duration_ms = load_started.elapsed().as_millis() as u64,
        food_count = foods.len(),
        symptom_count = symptoms.len(),
        meal_count = meals.len(),
        symptom_log_count = symptom_logs.len(),
        "events loaded"
    );

    if cancel.is_cancelled() {
        return Err(JobFailure::Canceled);
    }

    jobs.update_progress(
        job_id,
        JobProgress {
            phase: "aggregate".to_string(),
            completed: 0,
            total: None,
            message: Some("Building daily vectors".to_string()),
        },
    );
    let series = build_daily_series(&Local, &meals, &symptom_logs);
    tracing::info!(
        phase = "aggregate",
        day_count = series.day_count(),
        "daily vectors built"
    );

    let total_pairs = (foods.len() * symptoms.len()) as u64;
    jobs.update_progress(
        job_id,
        JobProgress {
            phase: "sweep".to_string(),
            completed: 0,
            total: Some(total_pairs),
            message: Some(format!("Correlating {total_pairs} pairs")),
        },
    );

    let params = SweepParams {
        min_aligned_days: config.min_aligned_days,
        significance_floor: config.significance_floor,
        max_results: config.max_results,
        yield_batch: config.yield_batch,
    };
    let computed_at = Utc::now();
    let sweep_started = Instant::now();
    let results = sweep_pairs(
        &foods,
        &symptoms,
        &series,
        &params,
        computed_at,
        cancel,
        |processed, total| {
            jobs.update_progress(
                job_id,
                JobProgress {
                    phase: "sweep".to_string(),
                    completed: processed,
                    total: Some(total),
                    message: None,
                },
            );
        },
    )
    .await
    .map_err(|_| JobFailure::Canceled)?;
    tracing::info!(
        phase = "sweep",
        duration_ms = sweep_started.elapsed().as_millis() as u64,
        pair_count = total_pairs,
        kept = results.len(),
        "pairs correlated"
    );

    if cancel.is_cancelled() {
        return Err(JobFailure::Canceled);
    }

    jobs.update_progress(
        job_id,
        JobProgress {
            phase: "persist".to_string(),
            completed: total_pairs,
            total: Some(total_pairs),
            message: Some("Saving ranked results".to_string()),
        },
    );
    store.replace_correlations(&results).map_err(|err| {
        JobFailure::Failed(JobError {
            code: "persist_failed".to_string(),
            message: err.to_string(),
            details: None,
        })
    })?;
    tracing::info!(phase = "persist", kept = results.len(), "results saved");

    Ok(results)
}
