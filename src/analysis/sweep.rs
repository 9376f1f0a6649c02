//! Full food x symptom correlation sweep over one run's daily series.
//!
//! The sweep shares its thread with everything else on the runtime, so it
//! yields back to the scheduler every `yield_batch` pairs instead of running
//! the whole cross product in one synchronous block.

use crate::analysis::daily::DailySeries;
use crate::analysis::stats::correlation::{spearman, spearman_p_value_t_approx};
use crate::store::{
    correlation_id, ConfidenceLevel, CorrelationRecord, FoodRecord, SymptomRecord,
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SweepParams {
    pub min_aligned_days: usize,
    pub significance_floor: f64,
    pub max_results: usize,
    pub yield_batch: u64,
}

/// The run was canceled at a yield point; nothing was kept.
#[derive(Debug)]
pub struct Canceled;

/// Correlate every (food, symptom) pair, keep the significant ones, and
/// return them ranked by |rho| descending, truncated to `max_results`.
///
/// Foods or symptoms never logged in range still participate with all-zero
/// vectors; the estimator's neutral-0 and the significance floor drop them in
/// the common case. `on_progress` observes (processed, total) at every yield
/// point, so successive calls are non-decreasing.
pub async fn sweep_pairs(
    foods: &[FoodRecord],
    symptoms: &[SymptomRecord],
    series: &DailySeries,
    params: &SweepParams,
    computed_at: DateTime<Utc>,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(u64, u64),
) -> Result<Vec<CorrelationRecord>, Canceled> {
    let total_pairs = (foods.len() * symptoms.len()) as u64;
    let yield_batch = params.yield_batch.max(1);
    let zeros = vec![0.0; series.day_count()];

    let mut kept: Vec<CorrelationRecord> = Vec::new();
    let mut processed: u64 = 0;
    for food in foods {
        for symptom in symptoms {
            if cancel.is_cancelled() {
                return Err(Canceled);
            }

            let presence = series.presence(&food.id).unwrap_or(&zeros);
            let severity = series.severity(&symptom.id).unwrap_or(&zeros);
            if presence.len() >= params.min_aligned_days {
                let sample_size = presence.len();
                let rho = spearman(presence, severity);
                if rho.abs() > params.significance_floor {
                    kept.push(CorrelationRecord {
                        id: correlation_id(food.id, symptom.id),
                        food_id: food.id,
                        symptom_id: symptom.id,
                        score: rho,
                        sample_size,
                        confidence: ConfidenceLevel::from_sample_size(sample_size),
                        p_value: spearman_p_value_t_approx(rho, sample_size),
                        computed_at,
                    });
                }
            }

            processed += 1;
            if processed % yield_batch == 0 || processed == total_pairs {
                on_progress(processed, total_pairs);
                tokio::task::yield_now().await;
            }
        }
    }

    kept.sort_by(|a, b| b.score.abs().total_cmp(&a.score.abs()));
    kept.truncate(params.max_results);
    Ok(kept)
}
