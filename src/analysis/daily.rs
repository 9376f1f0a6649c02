//! Collapses raw meal and symptom logs into per-calendar-day vectors aligned
//! over one shared date axis, the representation the correlation sweep runs
//! on.

use crate::store::{MealLogRecord, SymptomLogRecord};
use crate::time::local_day;
use chrono::{NaiveDate, TimeZone};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Aligned daily vectors for one analysis run.
///
/// The axis is the sorted union of every day carrying either a meal or a
/// symptom observation, so index `i` of any vector refers to the same
/// calendar day. Built once per run and discarded with it.
#[derive(Debug, Clone)]
pub struct DailySeries {
    dates: Vec<NaiveDate>,
    presence: HashMap<Uuid, Vec<f64>>,
    severity: HashMap<Uuid, Vec<f64>>,
}

impl DailySeries {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn day_count(&self) -> usize {
        self.dates.len()
    }

    /// 0/1 presence vector for a food, None when it was never logged in
    /// range.
    pub fn presence(&self, food_id: &Uuid) -> Option<&[f64]> {
        self.presence.get(food_id).map(Vec::as_slice)
    }

    /// Max-severity-per-day vector for a symptom, None when it was never
    /// logged in range.
    pub fn severity(&self, symptom_id: &Uuid) -> Option<&[f64]> {
        self.severity.get(symptom_id).map(Vec::as_slice)
    }
}

/// Pure function of its input: the same logs always produce the same series.
pub fn build_daily_series<Tz: TimeZone>(
    tz: &Tz,
    meals: &[MealLogRecord],
    symptom_logs: &[SymptomLogRecord],
) -> DailySeries {
    let mut food_days: HashMap<Uuid, BTreeSet<NaiveDate>> = HashMap::new();
    for log in meals {
        food_days
            .entry(log.food_id)
            .or_default()
            .insert(local_day(tz, log.eaten_at));
    }

    // Max severity wins for repeated same-day observations.
    let mut symptom_days: HashMap<Uuid, BTreeMap<NaiveDate, f64>> = HashMap::new();
    for log in symptom_logs {
        let day = local_day(tz, log.observed_at);
        let severity = f64::from(log.severity);
        let slot = symptom_days
            .entry(log.symptom_id)
            .or_default()
            .entry(day)
            .or_insert(severity);
        if severity > *slot {
            *slot = severity;
        }
    }

    let mut axis: BTreeSet<NaiveDate> = BTreeSet::new();
    for days in food_days.values() {
        axis.extend(days.iter().copied());
    }
    for by_day in symptom_days.values() {
        axis.extend(by_day.keys().copied());
    }
    let dates: Vec<NaiveDate> = axis.into_iter().collect();

    let presence = food_days
        .into_iter()
        .map(|(food_id, days)| {
            let vector = dates
                .iter()
                .map(|date| if days.contains(date) { 1.0 } else { 0.0 })
                .collect();
            (food_id, vector)
        })
        .collect();
    let severity = symptom_days
        .into_iter()
        .map(|(symptom_id, by_day)| {
            let vector = dates
                .iter()
                .map(|date| by_day.get(date).copied().unwrap_or(0.0))
                .collect();
            (symptom_id, vector)
        })
        .collect();

    DailySeries {
        dates,
        presence,
        severity,
    }
}
