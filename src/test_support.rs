use crate::store::{FoodRecord, MealLogRecord, Store, SymptomLogRecord, SymptomRecord};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Daily severities for the ten-day demo window (June 1-10).
pub const DEMO_SEVERITIES: [u8; 10] = [7, 2, 6, 8, 1, 3, 7, 2, 5, 6];

/// Days each demo food was eaten. "suspect" tracks the high-severity days
/// (strong positive rho), "protective" the low ones (strong negative),
/// "noise" a mix that lands under the significance floor.
pub const SUSPECT_DAYS: [u32; 7] = [1, 3, 4, 6, 7, 9, 10];
pub const PROTECTIVE_DAYS: [u32; 3] = [2, 5, 8];
pub const NOISE_DAYS: [u32; 5] = [1, 4, 5, 8, 10];

pub struct Seeded {
    pub store: Arc<Store>,
    pub suspect: Uuid,
    pub protective: Uuid,
    pub noise: Uuid,
    pub migraine: Uuid,
}

/// In-memory store with three foods, one symptom, and ten days of logs.
/// All events sit at 12:00 UTC so any fixed local offset shifts every bucket
/// uniformly and the day alignment survives.
pub fn seeded_store() -> Seeded {
    let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
    let created_at = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();

    let mut food_ids = Vec::new();
    for (name, days) in [
        ("aged cheese", &SUSPECT_DAYS[..]),
        ("ginger tea", &PROTECTIVE_DAYS[..]),
        ("rice", &NOISE_DAYS[..]),
    ] {
        let food = FoodRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            tags: Vec::new(),
            created_at,
        };
        store.put_food(&food).expect("put food");
        for &day in days {
            store
                .put_meal_log(&MealLogRecord {
                    id: Uuid::new_v4(),
                    food_id: food.id,
                    eaten_at: Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap(),
                    notes: None,
                })
                .expect("put meal log");
        }
        food_ids.push(food.id);
    }

    let migraine = SymptomRecord {
        id: Uuid::new_v4(),
        name: "migraine".to_string(),
        created_at,
    };
    store.put_symptom(&migraine).expect("put symptom");
    for (offset, &severity) in DEMO_SEVERITIES.iter().enumerate() {
        store
            .put_symptom_log(&SymptomLogRecord {
                id: Uuid::new_v4(),
                symptom_id: migraine.id,
                observed_at: Utc
                    .with_ymd_and_hms(2025, 6, offset as u32 + 1, 12, 0, 0)
                    .unwrap(),
                severity,
            })
            .expect("put symptom log");
    }

    Seeded {
        store,
        suspect: food_ids[0],
        protective: food_ids[1],
        noise: food_ids[2],
        migraine: migraine.id,
    }
}

/// Overwrite every meal-log document with garbage so the next load fails.
pub fn corrupt_meal_log_documents(store: &Store) {
    store
        .execute_raw("UPDATE meal_logs SET doc = 'not json'")
        .expect("corrupt meal logs");
}
