use std::path::PathBuf;

const DEFAULT_DATABASE_FILE: &str = "flaretrack.db";

/// Engine configuration. Every knob has a default matching the shipped
/// analysis behavior; environment variables override individually.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path of the embedded SQLite database file.
    pub database_path: PathBuf,
    /// Minimum aligned calendar days before a pair is considered at all.
    pub min_aligned_days: usize,
    /// A pair is kept only when |rho| exceeds this floor.
    pub significance_floor: f64,
    /// Persisted result cap after ranking by |rho|.
    pub max_results: usize,
    /// Pairs processed between cooperative yields / progress updates.
    pub yield_batch: u64,
    /// Hours before a persisted result set is considered stale.
    pub freshness_window_hours: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            min_aligned_days: 3,
            significance_floor: 0.2,
            max_results: 100,
            yield_batch: 10,
            freshness_window_hours: 24,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: env_path("FLARETRACK_DATABASE_PATH")
                .unwrap_or(defaults.database_path),
            min_aligned_days: env_parse("FLARETRACK_MIN_ALIGNED_DAYS")
                .unwrap_or(defaults.min_aligned_days),
            significance_floor: env_parse("FLARETRACK_SIGNIFICANCE_FLOOR")
                .unwrap_or(defaults.significance_floor),
            max_results: env_parse("FLARETRACK_MAX_RESULTS").unwrap_or(defaults.max_results),
            yield_batch: env_parse::<u64>("FLARETRACK_YIELD_BATCH")
                .map(|value| value.max(1))
                .unwrap_or(defaults.yield_batch),
            freshness_window_hours: env_parse("FLARETRACK_FRESHNESS_WINDOW_HOURS")
                .unwrap_or(defaults.freshness_window_hours),
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var = name, value = trimmed, "unparsable env override ignored");
            None
        }
    }
}
