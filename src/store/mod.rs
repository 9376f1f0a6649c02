mod records;

pub use records::*;

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Half-open timestamp window: `start <= ts < end`.
#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS foods (
    id TEXT PRIMARY KEY,
    doc TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS meal_logs (
    id TEXT PRIMARY KEY,
    food_id TEXT NOT NULL,
    eaten_at INTEGER NOT NULL,
    doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_meal_logs_eaten_at ON meal_logs(eaten_at);
CREATE TABLE IF NOT EXISTS symptoms (
    id TEXT PRIMARY KEY,
    doc TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS symptom_logs (
    id TEXT PRIMARY KEY,
    symptom_id TEXT NOT NULL,
    observed_at INTEGER NOT NULL,
    doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_symptom_logs_observed_at ON symptom_logs(observed_at);
CREATE TABLE IF NOT EXISTS correlations (
    id TEXT PRIMARY KEY,
    food_id TEXT NOT NULL,
    symptom_id TEXT NOT NULL,
    abs_score REAL NOT NULL,
    computed_at INTEGER NOT NULL,
    doc TEXT NOT NULL
);
"#;

/// Embedded document store. Records live as JSON documents; the indexed
/// columns exist only for range queries and result ordering.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_food(&self, food: &FoodRecord) -> StoreResult<()> {
        let doc = encode("foods", &food.id.to_string(), food)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO foods (id, doc) VALUES (?1, ?2)",
            params![food.id.to_string(), doc],
        )?;
        Ok(())
    }

    pub fn list_foods(&self) -> StoreResult<Vec<FoodRecord>> {
        self.list_documents("foods", "SELECT id, doc FROM foods ORDER BY id ASC")
    }

    pub fn put_symptom(&self, symptom: &SymptomRecord) -> StoreResult<()> {
        let doc = encode("symptoms", &symptom.id.to_string(), symptom)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO symptoms (id, doc) VALUES (?1, ?2)",
            params![symptom.id.to_string(), doc],
        )?;
        Ok(())
    }

    pub fn list_symptoms(&self) -> StoreResult<Vec<SymptomRecord>> {
        self.list_documents("symptoms", "SELECT id, doc FROM symptoms ORDER BY id ASC")
    }

    pub fn put_meal_log(&self, log: &MealLogRecord) -> StoreResult<()> {
        let doc = encode("meal_logs", &log.id.to_string(), log)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO meal_logs (id, food_id, eaten_at, doc) VALUES (?1, ?2, ?3, ?4)",
            params![
                log.id.to_string(),
                log.food_id.to_string(),
                log.eaten_at.timestamp_millis(),
                doc
            ],
        )?;
        Ok(())
    }

    pub fn meal_logs_in_range(&self, range: Option<&DateRange>) -> StoreResult<Vec<MealLogRecord>> {
        self.logs_in_range("meal_logs", "eaten_at", range)
    }

    pub fn put_symptom_log(&self, log: &SymptomLogRecord) -> StoreResult<()> {
        let doc = encode("symptom_logs", &log.id.to_string(), log)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO symptom_logs (id, symptom_id, observed_at, doc) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                log.id.to_string(),
                log.symptom_id.to_string(),
                log.observed_at.timestamp_millis(),
                doc
            ],
        )?;
        Ok(())
    }

    pub fn symptom_logs_in_range(
        &self,
        range: Option<&DateRange>,
    ) -> StoreResult<Vec<SymptomLogRecord>> {
        self.logs_in_range("symptom_logs", "observed_at", range)
    }

    /// Replace the whole persisted result set inside one transaction.
    ///
    /// Concurrent analysis runs race here: the last writer's set is the one
    /// that remains. Callers that care about determinism must not overlap
    /// runs.
    pub fn replace_correlations(&self, results: &[CorrelationRecord]) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM correlations", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO correlations (id, food_id, symptom_id, abs_score, computed_at, doc) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in results {
                let doc = encode("correlations", &record.id, record)?;
                stmt.execute(params![
                    record.id,
                    record.food_id.to_string(),
                    record.symptom_id.to_string(),
                    record.score.abs(),
                    record.computed_at.timestamp_millis(),
                    doc
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Persisted results, strongest association first.
    pub fn list_correlations(&self) -> StoreResult<Vec<CorrelationRecord>> {
        self.list_documents(
            "correlations",
            "SELECT id, doc FROM correlations ORDER BY abs_score DESC",
        )
    }

    /// Timestamp of the most recent persisted result, None when the result
    /// table is empty.
    pub fn last_analysis_time(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let millis: Option<i64> = self.conn().query_row(
            "SELECT MAX(computed_at) FROM correlations",
            [],
            |row| row.get(0),
        )?;
        Ok(millis.and_then(|value| Utc.timestamp_millis_opt(value).single()))
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> StoreResult<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    fn list_documents<T: DeserializeOwned>(
        &self,
        table: &'static str,
        sql: &str,
    ) -> StoreResult<Vec<T>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, doc) = row?;
            out.push(decode(table, &id, &doc)?);
        }
        Ok(out)
    }

    fn logs_in_range<T: DeserializeOwned>(
        &self,
        table: &'static str,
        ts_column: &str,
        range: Option<&DateRange>,
    ) -> StoreResult<Vec<T>> {
        let conn = self.conn();
        let mut out = Vec::new();
        match range {
            None => {
                let sql = format!("SELECT id, doc FROM {table} ORDER BY {ts_column} ASC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in rows {
                    let (id, doc) = row?;
                    out.push(decode(table, &id, &doc)?);
                }
            }
            Some(range) => {
                let sql = format!(
                    "SELECT id, doc FROM {table} \
                     WHERE {ts_column} >= ?1 AND {ts_column} < ?2 ORDER BY {ts_column} ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![range.start.timestamp_millis(), range.end.timestamp_millis()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?;
                for row in rows {
                    let (id, doc) = row?;
                    out.push(decode(table, &id, &doc)?);
                }
            }
        }
        Ok(out)
    }
}

fn encode<T: serde::Serialize>(table: &'static str, id: &str, record: &T) -> StoreResult<String> {
    serde_json::to_string(record).map_err(|source| StoreError::Document {
        table,
        id: id.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(table: &'static str, id: &str, doc: &str) -> StoreResult<T> {
    serde_json::from_str(doc).map_err(|source| StoreError::Document {
        table,
        id: id.to_string(),
        source,
    })
}
