//! SQLite implementation of [`FeatureStore`].
//!
//! [`SqliteStore`] keeps feature documents as JSON TEXT and call records as
//! plain columns so prefix lookups, ordering and anomaly scans run in SQL.
//! Timestamps are RFC 3339 strings with fixed nanosecond precision.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use dysart_core::{CallRecord, CallRecordId, CallStatus, Feature, FeatureId, RequestId, RequestRecord};

use crate::error::StorageError;
use crate::traits::{check_record_rewrite, normalize_prefix, FeatureStore};

const RECORD_COLUMNS: &str = "id, feature_id, request_id, start_time, stop_time, status, info";

/// SQLite-backed implementation of [`FeatureStore`].
pub struct SqliteStore {
    conn: Connection,
}

/// A call_records row before timestamp and status parsing.
struct RawRecord {
    id: String,
    feature: String,
    request: Option<String>,
    start_time: String,
    stop_time: Option<String>,
    status: String,
    info: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawRecord {
            id: row.get(0)?,
            feature: row.get(1)?,
            request: row.get(2)?,
            start_time: row.get(3)?,
            stop_time: row.get(4)?,
            status: row.get(5)?,
            info: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<CallRecord, StorageError> {
        let status = self
            .status
            .parse::<CallStatus>()
            .map_err(|e| StorageError::IntegrityError {
                reason: format!("record {}: {e}", self.id),
            })?;
        Ok(CallRecord {
            start_time: parse_time(&self.start_time)?,
            stop_time: self.stop_time.as_deref().map(parse_time).transpose()?,
            id: CallRecordId(self.id),
            feature: FeatureId(self.feature),
            request: self.request.map(RequestId),
            status,
            info: self.info,
        })
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::IntegrityError {
            reason: format!("bad timestamp '{s}': {e}"),
        })
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn query_records(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<CallRecord>, StorageError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM call_records {filter}");
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params, RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRecord::into_record).collect()
    }
}

impl FeatureStore for SqliteStore {
    fn save_feature(&mut self, feature: &Feature) -> Result<(), StorageError> {
        let document = serde_json::to_string(feature)?;
        self.conn.execute(
            "INSERT INTO features (id, kind, document, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![
                feature.id().as_str(),
                feature.kind(),
                document,
                format_time(Utc::now())
            ],
        )?;
        Ok(())
    }

    fn find_feature(&self, id: &FeatureId) -> Result<Option<Feature>, StorageError> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM features WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        document
            .map(|d| serde_json::from_str(&d).map_err(StorageError::from))
            .transpose()
    }

    fn list_features(&self) -> Result<Vec<FeatureId>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT id FROM features ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(FeatureId).collect())
    }

    fn save_call_record(&mut self, record: &CallRecord) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let stored = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM call_records WHERE id = ?1"
            ))?;
            stmt.query_row(params![record.id.as_str()], RawRecord::from_row)
                .optional()?
                .map(RawRecord::into_record)
                .transpose()?
        };
        check_record_rewrite(stored.as_ref(), record)?;
        tx.execute(
            "INSERT INTO call_records
                (id, feature_id, request_id, start_time, stop_time, status, info, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM call_records))
             ON CONFLICT(id) DO UPDATE SET
                stop_time = excluded.stop_time,
                status = excluded.status,
                info = excluded.info",
            params![
                record.id.as_str(),
                record.feature.as_str(),
                record.request.as_ref().map(RequestId::as_str),
                format_time(record.start_time),
                record.stop_time.map(format_time),
                record.status.as_str(),
                record.info,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_call_record(&self, id: &CallRecordId) -> Result<Option<CallRecord>, StorageError> {
        Ok(self
            .query_records("WHERE id = ?1", params![id.as_str()])?
            .into_iter()
            .next())
    }

    fn find_records_by_prefix(&self, prefix: &str) -> Result<Vec<CallRecord>, StorageError> {
        let Some(prefix) = normalize_prefix(prefix) else {
            return Ok(Vec::new());
        };
        // Stored ids are lowercase hex, so comparing the leading substring is exact.
        self.query_records(
            "WHERE substr(id, 1, ?2) = ?1 ORDER BY start_time, seq",
            params![prefix, prefix.len() as i64],
        )
    }

    fn call_records_for(&self, feature: &FeatureId) -> Result<Vec<CallRecord>, StorageError> {
        self.query_records(
            "WHERE feature_id = ?1 ORDER BY start_time, seq",
            params![feature.as_str()],
        )
    }

    fn incomplete_records(&self) -> Result<Vec<CallRecord>, StorageError> {
        self.query_records(
            "WHERE status = 'STARTED' AND stop_time IS NULL ORDER BY start_time, seq",
            params![],
        )
    }

    fn last_succeeded(&self, feature: &FeatureId) -> Result<Option<CallRecord>, StorageError> {
        Ok(self
            .query_records(
                "WHERE feature_id = ?1 AND status = 'DONE' AND stop_time IS NOT NULL
                 ORDER BY stop_time DESC, seq DESC LIMIT 1",
                params![feature.as_str()],
            )?
            .into_iter()
            .next())
    }

    fn save_request(&mut self, request: &RequestRecord) -> Result<(), StorageError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO requests (id, time, remote, path, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request.id.as_str(),
                format_time(request.time),
                request.remote,
                request.path,
                serde_json::to_string(&request.body)?,
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::IntegrityError {
                reason: format!("request {} already recorded", request.id),
            });
        }
        Ok(())
    }

    fn get_request(&self, id: &RequestId) -> Result<Option<RequestRecord>, StorageError> {
        let row: Option<(String, Option<String>, String, String)> = self
            .conn
            .query_row(
                "SELECT time, remote, path, body FROM requests WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(|(time, remote, path, body)| {
            Ok(RequestRecord {
                id: id.clone(),
                time: parse_time(&time)?,
                remote,
                path,
                body: serde_json::from_str(&body)?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_feature_roundtrip() {
        testing::feature_roundtrip(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_prefix_lookup() {
        testing::prefix_lookup(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_concluded_records_are_immutable() {
        testing::concluded_records_are_immutable(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_record_ordering_and_last_succeeded() {
        testing::record_ordering_and_last_succeeded(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_failures_alone_never_succeed() {
        testing::failures_alone_never_succeed(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_incomplete_records() {
        testing::incomplete_records(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_requests() {
        testing::requests(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let path = path.to_str().unwrap();
        let rec = CallRecord::start(FeatureId::new("spec"), None);
        {
            let mut store = SqliteStore::new(path).unwrap();
            store.save_call_record(&rec).unwrap();
        }
        let store = SqliteStore::new(path).unwrap();
        let open = store.incomplete_records().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, rec.id);
    }
}
