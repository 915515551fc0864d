use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{Ranked, RankedHit, RecordStore};
use crate::error::{Result, SyncError};
use crate::types::{DocumentBody, FieldValue, RecordId};

const SCORE_COLUMN: &str = "search_score";
const RANK_COLUMN: &str = "search_rank";

/// A table row as returned by [`SqliteRecordStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub id: RecordId,
    pub fields: DocumentBody,
}

/// Record store over one SQLite table, ordering hits inside the query.
///
/// Score and rank are injected as `CASE pk WHEN ? THEN ? ... END` columns
/// and the rows come back `ORDER BY search_rank`, so nothing is sorted in
/// process.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    table: String,
    primary_key: String,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>, table: &str, primary_key: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, table, primary_key)
    }

    pub fn from_connection(conn: Connection, table: &str, primary_key: &str) -> Result<Self> {
        check_identifier(table)?;
        check_identifier(primary_key)?;
        Ok(SqliteRecordStore {
            conn: Mutex::new(conn),
            table: table.to_string(),
            primary_key: primary_key.to_string(),
        })
    }

    /// Run `f` against the underlying connection, e.g. to seed a table.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("sqlite connection lock poisoned".to_string()))
    }

    fn ranked_sql(&self, n: usize) -> String {
        let pk = format!("\"{}\"", self.primary_key);
        // ?1..?n ids, ?n+1..?2n scores, ?2n+1..?3n ranks
        let score_case: String = (1..=n)
            .map(|i| format!(" WHEN ?{} THEN ?{}", i, n + i))
            .collect();
        let rank_case: String = (1..=n)
            .map(|i| format!(" WHEN ?{} THEN ?{}", i, 2 * n + i))
            .collect();
        let in_list = (1..=n)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT *, (CASE {pk}{score_case} ELSE NULL END) AS {SCORE_COLUMN}, \
             (CASE {pk}{rank_case} ELSE 0 END) AS {RANK_COLUMN} \
             FROM \"{table}\" WHERE {pk} IN ({in_list}) ORDER BY {RANK_COLUMN}",
            table = self.table,
        )
    }

    fn row_record(&self, row: &Row<'_>) -> rusqlite::Result<RowRecord> {
        let stmt = row.as_ref();
        let mut fields = DocumentBody::new();
        let mut id = None;
        for (i, name) in stmt.column_names().into_iter().enumerate() {
            if name == SCORE_COLUMN || name == RANK_COLUMN {
                continue;
            }
            let value = field_value(row.get_ref(i)?);
            if name == self.primary_key {
                id = Some(match &value {
                    FieldValue::Text(s) => RecordId::new(s.as_str()),
                    other => RecordId::new(other.to_json().to_string()),
                });
            }
            fields.insert(name, value);
        }
        Ok(RowRecord {
            id: id.unwrap_or_else(|| RecordId::new("")),
            fields,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    type Record = RowRecord;

    fn supports_ordering_injection(&self) -> bool {
        true
    }

    async fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<(RecordId, RowRecord)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let in_list = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE \"{}\" IN ({})",
            self.table, self.primary_key, in_list
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter().map(id_param)), |row| {
                self.row_record(row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().map(|r| (r.id.clone(), r)).collect())
    }

    async fn fetch_ranked(&self, hits: &[RankedHit]) -> Result<Vec<Ranked<RowRecord>>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self.ranked_sql(hits.len());
        let params: Vec<SqlValue> = hits
            .iter()
            .map(|h| id_param(&h.id))
            .chain(
                hits.iter()
                    .map(|h| h.score.map_or(SqlValue::Null, SqlValue::Real)),
            )
            .chain(hits.iter().map(|h| SqlValue::Integer(h.rank as i64)))
            .collect();

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                let score: Option<f64> = row.get(SCORE_COLUMN)?;
                let rank: i64 = row.get(RANK_COLUMN)?;
                Ok(Ranked {
                    record: self.row_record(row)?,
                    score,
                    rank: rank as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Bind canonical integers as integers so they match INTEGER keys.
fn id_param(id: &RecordId) -> SqlValue {
    match id.as_str().parse::<i64>() {
        Ok(n) if n.to_string() == id.as_str() => SqlValue::Integer(n),
        _ => SqlValue::Text(id.as_str().to_string()),
    }
}

fn field_value(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(n) => FieldValue::Integer(n),
        ValueRef::Real(f) => FieldValue::Float(f),
        ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => FieldValue::Text(hex::encode(b)),
    }
}

fn check_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SyncError::Config(format!("invalid sql identifier '{}'", name)))
    }
}
