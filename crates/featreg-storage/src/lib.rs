use chrono::{DateTime, SecondsFormat, Utc};
use featreg_core::{
    EntitySpec, FeatureSpec, JobStatus, MetricSample, PlaceholderPolicy, RegistrySpec, SpecKind,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub const REGISTRY_SCHEMA_VERSION: i64 = 2;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("{what} {id:?} not found")]
    NotFound { what: &'static str, id: String },
    #[error("job {id:?} already exists")]
    DuplicateJob { id: String },
    #[error("{kind} {id:?} is not registered")]
    MissingReference { kind: SpecKind, id: String },
    #[error("store connection lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// A spec together with the bookkeeping the store keeps for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSpec<S> {
    pub id: String,
    pub spec: S,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub id: String,
    pub ext_id: String,
    pub source_type: String,
    pub runner: String,
    pub options_json: String,
    pub raw_json: String,
    pub status: JobStatus,
    pub entity_names: Vec<String>,
    pub feature_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: String,
    pub ext_id: String,
    pub source_type: String,
    pub runner: String,
    pub options_json: String,
    pub raw_json: String,
    pub status: JobStatus,
    pub entity_names: Vec<String>,
    pub feature_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: JobStatus,
    pub job: JobRecord,
}

/// SQLite-backed store for specs, jobs and their metrics.
///
/// A single connection sits behind a mutex, so every call is linearized against the others.
pub struct SpecStore {
    conn: Mutex<Connection>,
}

impl SpecStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        schema_version(&*self.conn()?)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn()?
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Inserts or replaces the spec under its canonical id.
    ///
    /// `created_at` survives overwrites; `last_updated` moves forward on every write.
    pub fn put_spec<S: RegistrySpec>(&self, spec: &S) -> Result<StoredSpec<S>, StorageError> {
        let id = spec.registry_id();
        let spec_json = serde_json::to_string(spec)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let table = spec_table(S::KIND);
        let conn = self.conn()?;

        conn.execute(
            &format!(
                "
                INSERT INTO {table} (id, spec_json, created_at, last_updated)
                VALUES (?1, ?2, ?3, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    spec_json=excluded.spec_json,
                    last_updated=max({table}.last_updated, excluded.last_updated)
                "
            ),
            params![id, spec_json, format_timestamp(Utc::now())],
        )?;

        query_spec::<S>(&conn, &id)?.ok_or(StorageError::NotFound {
            what: S::KIND.as_str(),
            id,
        })
    }

    pub fn get_spec<S: RegistrySpec>(&self, id: &str) -> Result<StoredSpec<S>, StorageError> {
        query_spec::<S>(&*self.conn()?, id)?.ok_or_else(|| StorageError::NotFound {
            what: S::KIND.as_str(),
            id: id.to_string(),
        })
    }

    /// Reads every id in order under one lock; the first missing id fails the call.
    pub fn get_specs<S: RegistrySpec>(
        &self,
        ids: &[String],
    ) -> Result<Vec<StoredSpec<S>>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut specs = Vec::with_capacity(ids.len());
        for id in ids {
            let spec = query_spec::<S>(&conn, id)?.ok_or_else(|| StorageError::NotFound {
                what: S::KIND.as_str(),
                id: id.clone(),
            })?;
            specs.push(spec);
        }
        Ok(specs)
    }

    /// All records of a kind, in insertion order.
    pub fn list_specs<S: RegistrySpec>(&self) -> Result<Vec<StoredSpec<S>>, StorageError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT id, spec_json, created_at, last_updated FROM {} ORDER BY rowid ASC",
            spec_table(S::KIND)
        ))?;
        let rows = statement.query_map([], read_spec_row::<S>)?;

        let mut specs = Vec::new();
        for row in rows {
            specs.push(row?);
        }
        Ok(specs)
    }

    pub fn spec_exists(&self, kind: SpecKind, id: &str) -> Result<bool, StorageError> {
        spec_exists(&*self.conn()?, kind, id)
    }

    /// Persists a job with its entity and feature associations in one transaction.
    pub fn insert_job(
        &self,
        job: &NewJob,
        policy: PlaceholderPolicy,
    ) -> Result<JobRecord, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_timestamp(Utc::now());

        if job_exists(&tx, &job.id)? {
            return Err(StorageError::DuplicateJob { id: job.id.clone() });
        }

        tx.execute(
            "
            INSERT INTO jobs (
                id,
                ext_id,
                type,
                runner,
                options,
                status,
                raw,
                created_at,
                last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ",
            params![
                job.id,
                job.ext_id,
                job.source_type,
                job.runner,
                job.options_json,
                job.status.as_str(),
                job.raw_json,
                now,
            ],
        )?;

        for name in &job.entity_names {
            ensure_spec(&tx, &EntitySpec::placeholder(name), policy, &now)?;
            tx.execute(
                "INSERT OR IGNORE INTO job_entities (job_id, entity_name) VALUES (?1, ?2)",
                params![job.id, name],
            )?;
        }

        for feature_id in &job.feature_ids {
            let feature = FeatureSpec::placeholder(feature_id);
            ensure_spec(&tx, &EntitySpec::placeholder(&feature.entity), policy, &now)?;
            ensure_spec(&tx, &feature, policy, &now)?;
            tx.execute(
                "INSERT OR IGNORE INTO job_features (job_id, feature_id) VALUES (?1, ?2)",
                params![job.id, feature_id],
            )?;
        }

        let record = load_job(&tx, &job.id)?.ok_or_else(|| StorageError::NotFound {
            what: "job",
            id: job.id.clone(),
        })?;
        tx.commit()?;
        Ok(record)
    }

    pub fn job(&self, id: &str) -> Result<JobRecord, StorageError> {
        load_job(&*self.conn()?, id)?.ok_or_else(|| StorageError::NotFound {
            what: "job",
            id: id.to_string(),
        })
    }

    pub fn list_jobs(&self) -> Result<Vec<JobRecord>, StorageError> {
        let conn = self.conn()?;
        let ids = query_ids(
            &conn,
            "SELECT id FROM jobs ORDER BY created_at ASC, id ASC",
            [],
        )?;
        load_jobs(&conn, ids)
    }

    pub fn jobs_for_entity(&self, entity_name: &str) -> Result<Vec<JobRecord>, StorageError> {
        let conn = self.conn()?;
        let ids = query_ids(
            &conn,
            "
            SELECT jobs.id
            FROM job_entities
            JOIN jobs ON jobs.id = job_entities.job_id
            WHERE job_entities.entity_name = ?1
            ORDER BY jobs.created_at ASC, jobs.id ASC
            ",
            [entity_name],
        )?;
        load_jobs(&conn, ids)
    }

    pub fn jobs_for_feature(&self, feature_id: &str) -> Result<Vec<JobRecord>, StorageError> {
        let conn = self.conn()?;
        let ids = query_ids(
            &conn,
            "
            SELECT jobs.id
            FROM job_features
            JOIN jobs ON jobs.id = job_features.job_id
            WHERE job_features.feature_id = ?1
            ORDER BY jobs.created_at ASC, jobs.id ASC
            ",
            [feature_id],
        )?;
        load_jobs(&conn, ids)
    }

    /// Overwrites the job status. Any transition is accepted.
    pub fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
    ) -> Result<StatusChange, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let previous = load_job(&tx, id)?
            .ok_or_else(|| StorageError::NotFound {
                what: "job",
                id: id.to_string(),
            })?
            .status;

        tx.execute(
            "
            UPDATE jobs
            SET status = ?2,
                last_updated = max(last_updated, ?3)
            WHERE id = ?1
            ",
            params![id, status.as_str(), format_timestamp(Utc::now())],
        )?;

        let job = load_job(&tx, id)?.ok_or_else(|| StorageError::NotFound {
            what: "job",
            id: id.to_string(),
        })?;
        tx.commit()?;
        Ok(StatusChange { previous, job })
    }

    pub fn append_metrics(
        &self,
        job_id: &str,
        samples: &[MetricSample],
    ) -> Result<usize, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if !job_exists(&tx, job_id)? {
            return Err(StorageError::NotFound {
                what: "job",
                id: job_id.to_string(),
            });
        }

        for sample in samples {
            tx.execute(
                "INSERT INTO job_metrics (job_id, name, value, ts) VALUES (?1, ?2, ?3, ?4)",
                params![job_id, sample.name, sample.value, format_timestamp(sample.ts)],
            )?;
        }
        tx.commit()?;
        Ok(samples.len())
    }

    pub fn job_metrics(&self, job_id: &str) -> Result<Vec<MetricSample>, StorageError> {
        let conn = self.conn()?;
        if !job_exists(&conn, job_id)? {
            return Err(StorageError::NotFound {
                what: "job",
                id: job_id.to_string(),
            });
        }

        let mut statement = conn.prepare(
            "
            SELECT name, value, ts
            FROM job_metrics
            WHERE job_id = ?1
            ORDER BY seq ASC
            ",
        )?;
        let rows = statement.query_map([job_id], |row| {
            let ts = parse_timestamp(row.get::<_, String>(2)?)
                .map_err(|err| conversion_error(2, err))?;
            Ok(MetricSample {
                name: row.get(0)?,
                value: row.get(1)?,
                ts,
            })
        })?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    /// Removes a job together with its metrics and associations.
    pub fn delete_job(&self, id: &str) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if !job_exists(&tx, id)? {
            return Err(StorageError::NotFound {
                what: "job",
                id: id.to_string(),
            });
        }

        tx.execute("DELETE FROM job_metrics WHERE job_id = ?1", [id])?;
        tx.execute("DELETE FROM job_entities WHERE job_id = ?1", [id])?;
        tx.execute("DELETE FROM job_features WHERE job_id = ?1", [id])?;
        tx.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn metric_count(&self, job_id: &str) -> Result<i64, StorageError> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM job_metrics WHERE job_id = ?1",
            [job_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn schema_version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn migrate(conn: &Connection) -> Result<(), StorageError> {
    let mut current = schema_version(conn)?;
    if current > REGISTRY_SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchemaVersion {
            found: current,
            supported: REGISTRY_SCHEMA_VERSION,
        });
    }

    if current < 1 {
        let sql = include_str!("../migrations/0001_registry_schema.sql");
        conn.execute_batch(sql)?;
        conn.execute_batch("PRAGMA user_version = 1;")?;
        current = 1;
    }

    if current < 2 {
        let sql = include_str!("../migrations/0002_job_tracking.sql");
        conn.execute_batch(sql)?;
        conn.execute_batch("PRAGMA user_version = 2;")?;
    }

    Ok(())
}

fn spec_table(kind: SpecKind) -> &'static str {
    match kind {
        SpecKind::Entity => "entities",
        SpecKind::Feature => "features",
        SpecKind::FeatureGroup => "feature_groups",
        SpecKind::Storage => "storage",
    }
}

fn spec_exists(conn: &Connection, kind: SpecKind, id: &str) -> Result<bool, StorageError> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1 LIMIT 1", spec_table(kind)),
            [id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_spec<S: RegistrySpec>(
    conn: &Connection,
    id: &str,
) -> Result<Option<StoredSpec<S>>, StorageError> {
    let spec = conn
        .query_row(
            &format!(
                "SELECT id, spec_json, created_at, last_updated FROM {} WHERE id = ?1",
                spec_table(S::KIND)
            ),
            [id],
            read_spec_row::<S>,
        )
        .optional()?;
    Ok(spec)
}

fn read_spec_row<S: RegistrySpec>(row: &Row<'_>) -> rusqlite::Result<StoredSpec<S>> {
    let spec_json: String = row.get(1)?;
    let spec = serde_json::from_str(&spec_json).map_err(|err| conversion_error(1, err))?;
    let created_at =
        parse_timestamp(row.get::<_, String>(2)?).map_err(|err| conversion_error(2, err))?;
    let last_updated =
        parse_timestamp(row.get::<_, String>(3)?).map_err(|err| conversion_error(3, err))?;

    Ok(StoredSpec {
        id: row.get(0)?,
        spec,
        created_at,
        last_updated,
    })
}

/// Makes sure a spec row exists for a job association, honoring the placeholder policy.
fn ensure_spec<S: RegistrySpec>(
    conn: &Connection,
    placeholder: &S,
    policy: PlaceholderPolicy,
    now: &str,
) -> Result<(), StorageError> {
    let id = placeholder.registry_id();
    match policy {
        PlaceholderPolicy::AutoCreate => {
            let spec_json = serde_json::to_string(placeholder)
                .map_err(|err| StorageError::Serialization(err.to_string()))?;
            conn.execute(
                &format!(
                    "
                    INSERT OR IGNORE INTO {} (id, spec_json, created_at, last_updated)
                    VALUES (?1, ?2, ?3, ?3)
                    ",
                    spec_table(S::KIND)
                ),
                params![id, spec_json, now],
            )?;
            Ok(())
        }
        PlaceholderPolicy::Reject => {
            if spec_exists(conn, S::KIND, &id)? {
                Ok(())
            } else {
                Err(StorageError::MissingReference { kind: S::KIND, id })
            }
        }
    }
}

fn job_exists(conn: &Connection, id: &str) -> Result<bool, StorageError> {
    let found = conn
        .query_row("SELECT 1 FROM jobs WHERE id = ?1 LIMIT 1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn query_ids<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<String>, StorageError> {
    let mut statement = conn.prepare(sql)?;
    let rows = statement.query_map(params, |row| row.get(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn load_jobs(conn: &Connection, ids: Vec<String>) -> Result<Vec<JobRecord>, StorageError> {
    let mut jobs = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(job) = load_job(conn, &id)? {
            jobs.push(job);
        }
    }
    Ok(jobs)
}

fn load_job(conn: &Connection, id: &str) -> Result<Option<JobRecord>, StorageError> {
    let job = conn
        .query_row(
            "
            SELECT id, ext_id, type, runner, options, status, raw, created_at, last_updated
            FROM jobs
            WHERE id = ?1
            ",
            [id],
            |row| {
                let status_raw: String = row.get(5)?;
                let status = status_raw.parse::<JobStatus>().map_err(|err| {
                    conversion_error(
                        5,
                        std::io::Error::new(std::io::ErrorKind::InvalidData, err),
                    )
                })?;
                let created_at = parse_timestamp(row.get::<_, String>(7)?)
                    .map_err(|err| conversion_error(7, err))?;
                let last_updated = parse_timestamp(row.get::<_, String>(8)?)
                    .map_err(|err| conversion_error(8, err))?;

                Ok(JobRecord {
                    id: row.get(0)?,
                    ext_id: row.get(1)?,
                    source_type: row.get(2)?,
                    runner: row.get(3)?,
                    options_json: row.get(4)?,
                    status,
                    raw_json: row.get(6)?,
                    entity_names: Vec::new(),
                    feature_ids: Vec::new(),
                    created_at,
                    last_updated,
                })
            },
        )
        .optional()?;

    let Some(mut job) = job else {
        return Ok(None);
    };

    job.entity_names = query_ids(
        conn,
        "SELECT entity_name FROM job_entities WHERE job_id = ?1 ORDER BY entity_name ASC",
        [id],
    )?;
    job.feature_ids = query_ids(
        conn,
        "SELECT feature_id FROM job_features WHERE job_id = ?1 ORDER BY feature_id ASC",
        [id],
    )?;
    Ok(Some(job))
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use featreg_core::{FeatureGroupSpec, StorageSpec, ValueType};
    use tempfile::NamedTempFile;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn storage(id: &str, storage_type: &str) -> StorageSpec {
        StorageSpec {
            id: id.to_string(),
            storage_type: storage_type.to_string(),
            ..StorageSpec::default()
        }
    }

    fn new_job(id: &str, entities: &[&str], features: &[&str]) -> NewJob {
        NewJob {
            id: id.to_string(),
            ext_id: format!("ext-{id}"),
            source_type: "file.csv".to_string(),
            runner: "DirectRunner".to_string(),
            options_json: "{}".to_string(),
            raw_json: "{}".to_string(),
            status: JobStatus::Pending,
            entity_names: entities.iter().map(|value| value.to_string()).collect(),
            feature_ids: features.iter().map(|value| value.to_string()).collect(),
        }
    }

    #[test]
    fn migration_creates_registry_tables() {
        let store = SpecStore::open_in_memory().expect("open store");

        for table in [
            "entities",
            "features",
            "feature_groups",
            "storage",
            "jobs",
            "job_entities",
            "job_features",
            "job_metrics",
        ] {
            assert!(store.table_exists(table).expect("table check"), "{table}");
        }

        assert_eq!(
            store.schema_version().expect("schema version"),
            REGISTRY_SCHEMA_VERSION
        );
    }

    #[test]
    fn reopening_a_file_store_keeps_records() {
        let file = NamedTempFile::new().expect("temp db");
        {
            let store = SpecStore::open(file.path()).expect("open store");
            store
                .put_spec(&storage("redis-1", "REDIS"))
                .expect("put storage");
        }

        let store = SpecStore::open(file.path()).expect("reopen store");
        let stored = store
            .get_spec::<StorageSpec>("redis-1")
            .expect("get storage");
        assert_eq!(stored.spec.storage_type, "REDIS");
        assert_eq!(
            store.schema_version().expect("schema version"),
            REGISTRY_SCHEMA_VERSION
        );
    }

    #[test]
    fn put_overwrites_and_keeps_created_at() {
        let store = SpecStore::open_in_memory().expect("open store");
        let first = store
            .put_spec(&storage("redis-1", "REDIS"))
            .expect("first put");
        let second = store
            .put_spec(&storage("redis-1", "BIGTABLE"))
            .expect("second put");

        assert_eq!(second.spec.storage_type, "BIGTABLE");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_updated >= first.last_updated);
        assert_eq!(store.list_specs::<StorageSpec>().expect("list").len(), 1);
    }

    #[test]
    fn get_specs_fails_on_any_missing_id() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .put_spec(&EntitySpec::placeholder("driver"))
            .expect("put entity");

        let err = store
            .get_specs::<EntitySpec>(&["driver".to_string(), "rider".to_string()])
            .expect_err("missing id should fail");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "entity \"rider\" not found");

        assert!(store
            .get_specs::<EntitySpec>(&[])
            .expect("empty ids")
            .is_empty());
    }

    #[test]
    fn list_specs_keeps_insertion_order_across_overwrites() {
        let store = SpecStore::open_in_memory().expect("open store");
        for id in ["zeta", "alpha", "mid"] {
            store
                .put_spec(&FeatureGroupSpec {
                    id: id.to_string(),
                    ..FeatureGroupSpec::default()
                })
                .expect("put group");
        }
        store
            .put_spec(&FeatureGroupSpec {
                id: "zeta".to_string(),
                tags: vec!["hot".to_string()],
                ..FeatureGroupSpec::default()
            })
            .expect("overwrite group");

        let ids = store
            .list_specs::<FeatureGroupSpec>()
            .expect("list groups")
            .into_iter()
            .map(|stored| stored.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn insert_job_creates_placeholders_without_clobbering_registered_specs() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .put_spec(&EntitySpec {
                name: "driver".to_string(),
                description: "registered".to_string(),
                tags: Vec::new(),
            })
            .expect("put entity");

        let job = store
            .insert_job(
                &new_job("job-1", &["driver", "rider"], &["driver.rating"]),
                PlaceholderPolicy::AutoCreate,
            )
            .expect("insert job");

        assert_eq!(job.entity_names, vec!["driver", "rider"]);
        assert_eq!(job.feature_ids, vec!["driver.rating"]);
        assert_eq!(job.created_at, job.last_updated);

        let driver = store.get_spec::<EntitySpec>("driver").expect("driver");
        assert_eq!(driver.spec.description, "registered");
        let rider = store.get_spec::<EntitySpec>("rider").expect("rider");
        assert_eq!(rider.spec, EntitySpec::placeholder("rider"));
        let feature = store
            .get_spec::<FeatureSpec>("driver.rating")
            .expect("feature placeholder");
        assert_eq!(feature.spec.entity, "driver");
        assert_eq!(feature.spec.value_type, ValueType::Unknown);
    }

    #[test]
    fn placeholder_feature_brings_its_owning_entity() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .insert_job(
                &new_job("job-owner", &["driver"], &["rider.rating"]),
                PlaceholderPolicy::AutoCreate,
            )
            .expect("insert job");

        assert!(store
            .spec_exists(SpecKind::Entity, "rider")
            .expect("entity check"));
        let feature = store
            .get_spec::<FeatureSpec>("rider.rating")
            .expect("feature placeholder");
        assert_eq!(feature.spec.entity, "rider");
    }

    #[test]
    fn reject_policy_requires_the_feature_owner() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .put_spec(&FeatureSpec::placeholder("rider.rating"))
            .expect("put feature");

        let err = store
            .insert_job(
                &new_job("job-orphan", &[], &["rider.rating"]),
                PlaceholderPolicy::Reject,
            )
            .expect_err("owner entity unregistered");
        match err {
            StorageError::MissingReference { kind, id } => {
                assert_eq!(kind, SpecKind::Entity);
                assert_eq!(id, "rider");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.list_jobs().expect("list jobs").is_empty());
    }

    #[test]
    fn reject_policy_leaves_no_partial_job() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .put_spec(&EntitySpec::placeholder("driver"))
            .expect("put entity");

        let err = store
            .insert_job(
                &new_job("job-2", &["driver"], &["driver.rating"]),
                PlaceholderPolicy::Reject,
            )
            .expect_err("unregistered feature");
        assert!(matches!(
            err,
            StorageError::MissingReference {
                kind: SpecKind::Feature,
                ..
            }
        ));
        assert!(store.job("job-2").expect_err("no job").is_not_found());
        assert!(store.list_jobs().expect("list jobs").is_empty());
    }

    #[test]
    fn duplicate_job_id_is_rejected() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .insert_job(&new_job("job-3", &[], &[]), PlaceholderPolicy::AutoCreate)
            .expect("first insert");
        let err = store
            .insert_job(&new_job("job-3", &[], &[]), PlaceholderPolicy::AutoCreate)
            .expect_err("second insert");
        assert!(matches!(err, StorageError::DuplicateJob { .. }));
    }

    #[test]
    fn association_lookups_work_from_both_sides() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .insert_job(
                &new_job("job-a", &["driver"], &["driver.rating"]),
                PlaceholderPolicy::AutoCreate,
            )
            .expect("job a");
        store
            .insert_job(
                &new_job("job-b", &["driver", "rider"], &[]),
                PlaceholderPolicy::AutoCreate,
            )
            .expect("job b");

        let for_driver = store.jobs_for_entity("driver").expect("by entity");
        assert_eq!(for_driver.len(), 2);
        let for_rider = store.jobs_for_entity("rider").expect("by entity");
        assert_eq!(for_rider.len(), 1);
        assert_eq!(for_rider[0].id, "job-b");
        let for_feature = store
            .jobs_for_feature("driver.rating")
            .expect("by feature");
        assert_eq!(for_feature.len(), 1);
        assert_eq!(for_feature[0].id, "job-a");
    }

    #[test]
    fn status_update_reports_previous_and_accepts_any_transition() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .insert_job(&new_job("job-4", &[], &[]), PlaceholderPolicy::AutoCreate)
            .expect("insert job");

        let change = store
            .update_job_status("job-4", JobStatus::Completed)
            .expect("complete");
        assert_eq!(change.previous, JobStatus::Pending);
        assert_eq!(change.job.status, JobStatus::Completed);

        let change = store
            .update_job_status("job-4", JobStatus::Running)
            .expect("backward transition");
        assert_eq!(change.previous, JobStatus::Completed);
        assert!(change.job.last_updated >= change.job.created_at);

        assert!(store
            .update_job_status("missing", JobStatus::Running)
            .expect_err("missing job")
            .is_not_found());
    }

    #[test]
    fn deleting_a_job_cascades_metrics_and_associations() {
        let store = SpecStore::open_in_memory().expect("open store");
        store
            .insert_job(
                &new_job("job-5", &["driver"], &["driver.rating"]),
                PlaceholderPolicy::AutoCreate,
            )
            .expect("insert job");
        store
            .append_metrics(
                "job-5",
                &[
                    MetricSample {
                        name: "rows_read".to_string(),
                        value: 10.0,
                        ts: ts(0),
                    },
                    MetricSample {
                        name: "rows_read".to_string(),
                        value: 25.0,
                        ts: ts(1),
                    },
                ],
            )
            .expect("append metrics");

        let metrics = store.job_metrics("job-5").expect("metrics");
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].value, 25.0);
        assert_eq!(metrics[1].ts, ts(1));

        store.delete_job("job-5").expect("delete job");
        assert_eq!(store.metric_count("job-5").expect("count"), 0);
        assert!(store.jobs_for_entity("driver").expect("lookup").is_empty());
        assert!(store
            .spec_exists(SpecKind::Entity, "driver")
            .expect("entity check"));
        assert!(store.delete_job("job-5").expect_err("gone").is_not_found());
    }

    #[test]
    fn metrics_for_unknown_job_are_rejected() {
        let store = SpecStore::open_in_memory().expect("open store");
        let err = store
            .append_metrics(
                "nope",
                &[MetricSample {
                    name: "rows".to_string(),
                    value: 1.0,
                    ts: ts(0),
                }],
            )
            .expect_err("unknown job");
        assert!(err.is_not_found());
    }
}
