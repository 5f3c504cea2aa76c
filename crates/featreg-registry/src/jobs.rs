use crate::JobError;
use chrono::Utc;
use featreg_core::{
    generate_job_id, ImportSpec, JobDetail, JobStatus, MetricSample, PlaceholderPolicy,
    SpecValidator,
};
use featreg_storage::{JobRecord, NewJob, SpecStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub type Job = JobRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobTrackerConfig {
    #[serde(default)]
    pub placeholder_policy: PlaceholderPolicy,
}

/// Ledger of ingestion jobs and the entities and features they populate.
///
/// Status is recorded as reported; no transition is refused.
pub struct JobTracker {
    store: Arc<SpecStore>,
    validator: Arc<dyn SpecValidator>,
    config: JobTrackerConfig,
}

impl JobTracker {
    pub fn new(
        store: Arc<SpecStore>,
        validator: Arc<dyn SpecValidator>,
        config: JobTrackerConfig,
    ) -> Self {
        Self {
            store,
            validator,
            config,
        }
    }

    pub fn create_job(
        &self,
        internal_id: &str,
        external_id: &str,
        runner: &str,
        import_spec: &ImportSpec,
        status: JobStatus,
    ) -> Result<Job, JobError> {
        self.validator.validate_import_spec(import_spec)?;

        let options_json = import_spec
            .options_json()
            .map_err(|err| JobError::Serialization(err.to_string()))?;
        let raw_json = import_spec
            .raw_json()
            .map_err(|err| JobError::Serialization(err.to_string()))?;

        let new_job = NewJob {
            id: internal_id.to_string(),
            ext_id: external_id.to_string(),
            source_type: import_spec.source_type.clone(),
            runner: runner.to_string(),
            options_json,
            raw_json,
            status,
            entity_names: import_spec.entity_names(),
            feature_ids: import_spec.feature_ids(),
        };

        let job = self
            .store
            .insert_job(&new_job, self.config.placeholder_policy)
            .map_err(JobError::Creation)?;
        info!(
            job_id = %job.id,
            runner = %job.runner,
            status = %job.status,
            entities = job.entity_names.len(),
            features = job.feature_ids.len(),
            "job created"
        );
        Ok(job)
    }

    /// Creates a job under a freshly generated internal id.
    pub fn submit_job(
        &self,
        external_id: &str,
        runner: &str,
        import_spec: &ImportSpec,
        status: JobStatus,
    ) -> Result<Job, JobError> {
        let job_id = generate_job_id(&import_spec.source_type, Utc::now());
        self.create_job(&job_id, external_id, runner, import_spec, status)
    }

    pub fn job(&self, job_id: &str) -> Result<Job, JobError> {
        self.store.job(job_id).map_err(JobError::Storage)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>, JobError> {
        self.store.list_jobs().map_err(JobError::Storage)
    }

    pub fn jobs_for_entity(&self, entity_name: &str) -> Result<Vec<Job>, JobError> {
        self.store
            .jobs_for_entity(entity_name)
            .map_err(JobError::Storage)
    }

    pub fn jobs_for_feature(&self, feature_id: &str) -> Result<Vec<Job>, JobError> {
        self.store
            .jobs_for_feature(feature_id)
            .map_err(JobError::Storage)
    }

    pub fn update_status(&self, job_id: &str, status: JobStatus) -> Result<Job, JobError> {
        let change = self
            .store
            .update_job_status(job_id, status)
            .map_err(JobError::Storage)?;
        if change.previous.is_terminal() && change.previous != status {
            warn!(
                job_id,
                previous = %change.previous,
                status = %status,
                "job left a terminal status"
            );
        }
        Ok(change.job)
    }

    /// Appends one sample per `(name, value)` pair, all stamped with the current time.
    ///
    /// Non-finite values are refused before anything is written.
    pub fn record_metrics(&self, job_id: &str, values: &[(String, f64)]) -> Result<usize, JobError> {
        if let Some((name, value)) = values.iter().find(|(_, value)| !value.is_finite()) {
            return Err(JobError::InvalidMetric {
                name: name.clone(),
                value: *value,
            });
        }
        let ts = Utc::now();
        let samples = values
            .iter()
            .map(|(name, value)| MetricSample {
                name: name.clone(),
                value: *value,
                ts,
            })
            .collect::<Vec<_>>();
        self.store
            .append_metrics(job_id, &samples)
            .map_err(JobError::Storage)
    }

    pub fn metrics(&self, job_id: &str) -> Result<Vec<MetricSample>, JobError> {
        self.store.job_metrics(job_id).map_err(JobError::Storage)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<(), JobError> {
        self.store.delete_job(job_id).map_err(JobError::Storage)?;
        info!(job_id, "job deleted");
        Ok(())
    }
}

pub fn to_detail(job: &Job) -> JobDetail {
    JobDetail {
        id: job.id.clone(),
        ext_id: job.ext_id.clone(),
        source_type: job.source_type.clone(),
        runner: job.runner.clone(),
        status: job.status.as_str().to_string(),
        entities: job.entity_names.clone(),
        features: job.feature_ids.clone(),
        created: job.created_at,
        last_updated: job.last_updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featreg_core::{DefaultSpecValidator, EntitySpec, ImportField, ImportSchema};
    use featreg_storage::StorageError;

    fn tracker(policy: PlaceholderPolicy) -> (JobTracker, Arc<SpecStore>) {
        let store = Arc::new(SpecStore::open_in_memory().expect("open store"));
        let tracker = JobTracker::new(
            store.clone(),
            Arc::new(DefaultSpecValidator::new()),
            JobTrackerConfig {
                placeholder_policy: policy,
            },
        );
        (tracker, store)
    }

    fn field(name: &str, feature_id: &str) -> ImportField {
        ImportField {
            name: name.to_string(),
            feature_id: feature_id.to_string(),
        }
    }

    fn import_spec(fields: Vec<ImportField>) -> ImportSpec {
        ImportSpec {
            source_type: "file.csv".to_string(),
            options: [("path".to_string(), "/data/drivers.csv".to_string())]
                .into_iter()
                .collect(),
            entities: vec!["rider".to_string(), "driver".to_string()],
            schema: ImportSchema {
                fields,
                ..ImportSchema::default()
            },
        }
    }

    #[test]
    fn projection_is_independent_of_field_order() {
        let (tracker, _) = tracker(PlaceholderPolicy::AutoCreate);
        let forward = import_spec(vec![
            field("driver_id", ""),
            field("rating", "driver.rating"),
        ]);
        let backward = import_spec(vec![
            field("rating", "driver.rating"),
            field("driver_id", ""),
        ]);

        let a = tracker
            .create_job("job-a", "ext-a", "DirectRunner", &forward, JobStatus::Pending)
            .expect("create a");
        let b = tracker
            .create_job("job-b", "ext-b", "DirectRunner", &backward, JobStatus::Pending)
            .expect("create b");

        for job in [&a, &b] {
            let detail = to_detail(job);
            assert_eq!(detail.entities, vec!["driver", "rider"]);
            assert_eq!(detail.features, vec!["driver.rating"]);
        }
    }

    #[test]
    fn detail_round_trips_identity_and_status() {
        let (tracker, _) = tracker(PlaceholderPolicy::AutoCreate);
        let job = tracker
            .create_job(
                "job-1",
                "dataflow-123",
                "DataflowRunner",
                &import_spec(vec![field("rating", "driver.rating")]),
                JobStatus::Running,
            )
            .expect("create job");

        let detail = to_detail(&job);
        assert_eq!(detail.id, "job-1");
        assert_eq!(detail.ext_id, "dataflow-123");
        assert_eq!(detail.runner, "DataflowRunner");
        assert_eq!(detail.source_type, "file.csv");
        assert_eq!(detail.status, "RUNNING");
        assert!(detail.created <= detail.last_updated);
    }

    #[test]
    fn options_and_raw_spec_are_kept_as_json() {
        let (tracker, _) = tracker(PlaceholderPolicy::AutoCreate);
        let spec = import_spec(vec![field("rating", "driver.rating")]);
        let job = tracker
            .create_job("job-2", "ext", "DirectRunner", &spec, JobStatus::Pending)
            .expect("create job");

        assert_eq!(job.options_json, r#"{"path":"/data/drivers.csv"}"#);
        let raw: ImportSpec = serde_json::from_str(&job.raw_json).expect("raw is json");
        assert_eq!(raw, spec);
    }

    #[test]
    fn reject_policy_requires_registered_entities() {
        let (tracker, store) = tracker(PlaceholderPolicy::Reject);
        let err = tracker
            .create_job(
                "job-3",
                "ext",
                "DirectRunner",
                &import_spec(Vec::new()),
                JobStatus::Pending,
            )
            .expect_err("entities unregistered");
        assert!(matches!(
            err,
            JobError::Creation(StorageError::MissingReference { .. })
        ));

        store
            .put_spec(&EntitySpec::placeholder("driver"))
            .expect("put driver");
        store
            .put_spec(&EntitySpec::placeholder("rider"))
            .expect("put rider");
        tracker
            .create_job(
                "job-3",
                "ext",
                "DirectRunner",
                &import_spec(Vec::new()),
                JobStatus::Pending,
            )
            .expect("entities now registered");
    }

    #[test]
    fn invalid_import_spec_is_a_bad_request() {
        let (tracker, _) = tracker(PlaceholderPolicy::AutoCreate);
        let spec = ImportSpec {
            source_type: String::new(),
            ..import_spec(Vec::new())
        };
        let err = tracker
            .create_job("job-4", "ext", "DirectRunner", &spec, JobStatus::Pending)
            .expect_err("missing type");
        assert_eq!(err.class(), crate::ErrorClass::BadRequest);
        assert!(tracker.job("job-4").expect_err("not stored").is_not_found());
    }

    #[test]
    fn malformed_entity_names_never_become_placeholders() {
        let (tracker, store) = tracker(PlaceholderPolicy::AutoCreate);
        let spec = ImportSpec {
            entities: vec![String::new(), "Bad Name".to_string()],
            ..import_spec(Vec::new())
        };
        let err = tracker
            .create_job("job-6", "ext", "DirectRunner", &spec, JobStatus::Pending)
            .expect_err("invalid entity names");
        assert_eq!(err.class(), crate::ErrorClass::BadRequest);
        assert!(store
            .list_specs::<EntitySpec>()
            .expect("list entities")
            .is_empty());
    }

    #[test]
    fn non_finite_metrics_are_bad_requests() {
        let (tracker, store) = tracker(PlaceholderPolicy::AutoCreate);
        tracker
            .create_job(
                "job-7",
                "ext",
                "DirectRunner",
                &import_spec(Vec::new()),
                JobStatus::Running,
            )
            .expect("create job");

        let err = tracker
            .record_metrics(
                "job-7",
                &[("rows_read".to_string(), 10.0), ("lag".to_string(), f64::NAN)],
            )
            .expect_err("nan rejected");
        assert!(matches!(err, JobError::InvalidMetric { ref name, .. } if name == "lag"));
        assert_eq!(err.class(), crate::ErrorClass::BadRequest);
        assert_eq!(store.metric_count("job-7").expect("count"), 0);
    }

    #[test]
    fn submit_generates_an_id_from_the_source_type() {
        let (tracker, _) = tracker(PlaceholderPolicy::AutoCreate);
        let job = tracker
            .submit_job(
                "ext",
                "DirectRunner",
                &import_spec(Vec::new()),
                JobStatus::Pending,
            )
            .expect("submit job");
        assert!(job.id.starts_with("file.csv-"));
        assert_eq!(tracker.job(&job.id).expect("lookup").id, job.id);
    }

    #[test]
    fn status_and_metrics_are_recorded() {
        let (tracker, _) = tracker(PlaceholderPolicy::AutoCreate);
        tracker
            .create_job(
                "job-5",
                "ext",
                "DirectRunner",
                &import_spec(Vec::new()),
                JobStatus::Pending,
            )
            .expect("create job");

        let job = tracker
            .update_status("job-5", JobStatus::Completed)
            .expect("complete");
        assert_eq!(job.status, JobStatus::Completed);
        let job = tracker
            .update_status("job-5", JobStatus::Running)
            .expect("passive ledger accepts backward moves");
        assert_eq!(job.status, JobStatus::Running);

        let written = tracker
            .record_metrics(
                "job-5",
                &[("rows_read".to_string(), 120.0), ("rows_failed".to_string(), 2.0)],
            )
            .expect("record metrics");
        assert_eq!(written, 2);
        let names = tracker
            .metrics("job-5")
            .expect("metrics")
            .into_iter()
            .map(|sample| sample.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["rows_read", "rows_failed"]);

        tracker.delete_job("job-5").expect("delete");
        assert!(tracker.metrics("job-5").expect_err("gone").is_not_found());
    }
}
