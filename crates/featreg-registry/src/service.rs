use crate::jobs::{to_detail, JobTracker, JobTrackerConfig};
use crate::query::QueryFacade;
use crate::registry::SpecRegistry;
use crate::{JobError, RegistryError, RetrievalError};
use featreg_core::{
    DefaultSpecValidator, EntitySpec, FeatureGroupSpec, FeatureSpec, ImportSpec, JobDetail,
    JobStatus, MetricSample, SpecValidator, StorageSpec,
};
use featreg_storage::SpecStore;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Every external operation of the registry, with request logging.
///
/// Transports bind to this type; it owns no state beyond the shared store.
pub struct CoreService {
    registry: SpecRegistry,
    query: QueryFacade,
    jobs: JobTracker,
}

impl CoreService {
    pub fn new(store: Arc<SpecStore>, config: JobTrackerConfig) -> Self {
        Self::with_validator(store, Arc::new(DefaultSpecValidator::new()), config)
    }

    pub fn with_validator(
        store: Arc<SpecStore>,
        validator: Arc<dyn SpecValidator>,
        config: JobTrackerConfig,
    ) -> Self {
        Self {
            registry: SpecRegistry::new(store.clone(), validator.clone()),
            query: QueryFacade::new(store.clone()),
            jobs: JobTracker::new(store, validator, config),
        }
    }

    pub fn registry(&self) -> &SpecRegistry {
        &self.registry
    }

    pub fn query(&self) -> &QueryFacade {
        &self.query
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn register_entity(&self, spec: EntitySpec) -> Result<String, RegistryError> {
        observe("register_entity", || self.registry.register_entity(spec))
    }

    pub fn register_feature(&self, spec: FeatureSpec) -> Result<String, RegistryError> {
        observe("register_feature", || self.registry.register_feature(spec))
    }

    pub fn register_feature_group(&self, spec: FeatureGroupSpec) -> Result<String, RegistryError> {
        observe("register_feature_group", || {
            self.registry.register_feature_group(spec)
        })
    }

    pub fn register_storage(&self, spec: StorageSpec) -> Result<String, RegistryError> {
        observe("register_storage", || self.registry.register_storage(spec))
    }

    pub fn get_entities(&self, ids: &[String]) -> Result<Vec<EntitySpec>, RetrievalError> {
        observe("get_entities", || self.query.get_entities(ids))
    }

    pub fn list_entities(&self) -> Result<Vec<EntitySpec>, RetrievalError> {
        observe("list_entities", || self.query.list_entities())
    }

    pub fn get_features(&self, ids: &[String]) -> Result<Vec<FeatureSpec>, RetrievalError> {
        observe("get_features", || self.query.get_features(ids))
    }

    pub fn list_features(&self) -> Result<Vec<FeatureSpec>, RetrievalError> {
        observe("list_features", || self.query.list_features())
    }

    pub fn get_feature_groups(
        &self,
        ids: &[String],
    ) -> Result<Vec<FeatureGroupSpec>, RetrievalError> {
        observe("get_feature_groups", || self.query.get_feature_groups(ids))
    }

    pub fn list_feature_groups(&self) -> Result<Vec<FeatureGroupSpec>, RetrievalError> {
        observe("list_feature_groups", || self.query.list_feature_groups())
    }

    pub fn get_storage(&self, ids: &[String]) -> Result<Vec<StorageSpec>, RetrievalError> {
        observe("get_storage", || self.query.get_storage(ids))
    }

    pub fn list_storage(&self) -> Result<Vec<StorageSpec>, RetrievalError> {
        observe("list_storage", || self.query.list_storage())
    }

    /// Records a new ingestion invocation. The internal id is generated.
    pub fn create_job(
        &self,
        external_id: &str,
        runner: &str,
        import_spec: &ImportSpec,
        status: JobStatus,
    ) -> Result<JobDetail, JobError> {
        observe("create_job", || {
            self.jobs
                .submit_job(external_id, runner, import_spec, status)
                .map(|job| to_detail(&job))
        })
    }

    pub fn get_job(&self, job_id: &str) -> Result<JobDetail, JobError> {
        observe("get_job", || self.jobs.job(job_id).map(|job| to_detail(&job)))
    }

    pub fn list_jobs(&self) -> Result<Vec<JobDetail>, JobError> {
        observe("list_jobs", || {
            self.jobs
                .list_jobs()
                .map(|jobs| jobs.iter().map(to_detail).collect())
        })
    }

    pub fn jobs_for_entity(&self, entity_name: &str) -> Result<Vec<JobDetail>, JobError> {
        observe("jobs_for_entity", || {
            self.jobs
                .jobs_for_entity(entity_name)
                .map(|jobs| jobs.iter().map(to_detail).collect())
        })
    }

    pub fn jobs_for_feature(&self, feature_id: &str) -> Result<Vec<JobDetail>, JobError> {
        observe("jobs_for_feature", || {
            self.jobs
                .jobs_for_feature(feature_id)
                .map(|jobs| jobs.iter().map(to_detail).collect())
        })
    }

    pub fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
    ) -> Result<JobDetail, JobError> {
        observe("update_job_status", || {
            self.jobs
                .update_status(job_id, status)
                .map(|job| to_detail(&job))
        })
    }

    pub fn record_job_metrics(
        &self,
        job_id: &str,
        values: &[(String, f64)],
    ) -> Result<usize, JobError> {
        observe("record_job_metrics", || {
            self.jobs.record_metrics(job_id, values)
        })
    }

    pub fn job_metrics(&self, job_id: &str) -> Result<Vec<MetricSample>, JobError> {
        observe("job_metrics", || self.jobs.metrics(job_id))
    }

    pub fn delete_job(&self, job_id: &str) -> Result<(), JobError> {
        observe("delete_job", || self.jobs.delete_job(job_id))
    }
}

fn observe<T, E: Display>(
    operation: &'static str,
    request: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let started = Instant::now();
    let result = request();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(operation, elapsed_ms, "request completed"),
        Err(err) => error!(operation, elapsed_ms, error = %err, "request failed"),
    }
    result
}
