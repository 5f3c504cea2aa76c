pub mod job_contracts;
pub mod spec_contracts;
pub mod validation;

pub use job_contracts::{
    generate_job_id, ImportField, ImportSchema, ImportSpec, JobDetail, JobStatus, MetricSample,
    PlaceholderPolicy,
};
pub use spec_contracts::{
    DataStore, DataStores, EntitySpec, FeatureGroupSpec, FeatureSpec, RegistrySpec, SpecKind,
    StorageSpec, ValueType,
};
pub use validation::{DefaultSpecValidator, SpecValidator, Validate, ValidationError};
