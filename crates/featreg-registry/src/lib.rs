pub mod jobs;
pub mod query;
pub mod registry;
pub mod service;

use featreg_core::ValidationError;
use featreg_storage::StorageError;
use thiserror::Error;

pub use jobs::{to_detail, Job, JobTracker, JobTrackerConfig};
pub use query::QueryFacade;
pub use registry::SpecRegistry;
pub use service::CoreService;

/// How a transport should report an error: caller mistake or system problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Internal,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid spec: {0}")]
    BadRequest(#[from] ValidationError),
    #[error("registration failed: {0}")]
    Registration(#[from] StorageError),
}

impl RegistryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RegistryError::BadRequest(_) => ErrorClass::BadRequest,
            RegistryError::Registration(_) => ErrorClass::Internal,
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retrieval failed: {0}")]
    Storage(#[from] StorageError),
}

impl RetrievalError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Internal
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            RetrievalError::Storage(err) => err.is_not_found(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid import spec: {0}")]
    InvalidImportSpec(#[from] ValidationError),
    #[error("metric {name:?} has non-finite value {value}")]
    InvalidMetric { name: String, value: f64 },
    #[error("job creation failed: {0}")]
    Creation(StorageError),
    #[error("job serialization failed: {0}")]
    Serialization(String),
    #[error("job store error: {0}")]
    Storage(StorageError),
}

impl JobError {
    pub fn class(&self) -> ErrorClass {
        match self {
            JobError::InvalidImportSpec(_) | JobError::InvalidMetric { .. } => {
                ErrorClass::BadRequest
            }
            JobError::Creation(_) | JobError::Serialization(_) | JobError::Storage(_) => {
                ErrorClass::Internal
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JobError::Storage(err) if err.is_not_found())
    }
}
