use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportField {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "featureId")]
    pub feature_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSchema {
    #[serde(default)]
    pub fields: Vec<ImportField>,
    #[serde(default, rename = "timestampColumn", skip_serializing_if = "Option::is_none")]
    pub timestamp_column: Option<String>,
    #[serde(default, rename = "entityIdColumn", skip_serializing_if = "Option::is_none")]
    pub entity_id_column: Option<String>,
}

/// The document an ingestion invocation is started from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSpec {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub schema: ImportSchema,
}

impl ImportSpec {
    pub fn entity_names(&self) -> Vec<String> {
        let mut names = self.entities.clone();
        names.sort();
        names.dedup();
        names
    }

    /// Feature ids of every schema field that carries one.
    pub fn feature_ids(&self) -> Vec<String> {
        let mut ids = self
            .schema
            .fields
            .iter()
            .filter(|field| !field.feature_id.is_empty())
            .map(|field| field.feature_id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn options_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.options)
    }

    pub fn raw_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Unknown,
    Pending,
    Running,
    Completed,
    Aborting,
    Aborted,
    Error,
    Suspending,
    Suspended,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Unknown => "UNKNOWN",
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Aborting => "ABORTING",
            JobStatus::Aborted => "ABORTED",
            JobStatus::Error => "ERROR",
            JobStatus::Suspending => "SUSPENDING",
            JobStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Aborted | JobStatus::Error
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase();
        match normalized.as_str() {
            "UNKNOWN" => Ok(JobStatus::Unknown),
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "ABORTING" => Ok(JobStatus::Aborting),
            "ABORTED" => Ok(JobStatus::Aborted),
            "ERROR" => Ok(JobStatus::Error),
            "SUSPENDING" => Ok(JobStatus::Suspending),
            "SUSPENDED" => Ok(JobStatus::Suspended),
            other => Err(format!("Unknown job status: {other}")),
        }
    }
}

/// What job creation does with entities and features nobody registered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderPolicy {
    /// Insert a bare record by name and associate it.
    #[default]
    AutoCreate,
    /// Fail the job creation.
    Reject,
}

/// Flattened, read-only view of a job handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDetail {
    pub id: String,
    pub ext_id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub runner: String,
    pub status: String,
    pub entities: Vec<String>,
    pub features: Vec<String>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub ts: DateTime<Utc>,
}

/// Internal job name for an ingestion invocation: `<type>-<yyyyMMddHHmmss>-<8 hex>`.
pub fn generate_job_id(source_type: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let source = source_type.trim().to_lowercase();
    let source: &str = if source.is_empty() { "job" } else { &source };
    format!("{source}-{}-{}", now.format("%Y%m%d%H%M%S"), &suffix[..8])
}
