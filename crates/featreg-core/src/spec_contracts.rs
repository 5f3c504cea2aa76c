use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The four kinds of spec the registry stores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpecKind {
    Entity,
    Feature,
    FeatureGroup,
    Storage,
}

impl SpecKind {
    pub const ALL: [SpecKind; 4] = [
        SpecKind::Entity,
        SpecKind::Feature,
        SpecKind::FeatureGroup,
        SpecKind::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecKind::Entity => "entity",
            SpecKind::Feature => "feature",
            SpecKind::FeatureGroup => "feature_group",
            SpecKind::Storage => "storage",
        }
    }
}

impl fmt::Display for SpecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A spec document that can be stored under a canonical id.
pub trait RegistrySpec: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync {
    const KIND: SpecKind;

    /// Canonical id the record is keyed by.
    fn registry_id(&self) -> String;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    #[default]
    Unknown,
    Bytes,
    String,
    Int32,
    Int64,
    Double,
    Float,
    Bool,
    Timestamp,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Unknown => "UNKNOWN",
            ValueType::Bytes => "BYTES",
            ValueType::String => "STRING",
            ValueType::Int32 => "INT32",
            ValueType::Int64 => "INT64",
            ValueType::Double => "DOUBLE",
            ValueType::Float => "FLOAT",
            ValueType::Bool => "BOOL",
            ValueType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase();
        match normalized.as_str() {
            "UNKNOWN" => Ok(ValueType::Unknown),
            "BYTES" => Ok(ValueType::Bytes),
            "STRING" => Ok(ValueType::String),
            "INT32" => Ok(ValueType::Int32),
            "INT64" => Ok(ValueType::Int64),
            "DOUBLE" => Ok(ValueType::Double),
            "FLOAT" => Ok(ValueType::Float),
            "BOOL" => Ok(ValueType::Bool),
            "TIMESTAMP" => Ok(ValueType::Timestamp),
            other => Err(format!("Unknown value type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataStore {
    pub id: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Where a feature is served from and where its history is warehoused.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataStores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving: Option<DataStore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<DataStore>,
}

impl DataStores {
    pub fn storage_ids(&self) -> Vec<&str> {
        self.serving
            .iter()
            .chain(self.warehouse.iter())
            .map(|store| store.id.as_str())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntitySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EntitySpec {
    /// Bare record created when a job names an entity nobody registered.
    pub fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl RegistrySpec for EntitySpec {
    const KIND: SpecKind = SpecKind::Entity;

    fn registry_id(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureSpec {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub entity: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, rename = "valueType")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default, rename = "dataStores")]
    pub data_stores: DataStores,
}

impl FeatureSpec {
    /// Bare record created when a job names a feature nobody registered.
    ///
    /// The owning entity and name are recovered from the `<entity>.<name>` id when possible.
    pub fn placeholder(id: &str) -> Self {
        let (entity, name) = id.split_once('.').unwrap_or(("", id));
        Self {
            id: id.to_string(),
            name: name.to_string(),
            entity: entity.to_string(),
            ..Self::default()
        }
    }
}

impl RegistrySpec for FeatureSpec {
    const KIND: SpecKind = SpecKind::Feature;

    fn registry_id(&self) -> String {
        format!("{}.{}", self.entity, self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureGroupSpec {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "dataStores")]
    pub data_stores: DataStores,
}

impl RegistrySpec for FeatureGroupSpec {
    const KIND: SpecKind = SpecKind::FeatureGroup;

    fn registry_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub storage_type: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl RegistrySpec for StorageSpec {
    const KIND: SpecKind = SpecKind::Storage;

    fn registry_id(&self) -> String {
        self.id.clone()
    }
}
