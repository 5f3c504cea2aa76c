use crate::job_contracts::ImportSpec;
use crate::spec_contracts::{
    DataStores, EntitySpec, FeatureGroupSpec, FeatureSpec, SpecKind, StorageSpec, ValueType,
};
use regex::Regex;
use thiserror::Error;

const NAME_PATTERN: &str = r"^[a-z][a-z0-9_]*$";
const STORAGE_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_\-]*$";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} spec field `{field}` cannot be empty")]
    EmptyField {
        kind: SpecKind,
        field: &'static str,
    },
    #[error("{kind} spec field `{field}` has invalid value {value:?}: must match {pattern}")]
    InvalidName {
        kind: SpecKind,
        field: &'static str,
        value: String,
        pattern: &'static str,
    },
    #[error("feature id {found:?} does not match <entity>.<name> ({expected:?})")]
    IdMismatch { expected: String, found: String },
    #[error("feature {id} must declare a value type")]
    UnknownValueType { id: String },
    #[error("{kind} {id:?} referenced by {referenced_by} is not registered")]
    UnknownReference {
        kind: SpecKind,
        id: String,
        referenced_by: String,
    },
    #[error("import spec must declare a source type")]
    MissingImportType,
    #[error("import field {field:?} has malformed feature id {feature_id:?}")]
    MalformedImportFeature { field: String, feature_id: String },
}

/// Structural checks run before anything is persisted.
///
/// Implementations must not consult the store; reference checks are the registry's job.
pub trait SpecValidator: Send + Sync {
    fn validate_entity_spec(&self, spec: &EntitySpec) -> Result<(), ValidationError>;
    fn validate_feature_spec(&self, spec: &FeatureSpec) -> Result<(), ValidationError>;
    fn validate_feature_group_spec(&self, spec: &FeatureGroupSpec) -> Result<(), ValidationError>;
    fn validate_storage_spec(&self, spec: &StorageSpec) -> Result<(), ValidationError>;
    fn validate_import_spec(&self, spec: &ImportSpec) -> Result<(), ValidationError>;
}

/// Routes a spec to the matching [`SpecValidator`] method.
pub trait Validate {
    fn validate_with<V: SpecValidator + ?Sized>(&self, validator: &V)
        -> Result<(), ValidationError>;
}

impl Validate for EntitySpec {
    fn validate_with<V: SpecValidator + ?Sized>(
        &self,
        validator: &V,
    ) -> Result<(), ValidationError> {
        validator.validate_entity_spec(self)
    }
}

impl Validate for FeatureSpec {
    fn validate_with<V: SpecValidator + ?Sized>(
        &self,
        validator: &V,
    ) -> Result<(), ValidationError> {
        validator.validate_feature_spec(self)
    }
}

impl Validate for FeatureGroupSpec {
    fn validate_with<V: SpecValidator + ?Sized>(
        &self,
        validator: &V,
    ) -> Result<(), ValidationError> {
        validator.validate_feature_group_spec(self)
    }
}

impl Validate for StorageSpec {
    fn validate_with<V: SpecValidator + ?Sized>(
        &self,
        validator: &V,
    ) -> Result<(), ValidationError> {
        validator.validate_storage_spec(self)
    }
}

pub struct DefaultSpecValidator {
    name: Regex,
    storage_id: Regex,
}

impl Default for DefaultSpecValidator {
    fn default() -> Self {
        Self {
            name: Regex::new(NAME_PATTERN).expect("valid regex"),
            storage_id: Regex::new(STORAGE_ID_PATTERN).expect("valid regex"),
        }
    }
}

impl DefaultSpecValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_name(
        &self,
        kind: SpecKind,
        field: &'static str,
        value: &str,
    ) -> Result<(), ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::EmptyField { kind, field });
        }
        if !self.name.is_match(value) {
            return Err(ValidationError::InvalidName {
                kind,
                field,
                value: value.to_string(),
                pattern: NAME_PATTERN,
            });
        }
        Ok(())
    }

    fn check_data_stores(
        &self,
        kind: SpecKind,
        stores: &DataStores,
    ) -> Result<(), ValidationError> {
        for store in stores.serving.iter().chain(stores.warehouse.iter()) {
            if store.id.is_empty() {
                return Err(ValidationError::EmptyField {
                    kind,
                    field: "dataStores.id",
                });
            }
        }
        Ok(())
    }
}

impl SpecValidator for DefaultSpecValidator {
    fn validate_entity_spec(&self, spec: &EntitySpec) -> Result<(), ValidationError> {
        self.check_name(SpecKind::Entity, "name", &spec.name)
    }

    fn validate_feature_spec(&self, spec: &FeatureSpec) -> Result<(), ValidationError> {
        self.check_name(SpecKind::Feature, "entity", &spec.entity)?;
        self.check_name(SpecKind::Feature, "name", &spec.name)?;

        let expected = format!("{}.{}", spec.entity, spec.name);
        if !spec.id.is_empty() && spec.id != expected {
            return Err(ValidationError::IdMismatch {
                expected,
                found: spec.id.clone(),
            });
        }
        if spec.value_type == ValueType::Unknown {
            return Err(ValidationError::UnknownValueType { id: expected });
        }
        if let Some(group) = spec.group.as_deref() {
            self.check_name(SpecKind::Feature, "group", group)?;
        }
        self.check_data_stores(SpecKind::Feature, &spec.data_stores)
    }

    fn validate_feature_group_spec(&self, spec: &FeatureGroupSpec) -> Result<(), ValidationError> {
        self.check_name(SpecKind::FeatureGroup, "id", &spec.id)?;
        self.check_data_stores(SpecKind::FeatureGroup, &spec.data_stores)
    }

    fn validate_storage_spec(&self, spec: &StorageSpec) -> Result<(), ValidationError> {
        if spec.id.is_empty() {
            return Err(ValidationError::EmptyField {
                kind: SpecKind::Storage,
                field: "id",
            });
        }
        if !self.storage_id.is_match(&spec.id) {
            return Err(ValidationError::InvalidName {
                kind: SpecKind::Storage,
                field: "id",
                value: spec.id.clone(),
                pattern: STORAGE_ID_PATTERN,
            });
        }
        if spec.storage_type.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                kind: SpecKind::Storage,
                field: "type",
            });
        }
        Ok(())
    }

    fn validate_import_spec(&self, spec: &ImportSpec) -> Result<(), ValidationError> {
        if spec.source_type.trim().is_empty() {
            return Err(ValidationError::MissingImportType);
        }
        for entity in &spec.entities {
            self.check_name(SpecKind::Entity, "entities", entity)?;
        }
        for field in &spec.schema.fields {
            if field.feature_id.is_empty() {
                continue;
            }
            let well_formed = field
                .feature_id
                .split_once('.')
                .is_some_and(|(entity, name)| {
                    self.name.is_match(entity) && self.name.is_match(name)
                });
            if !well_formed {
                return Err(ValidationError::MalformedImportFeature {
                    field: field.name.clone(),
                    feature_id: field.feature_id.clone(),
                });
            }
        }
        Ok(())
    }
}
