use crate::RegistryError;
use featreg_core::{
    DataStores, EntitySpec, FeatureGroupSpec, FeatureSpec, RegistrySpec, SpecKind, SpecValidator,
    StorageSpec, Validate, ValidationError,
};
use featreg_storage::SpecStore;
use std::sync::Arc;
use tracing::info;

/// Write path for specs: validate, check references, upsert.
///
/// Re-registering an id replaces the stored spec; the last writer wins.
pub struct SpecRegistry {
    store: Arc<SpecStore>,
    validator: Arc<dyn SpecValidator>,
}

impl SpecRegistry {
    pub fn new(store: Arc<SpecStore>, validator: Arc<dyn SpecValidator>) -> Self {
        Self { store, validator }
    }

    pub fn register_entity(&self, spec: EntitySpec) -> Result<String, RegistryError> {
        spec.validate_with(self.validator.as_ref())?;
        self.persist(&spec)
    }

    pub fn register_feature(&self, mut spec: FeatureSpec) -> Result<String, RegistryError> {
        spec.validate_with(self.validator.as_ref())?;

        let id = spec.registry_id();
        self.require(SpecKind::Entity, &spec.entity, &id)?;
        if let Some(group) = spec.group.as_deref() {
            self.require(SpecKind::FeatureGroup, group, &id)?;
        }
        self.require_storage(&spec.data_stores, &id)?;

        spec.id = id;
        self.persist(&spec)
    }

    pub fn register_feature_group(&self, spec: FeatureGroupSpec) -> Result<String, RegistryError> {
        spec.validate_with(self.validator.as_ref())?;
        self.require_storage(&spec.data_stores, &spec.id)?;
        self.persist(&spec)
    }

    pub fn register_storage(&self, spec: StorageSpec) -> Result<String, RegistryError> {
        spec.validate_with(self.validator.as_ref())?;
        self.persist(&spec)
    }

    fn persist<S: RegistrySpec>(&self, spec: &S) -> Result<String, RegistryError> {
        let stored = self.store.put_spec(spec)?;
        let replaced = stored.created_at != stored.last_updated;
        info!(kind = %S::KIND, id = %stored.id, replaced, "spec registered");
        Ok(stored.id)
    }

    fn require(&self, kind: SpecKind, id: &str, referenced_by: &str) -> Result<(), RegistryError> {
        if self.store.spec_exists(kind, id)? {
            return Ok(());
        }
        Err(ValidationError::UnknownReference {
            kind,
            id: id.to_string(),
            referenced_by: referenced_by.to_string(),
        }
        .into())
    }

    fn require_storage(
        &self,
        stores: &DataStores,
        referenced_by: &str,
    ) -> Result<(), RegistryError> {
        for storage_id in stores.storage_ids() {
            self.require(SpecKind::Storage, storage_id, referenced_by)?;
        }
        Ok(())
    }
}
