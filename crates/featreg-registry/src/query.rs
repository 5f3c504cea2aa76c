use crate::RetrievalError;
use featreg_core::{EntitySpec, FeatureGroupSpec, FeatureSpec, RegistrySpec, StorageSpec};
use featreg_storage::SpecStore;
use std::sync::Arc;

/// Read-only view over stored specs.
///
/// `get_*` is all or nothing: one missing id fails the whole request.
pub struct QueryFacade {
    store: Arc<SpecStore>,
}

impl QueryFacade {
    pub fn new(store: Arc<SpecStore>) -> Self {
        Self { store }
    }

    pub fn get_entities(&self, ids: &[String]) -> Result<Vec<EntitySpec>, RetrievalError> {
        self.get(ids)
    }

    pub fn list_entities(&self) -> Result<Vec<EntitySpec>, RetrievalError> {
        self.list()
    }

    pub fn get_features(&self, ids: &[String]) -> Result<Vec<FeatureSpec>, RetrievalError> {
        self.get(ids)
    }

    // TODO: page through features once catalogs outgrow a single response.
    pub fn list_features(&self) -> Result<Vec<FeatureSpec>, RetrievalError> {
        self.list()
    }

    pub fn get_feature_groups(
        &self,
        ids: &[String],
    ) -> Result<Vec<FeatureGroupSpec>, RetrievalError> {
        self.get(ids)
    }

    pub fn list_feature_groups(&self) -> Result<Vec<FeatureGroupSpec>, RetrievalError> {
        self.list()
    }

    pub fn get_storage(&self, ids: &[String]) -> Result<Vec<StorageSpec>, RetrievalError> {
        self.get(ids)
    }

    pub fn list_storage(&self) -> Result<Vec<StorageSpec>, RetrievalError> {
        self.list()
    }

    fn get<S: RegistrySpec>(&self, ids: &[String]) -> Result<Vec<S>, RetrievalError> {
        Ok(self
            .store
            .get_specs::<S>(ids)?
            .into_iter()
            .map(|stored| stored.spec)
            .collect())
    }

    fn list<S: RegistrySpec>(&self) -> Result<Vec<S>, RetrievalError> {
        Ok(self
            .store
            .list_specs::<S>()?
            .into_iter()
            .map(|stored| stored.spec)
            .collect())
    }
}
