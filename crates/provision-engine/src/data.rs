//! Typed repository
//!
//! Pairs the persistence controller with the object registry so the rest
//! of the engine reads and writes domain types, never raw documents.
//! Callers run [`Data::ensure_connected`] once at the start of each request.

use object_store::{PersistController, document_version};
use provision_model::{Persist, Registry};
use tracing::debug;

use crate::error::EngineError;

#[derive(Debug)]
pub struct Data {
    persist: PersistController,
    registry: Registry,
}

impl Data {
    pub fn new(persist: PersistController, registry: Registry) -> Self {
        Self { persist, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Check-and-reconnect; `NoConnection` aborts the request
    pub async fn ensure_connected(&self) -> Result<(), EngineError> {
        Ok(self.persist.ensure_connected().await?)
    }

    pub async fn fetch_all<T: Persist>(&self) -> Result<Vec<T>, EngineError> {
        let docs = self.persist.store().get_all(T::COLLECTION).await?;
        docs.into_iter()
            .map(|doc| Ok(self.registry.hydrate::<T>(doc)?))
            .collect()
    }

    pub async fn fetch<T: Persist>(&self, uuid: &str) -> Result<Option<T>, EngineError> {
        match self.persist.store().get_by_uuid(T::COLLECTION, uuid).await? {
            Some(doc) => Ok(Some(self.registry.hydrate::<T>(doc)?)),
            None => Ok(None),
        }
    }

    /// Like `fetch`, but a missing object is `InvalidUuid`
    pub async fn get<T: Persist>(&self, uuid: &str) -> Result<T, EngineError> {
        self.fetch(uuid).await?.ok_or_else(|| {
            EngineError::InvalidUuid(format!("Cannot find {} with UUID [{uuid}]", T::COLLECTION))
        })
    }

    /// Writes `object` with compare-and-swap on its version and stores the
    /// new version back into it
    pub async fn persist<T: Persist>(&self, object: &mut T) -> Result<(), EngineError> {
        let doc = self.registry.to_document(object)?;
        let stored = self
            .persist
            .store()
            .put(T::COLLECTION, object.uuid(), doc)
            .await?;
        let version = document_version(&stored);
        debug!("Persisted {}/{} at version {}", T::COLLECTION, object.uuid(), version);
        object.set_version(version);
        Ok(())
    }

    pub async fn remove<T: Persist>(&self, uuid: &str) -> Result<bool, EngineError> {
        Ok(self.persist.store().remove(T::COLLECTION, uuid).await?)
    }

    pub async fn remove_all<T: Persist>(&self) -> Result<bool, EngineError> {
        Ok(self.persist.store().remove_all(T::COLLECTION).await?)
    }
}
