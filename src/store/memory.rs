use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use super::{Collection, Document, DocumentStore, Fields, Query, StoreError};

/// In-process document store. One `DashMap` per collection.
pub struct MemoryStore {
    services: DashMap<Ulid, Fields>,
    resources: DashMap<Ulid, Fields>,
    bookings: DashMap<Ulid, Fields>,
    special_days: DashMap<Ulid, Fields>,
    offline: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            resources: DashMap::new(),
            bookings: DashMap::new(),
            special_days: DashMap::new(),
            offline: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with `Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        self.table(collection).len()
    }

    fn table(&self, collection: Collection) -> &DashMap<Ulid, Fields> {
        match collection {
            Collection::Services => &self.services,
            Collection::ServiceResources => &self.resources,
            Collection::Bookings => &self.bookings,
            Collection::SpecialDays => &self.special_days,
        }
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_documents(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_online()?;
        let docs = self
            .table(collection)
            .iter()
            .filter(|e| query.matches(e.value()))
            .map(|e| Document {
                id: *e.key(),
                fields: e.value().clone(),
            })
            .collect();
        Ok(query.finish(docs))
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: Ulid,
    ) -> Result<Option<Document>, StoreError> {
        self.check_online()?;
        Ok(self.table(collection).get(&id).map(|e| Document {
            id,
            fields: e.value().clone(),
        }))
    }

    async fn create_document(
        &self,
        collection: Collection,
        id: Ulid,
        body: Fields,
    ) -> Result<Document, StoreError> {
        self.check_online()?;
        match self.table(collection).entry(id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists { collection, id }),
            Entry::Vacant(slot) => {
                slot.insert(body.clone());
                Ok(Document { id, fields: body })
            }
        }
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: Ulid,
        patch: Fields,
    ) -> Result<Document, StoreError> {
        self.check_online()?;
        let mut entry = self
            .table(collection)
            .get_mut(&id)
            .ok_or(StoreError::NotFound { collection, id })?;
        for (k, v) in patch {
            entry.insert(k, v);
        }
        Ok(Document {
            id,
            fields: entry.value().clone(),
        })
    }

    async fn delete_document(&self, collection: Collection, id: Ulid) -> Result<(), StoreError> {
        self.check_online()?;
        self.table(collection)
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { collection, id })
    }
}
