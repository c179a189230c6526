//! Thread-safe document collection
//!
//! DashMap-backed storage with an optional unique secondary index. Documents
//! are cloned out on read so no shard lock escapes this module.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::models::{AppError, AppResult};

/// A persisted entity
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human-readable collection name (used in error messages)
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;

    /// Value that must be unique across the collection
    fn unique_key(&self) -> Option<String> {
        None
    }
}

pub struct Collection<T: Document> {
    docs: DashMap<Uuid, T>,
    /// unique key -> id
    index: DashMap<String, Uuid>,
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> Collection<T> {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            index: DashMap::new(),
        }
    }

    /// Insert a new document, rejecting duplicate unique keys
    pub fn insert(&self, doc: T) -> AppResult<T> {
        let id = doc.id();
        if self.docs.contains_key(&id) {
            return Err(AppError::conflict(format!(
                "{} {} already exists",
                T::COLLECTION,
                id
            )));
        }

        if let Some(key) = doc.unique_key() {
            match self.index.entry(key) {
                Entry::Occupied(e) => {
                    return Err(AppError::conflict(format!(
                        "{} with key '{}' already exists",
                        T::COLLECTION,
                        e.key()
                    )));
                }
                Entry::Vacant(e) => {
                    e.insert(id);
                }
            }
        }

        self.docs.insert(id, doc.clone());
        Ok(doc)
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.docs.get(id).map(|d| d.value().clone())
    }

    /// Fetch or fail with NOT_FOUND
    pub fn require(&self, id: &Uuid) -> AppResult<T> {
        self.get(id)
            .ok_or_else(|| AppError::not_found(format!("{} {} not found", T::COLLECTION, id)))
    }

    pub fn find_by_key(&self, key: &str) -> Option<T> {
        let id = *self.index.get(key)?;
        self.get(&id)
    }

    pub fn key_exists(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Mutate a document in place.
    ///
    /// The closure works on a copy; nothing is written when it fails. A
    /// changed unique key is re-indexed, failing with CONFLICT when taken.
    pub fn update<F>(&self, id: &Uuid, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut T) -> AppResult<()>,
    {
        let mut entry = self
            .docs
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("{} {} not found", T::COLLECTION, id)))?;

        let mut next = entry.value().clone();
        f(&mut next)?;
        if next.id() != *id {
            return Err(AppError::internal(format!(
                "{} id cannot change on update",
                T::COLLECTION
            )));
        }

        let old_key = entry.value().unique_key();
        let new_key = next.unique_key();
        if old_key != new_key {
            if let Some(key) = &new_key {
                match self.index.entry(key.clone()) {
                    Entry::Occupied(e) => {
                        return Err(AppError::conflict(format!(
                            "{} with key '{}' already exists",
                            T::COLLECTION,
                            e.key()
                        )));
                    }
                    Entry::Vacant(e) => {
                        e.insert(*id);
                    }
                }
            }
            if let Some(key) = old_key {
                self.index.remove(&key);
            }
        }

        *entry.value_mut() = next.clone();
        Ok(next)
    }

    pub fn remove(&self, id: &Uuid) -> Option<T> {
        let (_, doc) = self.docs.remove(id)?;
        if let Some(key) = doc.unique_key() {
            self.index.remove(&key);
        }
        Some(doc)
    }

    pub fn list(&self) -> Vec<T> {
        self.docs.iter().map(|d| d.value().clone()).collect()
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.docs
            .iter()
            .filter(|d| predicate(d.value()))
            .map(|d| d.value().clone())
            .collect()
    }

    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&T) -> bool,
    {
        self.docs.iter().filter(|d| predicate(d.value())).count()
    }

    pub fn any<P>(&self, predicate: P) -> bool
    where
        P: Fn(&T) -> bool,
    {
        self.docs.iter().any(|d| predicate(d.value()))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
