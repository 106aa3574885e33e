//! Insertion-ordered, type-keyed service storage.

use crate::service::Service;
use std::any::{Any, TypeId};
use std::sync::Arc;

pub(crate) struct RegisteredService {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub service: Arc<dyn Service>,
    instance: Arc<dyn Any + Send + Sync>,
}

impl RegisteredService {
    pub fn new<T: Service>(service: Arc<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            service: Arc::clone(&service) as Arc<dyn Service>,
            instance: service as Arc<dyn Any + Send + Sync>,
        }
    }
}

/// At most one service per concrete type, kept in registration order.
#[derive(Default)]
pub(crate) struct ServiceRegistry {
    entries: Vec<RegisteredService>,
}

impl ServiceRegistry {
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.entries.iter().any(|entry| entry.type_id == type_id)
    }

    pub fn push(&mut self, entry: RegisteredService) {
        self.entries.push(entry);
    }

    /// Inserts `entry` at `index`, ahead of later registrations.
    pub fn insert(&mut self, index: usize, entry: RegisteredService) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    pub fn get<T: Service>(&self) -> Option<Arc<T>> {
        let type_id = TypeId::of::<T>();
        self.entries
            .iter()
            .find(|entry| entry.type_id == type_id)
            .and_then(|entry| Arc::clone(&entry.instance).downcast::<T>().ok())
    }

    /// Services in registration order, for use outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn Service>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.service))
            .collect()
    }

    pub fn drain(&mut self) -> Vec<RegisteredService> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
