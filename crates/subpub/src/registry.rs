//! # Subject Registry
//!
//! Subject name → subscribers. A subject exists only while it has at least
//! one subscriber, so the map never accumulates empty entries.
//!
//! One reader-writer lock guards the whole map: publish snapshots share the
//! read side, while subscribe, unsubscribe and close take the write side.
//! Nothing is ever delivered while the lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::subscriber::SubscriptionId;

type Subscribers<T> = HashMap<SubscriptionId, Arc<T>>;

pub(crate) struct SubjectRegistry<T> {
    subjects: RwLock<HashMap<String, Subscribers<T>>>,
}

impl<T> SubjectRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            subjects: RwLock::new(HashMap::new()),
        }
    }

    /// Insert the entry produced by `make` under the write lock.
    ///
    /// `make` runs while the lock is held, so admission checks inside it are
    /// atomic with respect to [`SubjectRegistry::drain`]. Nothing is inserted
    /// when it fails.
    pub(crate) fn register_with<E>(
        &self,
        subject: &str,
        id: SubscriptionId,
        make: impl FnOnce() -> Result<Arc<T>, E>,
    ) -> Result<Arc<T>, E> {
        let mut subjects = self.subjects.write();
        let entry = make()?;
        subjects
            .entry(subject.to_string())
            .or_default()
            .insert(id, Arc::clone(&entry));
        Ok(entry)
    }

    #[cfg(test)]
    pub(crate) fn register(&self, subject: &str, id: SubscriptionId, entry: Arc<T>) {
        let _ = self.register_with::<std::convert::Infallible>(subject, id, || Ok(entry));
    }

    /// Remove one subscriber, dropping the subject once it is empty.
    pub(crate) fn deregister(&self, subject: &str, id: SubscriptionId) -> Option<Arc<T>> {
        let mut subjects = self.subjects.write();
        let subscribers = subjects.get_mut(subject)?;
        let removed = subscribers.remove(&id);
        if subscribers.is_empty() {
            subjects.remove(subject);
        }
        removed
    }

    /// Current subscribers of `subject`; empty when the subject is absent.
    pub(crate) fn snapshot(&self, subject: &str) -> Vec<Arc<T>> {
        self.subjects
            .read()
            .get(subject)
            .map(|subscribers| subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Take every subscriber, leaving the registry empty.
    pub(crate) fn drain(&self) -> Vec<Arc<T>> {
        let subjects = std::mem::take(&mut *self.subjects.write());
        subjects
            .into_values()
            .flat_map(HashMap::into_values)
            .collect()
    }

    pub(crate) fn subject_count(&self) -> usize {
        self.subjects.read().len()
    }

    pub(crate) fn subscriber_count(&self, subject: &str) -> usize {
        self.subjects.read().get(subject).map_or(0, HashMap::len)
    }

    pub(crate) fn contains(&self, subject: &str, id: SubscriptionId) -> bool {
        self.subjects
            .read()
            .get(subject)
            .is_some_and(|subscribers| subscribers.contains_key(&id))
    }
}
