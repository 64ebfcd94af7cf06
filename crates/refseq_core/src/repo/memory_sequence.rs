//! Process-local sequence store.
//!
//! Counters are plain atomics behind a read/write-locked map: increments only
//! take the shared lock, so distinct names never contend with each other.
//! Creation and deletion take the exclusive lock.

use crate::repo::sequence_repo::{validate_name, SequenceError, SequenceResult, SequenceStore};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type CounterMap = HashMap<String, Arc<AtomicI64>>;

/// Non-durable `SequenceStore` for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    counters: RwLock<CounterMap>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map_or(0, |counters| counters.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> SequenceResult<RwLockReadGuard<'_, CounterMap>> {
        self.counters
            .read()
            .map_err(|_| SequenceError::Unavailable("counter map lock poisoned".to_string()))
    }

    fn write(&self) -> SequenceResult<RwLockWriteGuard<'_, CounterMap>> {
        self.counters
            .write()
            .map_err(|_| SequenceError::Unavailable("counter map lock poisoned".to_string()))
    }

    fn counter(&self, name: &str) -> SequenceResult<Arc<AtomicI64>> {
        self.read()?
            .get(name)
            .cloned()
            .ok_or_else(|| SequenceError::NotFound(name.to_string()))
    }
}

impl SequenceStore for InMemorySequenceStore {
    fn exists(&self, name: &str) -> SequenceResult<bool> {
        Ok(self.read()?.contains_key(name))
    }

    fn create(&self, name: &str) -> SequenceResult<()> {
        validate_name(name)?;
        match self.write()?.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SequenceError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(AtomicI64::new(0)));
                Ok(())
            }
        }
    }

    fn next_value(&self, name: &str) -> SequenceResult<i64> {
        let counter = self.counter(name)?;
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
                value.checked_add(1)
            })
            .map(|previous| previous + 1)
            .map_err(|_| SequenceError::Exhausted(name.to_string()))
    }

    fn delete(&self, name: &str) -> SequenceResult<()> {
        self.write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SequenceError::NotFound(name.to_string()))
    }

    fn current_value(&self, name: &str) -> SequenceResult<Option<i64>> {
        Ok(self
            .read()?
            .get(name)
            .map(|counter| counter.load(Ordering::Acquire)))
    }

    fn advance_to(&self, name: &str, floor: i64) -> SequenceResult<i64> {
        let counter = self.counter(name)?;
        let previous = counter.fetch_max(floor, Ordering::AcqRel);
        Ok(previous.max(floor))
    }
}

#[cfg(test)]
mod tests {
    use super::InMemorySequenceStore;
    use crate::repo::sequence_repo::{SequenceError, SequenceStore};
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn lifecycle_matches_store_contract() {
        let store = InMemorySequenceStore::new();
        assert!(!store.exists("a").unwrap());
        store.create("a").unwrap();
        assert!(store.exists("a").unwrap());
        assert_eq!(store.next_value("a").unwrap(), 1);

        store.delete("a").unwrap();
        assert!(matches!(
            store.next_value("a"),
            Err(SequenceError::NotFound(_))
        ));
        assert!(matches!(store.delete("a"), Err(SequenceError::NotFound(_))));
    }

    #[test]
    fn exhausted_counter_keeps_its_value() {
        let store = InMemorySequenceStore::new();
        store.create("a").unwrap();
        store.advance_to("a", i64::MAX).unwrap();

        for _ in 0..2 {
            assert!(matches!(
                store.next_value("a"),
                Err(SequenceError::Exhausted(name)) if name == "a"
            ));
        }
        assert_eq!(store.current_value("a").unwrap(), Some(i64::MAX));
    }

    #[test]
    fn concurrent_increments_never_repeat() {
        let store = InMemorySequenceStore::new();
        store.create("shared").unwrap();

        let values: Vec<i64> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..250)
                            .map(|_| store.next_value("shared").unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        let unique: HashSet<i64> = values.iter().copied().collect();
        assert_eq!(unique.len(), 2000);
        assert_eq!(values.iter().max(), Some(&2000));
        assert_eq!(store.current_value("shared").unwrap(), Some(2000));
    }
}
