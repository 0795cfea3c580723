use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per entity file name. Holding the guard is the right to
/// mutate that entity; two requests for the same file serialize, different
/// files proceed in parallel.
#[derive(Clone, Default)]
pub struct EntityLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, entity_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(entity_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops the lock entry of a deleted entity unless someone still holds
    /// or waits on it.
    pub async fn forget(&self, entity_id: &str) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(entity_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(entity_id);
            }
        }
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_entity_serializes() {
        let locks = EntityLocks::new();
        let guard = locks.acquire("item001.json").await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.acquire("item001.json").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.expect("second holder");
    }

    #[tokio::test]
    async fn different_entities_do_not_block() {
        let locks = EntityLocks::new();
        let _first = locks.acquire("list01.json").await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("list11.json")).await;
        assert!(second.is_ok());
        assert_eq!(locks.tracked().await, 2);
    }

    #[tokio::test]
    async fn forget_keeps_held_locks() {
        let locks = EntityLocks::new();
        let guard = locks.acquire("item001.json").await;
        locks.forget("item001.json").await;
        assert_eq!(locks.tracked().await, 1);
        drop(guard);
        locks.forget("item001.json").await;
        assert_eq!(locks.tracked().await, 0);
    }
}
