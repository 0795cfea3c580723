use crate::config::TrackerConfig;
use crate::errors::{AppError, AppResult};
use crate::file_store::{FileStore, Storage};
use crate::item::{Item, ItemOp};
use crate::items;
use crate::list::List;
use crate::lists::Lists;
use crate::locks::EntityLocks;
use crate::models::{ItemType, ListInfo, Mutation, NewItem};
use crate::reorder::ReorderSession;
use crate::transaction::Persist;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entry point for the UI shell.
///
/// The `Lists` aggregate sits behind its own mutex; list and item files are
/// guarded by [`EntityLocks`]. Locks are taken in the order aggregate, list,
/// item, and file I/O always runs on the blocking pool.
#[derive(Clone)]
pub struct TrackerService {
    storage: Arc<dyn Storage>,
    config: TrackerConfig,
    lists: Arc<Mutex<Lists>>,
    locks: EntityLocks,
}

async fn blocking<T, F>(task: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await?
}

impl TrackerService {
    /// Opens the data directory named by `config`, creating `lists.json`
    /// on first launch.
    pub async fn open(config: TrackerConfig) -> AppResult<Self> {
        let root = config.data_dir.clone();
        let store = blocking(move || FileStore::new(root)).await?;
        Self::with_storage(Arc::new(store), config).await
    }

    pub async fn with_storage(storage: Arc<dyn Storage>, config: TrackerConfig) -> AppResult<Self> {
        let loader = storage.clone();
        let version = config.app_version.clone();
        let lists = blocking(move || Lists::load_or_create(loader.as_ref(), &version)).await?;
        if lists.is_corrupted() {
            tracing::error!("lists cache could not be built; mutations are blocked until resync");
        }
        Ok(Self {
            storage,
            config,
            lists: Arc::new(Mutex::new(lists)),
            locks: EntityLocks::new(),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Re-reads `lists.json` and rebuilds the cache from the list files.
    pub async fn load_lists(&self) -> AppResult<Lists> {
        let mut current = self.lists.clone().lock_owned().await;
        let storage = self.storage.clone();
        let version = self.config.app_version.clone();
        let loaded = blocking(move || Lists::load(storage.as_ref(), &version)).await?;
        *current = loaded.clone();
        Ok(loaded)
    }

    /// Copy of the in-memory aggregate, without I/O.
    pub async fn lists_snapshot(&self) -> Lists {
        self.lists.lock().await.clone()
    }

    pub async fn load_list(&self, list_id: &str) -> AppResult<List> {
        let _guard = self.locks.acquire(list_id).await;
        let storage = self.storage.clone();
        let version = self.config.app_version.clone();
        let list_id = list_id.to_string();
        blocking(move || List::load(storage.as_ref(), &version, &list_id)).await
    }

    pub async fn load_item(&self, item_id: &str) -> AppResult<Item> {
        let _guard = self.locks.acquire(item_id).await;
        let storage = self.storage.clone();
        let version = self.config.app_version.clone();
        let item_id = item_id.to_string();
        blocking(move || items::load_item(storage.as_ref(), &version, &item_id)).await
    }

    /// Adds a list at the configured end and returns its index.
    pub async fn create_list(&self, name: &str) -> AppResult<usize> {
        let mut lists = self.lists.clone().lock_owned().await;
        let storage = self.storage.clone();
        let name = name.to_string();
        let at_front = self.config.add_new_list_top;
        let index = blocking(move || lists.insert_list(storage.as_ref(), &name, at_front)).await?;
        tracing::info!(index, "created list");
        Ok(index)
    }

    pub async fn rename_list(&self, index: usize, name: &str) -> AppResult<Mutation> {
        let lists = self.lists.clone().lock_owned().await;
        let list_id = lists
            .list_ids()
            .get(index)
            .cloned()
            .ok_or(AppError::IndexOutOfRange { index, len: lists.len() })?;
        let _list_guard = self.locks.acquire(&list_id).await;
        let storage = self.storage.clone();
        let name = name.to_string();
        let mut lists = lists;
        blocking(move || lists.rename_list(storage.as_ref(), index, &name)).await
    }

    /// Creates an item and attaches it to `list_id`. If the list cannot be
    /// updated the new item file is removed again.
    pub async fn create_item(&self, list_id: &str, item_type: ItemType, fields: NewItem) -> AppResult<Item> {
        let mut lists = self.lists.lock().await;
        let _list_guard = self.locks.acquire(list_id).await;
        let storage = self.storage.clone();
        let version = self.config.app_version.clone();
        let owner = list_id.to_string();
        let at_front = self.config.add_new_item_top;
        let (item, num_items) = blocking(move || {
            let storage = storage.as_ref();
            let mut list = List::load(storage, &version, &owner)?;
            let item = items::create_item(storage, &version, item_type, fields)?;
            if let Err(error) = list.insert_item(storage, item.id(), at_front) {
                items::delete_item(storage, item.id());
                tracing::warn!(
                    list_id = %owner,
                    item_id = %item.id(),
                    error = %error,
                    "item creation rolled back"
                );
                return Err(error);
            }
            Ok((item, list.num_items()))
        })
        .await?;

        record_item_count(&mut lists, list_id, num_items);
        tracing::info!(list_id = %list_id, item_id = %item.id(), "created item");
        Ok(item)
    }

    /// Applies `op` to the caller's copy of an item. On failure `item` is
    /// left exactly as it was; once the item file is deleted the copy can
    /// no longer be saved and the call is `NotFound`.
    pub async fn mutate_item(&self, item: &mut Item, op: ItemOp) -> AppResult<Mutation> {
        let _guard = self.locks.acquire(item.id()).await;
        let storage = self.storage.clone();
        let mut working = item.clone();
        let (working, outcome) = blocking(move || {
            if !storage.exists(working.id()) {
                return Err(AppError::NotFound(format!("item '{}' was deleted", working.id())));
            }
            let outcome = working.apply(storage.as_ref(), op);
            Ok((working, outcome))
        })
        .await?;
        *item = working;
        outcome
    }

    /// Loads the item under its lock and applies `op`, so concurrent callers
    /// never work on stale copies.
    pub async fn mutate_item_by_id(&self, item_id: &str, op: ItemOp) -> AppResult<(Item, Mutation)> {
        let _guard = self.locks.acquire(item_id).await;
        let storage = self.storage.clone();
        let version = self.config.app_version.clone();
        let item_id = item_id.to_string();
        blocking(move || {
            let storage = storage.as_ref();
            let mut item = items::load_item(storage, &version, &item_id)?;
            let outcome = item.apply(storage, op)?;
            Ok((item, outcome))
        })
        .await
    }

    /// Detaches `item_id` from its list and removes the item file. Returns
    /// the list's new item count.
    pub async fn delete_item(&self, list_id: &str, item_id: &str) -> AppResult<usize> {
        let mut lists = self.lists.lock().await;
        let num_items = {
            let _list_guard = self.locks.acquire(list_id).await;
            let _item_guard = self.locks.acquire(item_id).await;
            let storage = self.storage.clone();
            let version = self.config.app_version.clone();
            let owner = list_id.to_string();
            let doomed = item_id.to_string();
            blocking(move || {
                let storage = storage.as_ref();
                let mut list = List::load(storage, &version, &owner)?;
                let index = list
                    .position_of(&doomed)
                    .ok_or_else(|| AppError::NotFound(format!("item {} is not in list {}", doomed, owner)))?;
                list.remove_item(storage, index)?;
                items::delete_item(storage, &doomed);
                Ok(list.num_items())
            })
            .await?
        };
        record_item_count(&mut lists, list_id, num_items);
        self.locks.forget(item_id).await;
        Ok(num_items)
    }

    /// Removes the list at `index` with all of its items. Returns how many
    /// items it held.
    pub async fn delete_list(&self, index: usize) -> AppResult<usize> {
        let lists = self.lists.clone().lock_owned().await;
        let list_id = lists
            .list_ids()
            .get(index)
            .cloned()
            .ok_or(AppError::IndexOutOfRange { index, len: lists.len() })?;
        let (num_items, item_ids) = {
            let _list_guard = self.locks.acquire(&list_id).await;
            let item_ids = self.item_ids_of(vec![list_id.clone()]).await?;
            let _item_guards = self.acquire_all(&item_ids).await;
            let storage = self.storage.clone();
            let mut lists = lists;
            let num_items = blocking(move || lists.delete_list(storage.as_ref(), index)).await?;
            (num_items, item_ids)
        };
        self.forget_all(&item_ids).await;
        self.locks.forget(&list_id).await;
        tracing::info!(list_id = %list_id, num_items, "deleted list");
        Ok(num_items)
    }

    pub async fn delete_all(&self) -> AppResult<()> {
        let mut lists = self.lists.clone().lock_owned().await;
        let list_ids = lists.list_ids().to_vec();
        let item_ids = {
            let _list_guards = self.acquire_all(&list_ids).await;
            let item_ids = self.item_ids_of(list_ids.clone()).await?;
            let _item_guards = self.acquire_all(&item_ids).await;
            let storage = self.storage.clone();
            blocking(move || lists.delete_all(storage.as_ref())).await?;
            item_ids
        };
        self.forget_all(&item_ids).await;
        self.forget_all(&list_ids).await;
        tracing::info!("deleted all content");
        Ok(())
    }

    /// In-memory swap of two lists; follow with [`Self::commit_list_order`].
    pub async fn reorder_lists(&self, src: usize, dst: usize) -> AppResult<()> {
        self.lists.lock().await.exchange_lists(src, dst)
    }

    pub async fn commit_list_order(&self) -> AppResult<()> {
        let lists = self.lists.clone().lock_owned().await;
        let storage = self.storage.clone();
        blocking(move || lists.save(storage.as_ref())).await
    }

    /// Moves the item at `src` to `dst` inside one list and saves once.
    pub async fn reorder_item_within_list(&self, list_id: &str, src: usize, dst: usize) -> AppResult<Mutation> {
        let _guard = self.locks.acquire(list_id).await;
        let storage = self.storage.clone();
        let version = self.config.app_version.clone();
        let list_id = list_id.to_string();
        blocking(move || {
            let storage = storage.as_ref();
            let mut list = List::load(storage, &version, &list_id)?;
            let mut session = ReorderSession::begin(src, list.num_items())?;
            session.move_to(dst, &mut list)?;
            session.finish(&mut list, storage)
        })
        .await
    }

    pub async fn cached_summary(&self, index: usize) -> AppResult<ListInfo> {
        let lists = self.lists.lock().await;
        if lists.is_corrupted() {
            return Err(AppError::Corrupted("lists cache is missing".to_string()));
        }
        lists
            .summary(index)
            .cloned()
            .ok_or(AppError::IndexOutOfRange { index, len: lists.len() })
    }

    pub async fn cached_total(&self) -> AppResult<usize> {
        self.lists
            .lock()
            .await
            .total_items()
            .ok_or_else(|| AppError::Corrupted("lists cache is missing".to_string()))
    }

    /// Rebuilds the cache from disk, dropping lists that cannot be read.
    pub async fn resync_cache(&self) -> AppResult<usize> {
        let mut lists = self.lists.clone().lock_owned().await;
        let storage = self.storage.clone();
        blocking(move || lists.resync(storage.as_ref())).await
    }

    /// Item IDs referenced by `list_ids`. Unreadable lists contribute none;
    /// their items stay on disk anyway.
    async fn item_ids_of(&self, list_ids: Vec<String>) -> AppResult<Vec<String>> {
        let storage = self.storage.clone();
        let version = self.config.app_version.clone();
        blocking(move || {
            let mut item_ids = Vec::new();
            for list_id in &list_ids {
                if let Ok(list) = List::load(storage.as_ref(), &version, list_id) {
                    item_ids.extend(list.items().iter().cloned());
                }
            }
            Ok(item_ids)
        })
        .await
    }

    /// Locks several entities of one kind in sorted order.
    async fn acquire_all(&self, entity_ids: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&String> = entity_ids.iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for entity_id in sorted {
            guards.push(self.locks.acquire(entity_id).await);
        }
        guards
    }

    async fn forget_all(&self, entity_ids: &[String]) {
        for entity_id in entity_ids {
            self.locks.forget(entity_id).await;
        }
    }
}

/// Writes a list's item count into the cache. Callers hold the aggregate
/// lock across the list update, so counts land in the order they were made.
fn record_item_count(lists: &mut Lists, list_id: &str, num_items: usize) {
    match lists.find(list_id) {
        Some(index) => lists.item_count_changed(index, num_items),
        None => tracing::warn!(list_id = %list_id, "item count changed for unregistered list"),
    }
}
