use crate::codec;
use crate::errors::{AppError, AppResult};
use crate::file_store::Storage;
use crate::ids;
use crate::items;
use crate::list::List;
use crate::models::{ListInfo, Mutation};
use crate::reorder::Reorderable;
use crate::transaction::{apply_and_persist, Persist};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

pub const LISTS_FILE: &str = "lists.json";

/// In-memory projection of every list's name and item count, index-aligned
/// with the list IDs. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListsCache {
    pub num_items_all: usize,
    pub lists: Vec<ListInfo>,
}

impl ListsCache {
    fn insert(&mut self, index: usize, info: ListInfo) {
        self.num_items_all += info.num_items;
        self.lists.insert(index, info);
    }

    fn remove(&mut self, index: usize) -> ListInfo {
        let info = self.lists.remove(index);
        self.num_items_all = self.num_items_all.saturating_sub(info.num_items);
        info
    }
}

/// The ordered list IDs stored in `lists.json` plus their cache.
///
/// A `None` cache means it could not be built from the list files; every
/// mutation except [`Lists::delete_all`] and [`Lists::resync`] is then
/// refused as corrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lists {
    app_version: String,
    lists_data: Vec<String>,
    cache: Option<ListsCache>,
}

impl Lists {
    pub fn new(app_version: &str) -> Self {
        Self {
            app_version: app_version.to_string(),
            lists_data: Vec::new(),
            cache: Some(ListsCache::default()),
        }
    }

    /// Reads `lists.json` and scans every list file once to build the cache.
    pub fn load(storage: &dyn Storage, app_version: &str) -> AppResult<Self> {
        let content = storage.read(LISTS_FILE)?;
        let lists_data = decode_ids(&content)?;
        let cache = match build_cache(storage, app_version, &lists_data) {
            Ok(cache) => Some(cache),
            Err(error) => {
                tracing::error!(error = %error, lists = lists_data.len(), "failed to build lists cache");
                None
            }
        };
        tracing::info!(lists = lists_data.len(), corrupted = cache.is_none(), "loaded lists");
        Ok(Self {
            app_version: app_version.to_string(),
            lists_data,
            cache,
        })
    }

    /// First launch writes an empty `lists.json`.
    pub fn load_or_create(storage: &dyn Storage, app_version: &str) -> AppResult<Self> {
        if storage.exists(LISTS_FILE) {
            return Self::load(storage, app_version);
        }
        let lists = Self::new(app_version);
        lists.save(storage)?;
        tracing::info!("created empty lists file");
        Ok(lists)
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    pub fn list_ids(&self) -> &[String] {
        &self.lists_data
    }

    pub fn len(&self) -> usize {
        self.lists_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists_data.is_empty()
    }

    pub fn cache(&self) -> Option<&ListsCache> {
        self.cache.as_ref()
    }

    pub fn is_corrupted(&self) -> bool {
        self.cache.is_none()
    }

    pub fn find(&self, list_id: &str) -> Option<usize> {
        self.lists_data.iter().position(|id| id == list_id)
    }

    pub fn summary(&self, index: usize) -> Option<&ListInfo> {
        self.cache.as_ref()?.lists.get(index)
    }

    pub fn list_num_items(&self, index: usize) -> Option<usize> {
        self.summary(index).map(|info| info.num_items)
    }

    pub fn total_items(&self) -> Option<usize> {
        self.cache.as_ref().map(|cache| cache.num_items_all)
    }

    fn require_cache(&self) -> AppResult<&ListsCache> {
        self.cache
            .as_ref()
            .ok_or_else(|| AppError::Corrupted("lists cache is missing; resync or reset first".to_string()))
    }

    fn cache_mut(&mut self) -> AppResult<&mut ListsCache> {
        self.cache
            .as_mut()
            .ok_or_else(|| AppError::Corrupted("lists cache is missing; resync or reset first".to_string()))
    }

    /// Creates a list file and registers it at the front or the back.
    /// Any failure after the file exists removes it again.
    pub fn insert_list(&mut self, storage: &dyn Storage, name: &str, at_front: bool) -> AppResult<usize> {
        self.require_cache()?;
        let list = List::create(storage, &self.app_version, name)?;
        let app_version = self.app_version.clone();

        let inserted = apply_and_persist(self, storage, |lists| {
            let index = if at_front { 0 } else { lists.lists_data.len() };
            lists.lists_data.insert(index, list.id().to_string());
            let stored = List::load(storage, &app_version, list.id())?;
            lists.cache_mut()?.insert(
                index,
                ListInfo {
                    name: stored.name().to_string(),
                    num_items: stored.num_items(),
                },
            );
            Ok(index)
        });

        match inserted {
            Ok(index) => {
                tracing::debug!(list_id = %list.id(), index, "inserted list");
                Ok(index)
            }
            Err(error) => {
                storage.delete(list.id());
                tracing::warn!(list_id = %list.id(), error = %error, "insert list rolled back");
                Err(error)
            }
        }
    }

    /// Unregisters the list at `index`, then removes its item files and its
    /// own file. Returns how many items the list held.
    pub fn delete_list(&mut self, storage: &dyn Storage, index: usize) -> AppResult<usize> {
        self.require_cache()?;
        AppError::check_index(index, self.lists_data.len())?;
        let list_id = self.lists_data[index].clone();

        let removed = apply_and_persist(self, storage, |lists| {
            lists.lists_data.remove(index);
            Ok(lists.cache_mut()?.remove(index))
        })?;

        purge_list_files(storage, &self.app_version, &list_id);
        tracing::debug!(list_id = %list_id, index, num_items = removed.num_items, "deleted list");
        Ok(removed.num_items)
    }

    pub fn rename_list(&mut self, storage: &dyn Storage, index: usize, name: &str) -> AppResult<Mutation> {
        self.require_cache()?;
        AppError::check_index(index, self.lists_data.len())?;
        let mut list = List::load(storage, &self.app_version, &self.lists_data[index])?;
        let outcome = list.rename(storage, name)?;
        self.cache_mut()?.lists[index].name = list.name().to_string();
        Ok(outcome)
    }

    /// Records a list's new item count in the cache. Never touches disk
    /// and never fails; a stale index is only logged.
    pub fn item_count_changed(&mut self, index: usize, num_items: usize) {
        let Some(cache) = self.cache.as_mut() else {
            tracing::warn!(index, "lists cache missing, item count not recorded");
            return;
        };
        let Some(info) = cache.lists.get_mut(index) else {
            tracing::warn!(index, "item count change for unknown list index");
            return;
        };
        cache.num_items_all = cache.num_items_all.saturating_sub(info.num_items) + num_items;
        info.num_items = num_items;
    }

    /// Swaps two lists in memory. Persist the final order with
    /// [`Persist::save`] once the drag ends.
    pub fn exchange_lists(&mut self, src: usize, dst: usize) -> AppResult<()> {
        let len = self.lists_data.len();
        AppError::check_index(src, len)?;
        AppError::check_index(dst, len)?;
        let cache = self.cache_mut()?;
        cache.lists.swap(src, dst);
        self.lists_data.swap(src, dst);
        Ok(())
    }

    /// Empties `lists.json` first, then removes every list and item file.
    /// Also the way out of a corrupted cache.
    pub fn delete_all(&mut self, storage: &dyn Storage) -> AppResult<()> {
        let doomed = self.lists_data.clone();
        apply_and_persist(self, storage, |lists| {
            lists.lists_data.clear();
            lists.cache = Some(ListsCache::default());
            Ok(())
        })?;

        for list_id in &doomed {
            purge_list_files(storage, &self.app_version, list_id);
        }
        tracing::info!(lists = doomed.len(), "cleared all lists");
        Ok(())
    }

    /// Rebuilds the cache from the list files. Lists whose file cannot be
    /// loaded are dropped from `lists.json`; returns how many were dropped.
    pub fn resync(&mut self, storage: &dyn Storage) -> AppResult<usize> {
        let mut kept = Vec::with_capacity(self.lists_data.len());
        let mut cache = ListsCache::default();
        for list_id in &self.lists_data {
            match List::load(storage, &self.app_version, list_id) {
                Ok(list) => {
                    cache.insert(
                        cache.lists.len(),
                        ListInfo {
                            name: list.name().to_string(),
                            num_items: list.num_items(),
                        },
                    );
                    kept.push(list_id.clone());
                }
                Err(error) => {
                    tracing::warn!(list_id = %list_id, error = %error, "dropping unreadable list");
                }
            }
        }

        let dropped = self.lists_data.len() - kept.len();
        if dropped > 0 {
            apply_and_persist(self, storage, |lists| {
                lists.lists_data = kept;
                Ok(())
            })?;
        }
        self.cache = Some(cache);
        tracing::info!(lists = self.lists_data.len(), dropped, "resynced lists cache");
        Ok(dropped)
    }

    /// Entity files on disk that no list references.
    pub fn orphans(&self, storage: &dyn Storage) -> AppResult<Vec<String>> {
        let mut referenced: HashSet<String> = self.lists_data.iter().cloned().collect();
        for list_id in &self.lists_data {
            let list = List::load(storage, &self.app_version, list_id)?;
            referenced.extend(list.items().iter().cloned());
        }
        Ok(storage
            .list()?
            .into_iter()
            .filter(|name| ids::is_entity_file(name) && !referenced.contains(name))
            .collect())
    }
}

impl Persist for Lists {
    fn file_name(&self) -> &str {
        LISTS_FILE
    }

    fn encode(&self) -> AppResult<String> {
        codec::encode(&self.lists_data)
    }
}

impl Reorderable for Lists {
    fn row_count(&self) -> usize {
        self.lists_data.len()
    }

    fn exchange_rows(&mut self, a: usize, b: usize) -> AppResult<()> {
        self.exchange_lists(a, b)
    }
}

fn decode_ids(content: &str) -> AppResult<Vec<String>> {
    codec::decode_array(content)?
        .into_iter()
        .map(|value| match value {
            Value::String(id) => Ok(id),
            other => Err(AppError::Corrupted(format!("list ID {} is not a string", other))),
        })
        .collect()
}

fn build_cache(storage: &dyn Storage, app_version: &str, lists_data: &[String]) -> AppResult<ListsCache> {
    let mut cache = ListsCache::default();
    for list_id in lists_data {
        let list = List::load(storage, app_version, list_id)?;
        cache.insert(
            cache.lists.len(),
            ListInfo {
                name: list.name().to_string(),
                num_items: list.num_items(),
            },
        );
    }
    Ok(cache)
}

/// Best-effort removal of a list's item files and then the list file.
fn purge_list_files(storage: &dyn Storage, app_version: &str, list_id: &str) {
    match List::load(storage, app_version, list_id) {
        Ok(list) => {
            for item_id in list.items() {
                items::delete_item(storage, item_id);
            }
        }
        Err(error) => {
            tracing::warn!(list_id = %list_id, error = %error, "cannot read list, its items stay on disk");
        }
    }
    if !storage.delete(list_id) {
        tracing::warn!(list_id = %list_id, "failed to delete list file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::test_support::FlakyStore;
    use crate::models::{ItemType, NewItem};

    const VERSION: &str = "1.0";

    fn fresh() -> (tempfile::TempDir, FlakyStore, Lists) {
        let dir = tempfile::tempdir().expect("temp root");
        let store = FlakyStore::new(dir.path());
        let lists = Lists::load_or_create(&store, VERSION).expect("lists");
        (dir, store, lists)
    }

    fn add_items(store: &FlakyStore, lists: &mut Lists, index: usize, count: usize) -> Vec<String> {
        let mut list = List::load(store, VERSION, &lists.list_ids()[index]).expect("list");
        let mut created = Vec::new();
        for n in 0..count {
            let item = items::create_item(store, VERSION, ItemType::Counter, NewItem::named(format!("c{}", n)))
                .expect("item");
            list.insert_item(store, item.id(), false).expect("attach");
            created.push(item.id().to_string());
        }
        lists.item_count_changed(index, list.num_items());
        created
    }

    fn assert_aligned(lists: &Lists) {
        let cache = lists.cache().expect("cache");
        assert_eq!(cache.lists.len(), lists.list_ids().len());
        assert_eq!(
            cache.num_items_all,
            cache.lists.iter().map(|info| info.num_items).sum::<usize>()
        );
    }

    #[test]
    fn first_load_creates_empty_file() {
        let (_dir, store, lists) = fresh();
        assert!(store.exists(LISTS_FILE));
        assert_eq!(store.read(LISTS_FILE).expect("file"), "[]");
        assert_eq!(lists.total_items(), Some(0));

        let empty_dir = tempfile::tempdir().expect("temp root");
        let empty = FlakyStore::new(empty_dir.path());
        assert!(matches!(Lists::load(&empty, VERSION), Err(AppError::NotFound(_))));
    }

    #[test]
    fn insert_respects_position_and_keeps_alignment() {
        let (_dir, store, mut lists) = fresh();
        assert_eq!(lists.insert_list(&store, "A", false).expect("insert"), 0);
        assert_eq!(lists.insert_list(&store, "B", false).expect("insert"), 1);
        assert_eq!(lists.insert_list(&store, "C", true).expect("insert"), 0);

        let names: Vec<&str> = lists.cache().expect("cache").lists.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
        assert_aligned(&lists);

        let reloaded = Lists::load(&store, VERSION).expect("reload");
        assert_eq!(reloaded, lists);
    }

    #[test]
    fn failed_insert_leaves_no_trace() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        let before = lists.clone();
        let files_before = store.list().expect("files");

        store.fail_writes(true);
        assert!(lists.insert_list(&store, "B", true).is_err());
        assert_eq!(lists, before);
        assert_eq!(store.list().expect("files"), files_before);
        assert!(matches!(lists.insert_list(&store, " ", true), Err(AppError::InputInvalid(_))));
    }

    #[test]
    fn delete_list_removes_files_and_counts() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        lists.insert_list(&store, "B", false).expect("insert");
        let item_ids = add_items(&store, &mut lists, 0, 3);
        add_items(&store, &mut lists, 1, 1);
        assert_eq!(lists.total_items(), Some(4));
        let list_id = lists.list_ids()[0].clone();

        assert_eq!(lists.delete_list(&store, 0).expect("delete"), 3);
        assert_eq!(lists.total_items(), Some(1));
        assert!(!store.exists(&list_id));
        assert!(item_ids.iter().all(|id| !store.exists(id)));
        assert_eq!(lists.summary(0).map(|info| info.name.as_str()), Some("B"));
        assert_aligned(&lists);

        assert!(matches!(lists.delete_list(&store, 5), Err(AppError::IndexOutOfRange { .. })));
    }

    #[test]
    fn failed_delete_keeps_everything() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        let before = lists.clone();
        store.fail_writes(true);
        assert!(lists.delete_list(&store, 0).is_err());
        assert_eq!(lists, before);
        assert!(store.exists(&lists.list_ids()[0]));
    }

    #[test]
    fn rename_updates_cache_name_only() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        add_items(&store, &mut lists, 0, 2);
        assert_eq!(lists.rename_list(&store, 0, "Renamed").expect("rename"), Mutation::Applied);
        assert_eq!(lists.summary(0).expect("info").name, "Renamed");
        assert_eq!(lists.total_items(), Some(2));
        let list = List::load(&store, VERSION, &lists.list_ids()[0]).expect("list");
        assert_eq!(list.name(), "Renamed");
    }

    #[test]
    fn exchange_moves_ids_and_cache_together() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        lists.insert_list(&store, "B", false).expect("insert");
        add_items(&store, &mut lists, 1, 2);
        let ids = lists.list_ids().to_vec();

        lists.exchange_lists(0, 1).expect("swap");
        assert_eq!(lists.list_ids(), &[ids[1].clone(), ids[0].clone()]);
        assert_eq!(lists.list_num_items(0), Some(2));
        assert_eq!(lists.summary(1).expect("info").name, "A");
        assert!(lists.exchange_lists(0, 2).is_err());

        assert_eq!(decode_ids(&store.read(LISTS_FILE).expect("file")).expect("ids"), ids);
        lists.save(&store).expect("commit");
        assert_eq!(Lists::load(&store, VERSION).expect("reload"), lists);
    }

    #[test]
    fn item_count_changes_adjust_total() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        lists.insert_list(&store, "B", false).expect("insert");
        lists.item_count_changed(0, 4);
        lists.item_count_changed(1, 2);
        lists.item_count_changed(0, 1);
        lists.item_count_changed(9, 100);
        assert_eq!(lists.total_items(), Some(3));
        assert_eq!(lists.list_num_items(0), Some(1));
    }

    #[test]
    fn missing_list_file_marks_cache_corrupted() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        lists.insert_list(&store, "B", false).expect("insert");
        let lost = lists.list_ids()[0].clone();
        store.delete(&lost);

        let mut reloaded = Lists::load(&store, VERSION).expect("load");
        assert!(reloaded.is_corrupted());
        assert_eq!(reloaded.total_items(), None);
        assert_eq!(reloaded.list_num_items(0), None);
        let error = reloaded.insert_list(&store, "C", false).expect_err("refused");
        assert!(error.blocks_mutation());
        assert!(reloaded.exchange_lists(0, 1).is_err());

        assert_eq!(reloaded.resync(&store).expect("resync"), 1);
        assert!(!reloaded.is_corrupted());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.summary(0).expect("info").name, "B");
        assert_eq!(Lists::load(&store, VERSION).expect("reload").len(), 1);
    }

    #[test]
    fn delete_all_resets_even_when_corrupted() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        let items = add_items(&store, &mut lists, 0, 2);
        lists.cache = None;

        lists.delete_all(&store).expect("delete all");
        assert!(lists.is_empty());
        assert_eq!(lists.total_items(), Some(0));
        assert_eq!(store.list().expect("files"), vec![LISTS_FILE.to_string()]);
        assert!(items.iter().all(|id| !store.exists(id)));
    }

    #[test]
    fn malformed_lists_file_is_corrupted() {
        let (_dir, store, _lists) = fresh();
        store.create(LISTS_FILE, "[1,2,3", true).expect("write");
        assert!(matches!(Lists::load(&store, VERSION), Err(AppError::Corrupted(_))));
        store.create(LISTS_FILE, "[1]", true).expect("write");
        assert!(matches!(Lists::load(&store, VERSION), Err(AppError::Corrupted(_))));
    }

    #[test]
    fn orphans_are_unreferenced_entity_files() {
        let (_dir, store, mut lists) = fresh();
        lists.insert_list(&store, "A", false).expect("insert");
        add_items(&store, &mut lists, 0, 1);
        let stray = items::create_item(&store, VERSION, ItemType::Sum, NewItem::named("stray")).expect("item");
        assert_eq!(lists.orphans(&store).expect("orphans"), vec![stray.id().to_string()]);
    }
}
