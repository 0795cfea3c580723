use crate::codec;
use crate::errors::{AppError, AppResult};
use crate::file_store::Storage;
use crate::ids;
use crate::models::{accept_version, now_seconds, require_name, Mutation};
use crate::reorder::Reorderable;
use crate::transaction::{apply_and_persist, Persist};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRecord<'a> {
    version: &'a str,
    name: &'a str,
    #[serde(rename = "ID")]
    id: &'a str,
    num_items: usize,
    items: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredList {
    version: String,
    name: String,
    #[serde(rename = "ID")]
    id: String,
    num_items: usize,
    items: Vec<String>,
}

/// A named, ordered collection of item IDs. `numItems` is written from
/// `items.len()` so the two cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List {
    version: String,
    name: String,
    id: String,
    items: Vec<String>,
}

impl List {
    /// Allocates a list file name and writes the empty list.
    pub fn create(storage: &dyn Storage, app_version: &str, name: &str) -> AppResult<Self> {
        require_name(name, "list")?;
        let list = ids::claim(storage, ids::LIST_PREFIX, now_seconds(), |id| Self {
            version: app_version.to_string(),
            name: name.to_string(),
            id,
            items: Vec::new(),
        })?;
        tracing::debug!(list_id = %list.id, "created list");
        Ok(list)
    }

    pub fn load(storage: &dyn Storage, app_version: &str, id: &str) -> AppResult<Self> {
        if id.trim().is_empty() {
            return Err(AppError::InputInvalid("empty list ID".to_string()));
        }
        let content = storage.read(id)?;
        let list = Self::decode(&content, app_version)?;
        if list.id != id {
            return Err(AppError::Corrupted(format!("file '{}' holds list '{}'", id, list.id)));
        }
        Ok(list)
    }

    pub fn decode(input: &str, app_version: &str) -> AppResult<Self> {
        let value = serde_json::Value::Object(codec::decode_object(input)?);
        let stored: StoredList = codec::decode_as(&value, "list")?;
        if stored.num_items != stored.items.len() {
            return Err(AppError::Corrupted(format!(
                "list {} claims {} items but holds {}",
                stored.id,
                stored.num_items,
                stored.items.len()
            )));
        }
        Ok(Self {
            version: accept_version(&stored.version, app_version)?,
            name: stored.name,
            id: stored.id,
            items: stored.items,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn position_of(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|id| id == item_id)
    }

    pub fn rename(&mut self, storage: &dyn Storage, name: &str) -> AppResult<Mutation> {
        require_name(name, "list")?;
        if self.name == name {
            return Ok(Mutation::Unchanged);
        }
        apply_and_persist(self, storage, |list| {
            list.name = name.to_string();
            Ok(())
        })?;
        tracing::debug!(list_id = %self.id, "renamed list");
        Ok(Mutation::Applied)
    }

    /// Adds `item_id` at the front or the back and returns its index.
    pub fn insert_item(&mut self, storage: &dyn Storage, item_id: &str, at_front: bool) -> AppResult<usize> {
        if item_id.trim().is_empty() {
            return Err(AppError::InputInvalid("empty item ID".to_string()));
        }
        let index = apply_and_persist(self, storage, |list| {
            if at_front {
                list.items.insert(0, item_id.to_string());
                Ok(0)
            } else {
                list.items.push(item_id.to_string());
                Ok(list.items.len() - 1)
            }
        })?;
        tracing::debug!(list_id = %self.id, item_id = %item_id, index, "added item to list");
        Ok(index)
    }

    pub fn remove_item(&mut self, storage: &dyn Storage, index: usize) -> AppResult<String> {
        AppError::check_index(index, self.items.len())?;
        let removed = apply_and_persist(self, storage, |list| {
            AppError::check_index(index, list.items.len())?;
            Ok(list.items.remove(index))
        })?;
        tracing::debug!(list_id = %self.id, item_id = %removed, index, "removed item from list");
        Ok(removed)
    }

    /// In-memory swap used while dragging; persist with [`Persist::save`].
    pub fn exchange_items(&mut self, src: usize, dst: usize) -> AppResult<()> {
        AppError::check_index(src, self.items.len())?;
        AppError::check_index(dst, self.items.len())?;
        self.items.swap(src, dst);
        Ok(())
    }
}

impl Persist for List {
    fn file_name(&self) -> &str {
        &self.id
    }

    fn encode(&self) -> AppResult<String> {
        codec::encode(&ListRecord {
            version: &self.version,
            name: &self.name,
            id: &self.id,
            num_items: self.items.len(),
            items: &self.items,
        })
    }
}

impl Reorderable for List {
    fn row_count(&self) -> usize {
        self.items.len()
    }

    fn exchange_rows(&mut self, a: usize, b: usize) -> AppResult<()> {
        self.exchange_items(a, b)
    }
}
