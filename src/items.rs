use crate::errors::{AppError, AppResult};
use crate::file_store::Storage;
use crate::ids;
use crate::item::{new_details, Item};
use crate::models::{now_seconds, ItemType, NewItem};

/// Allocates an ID for `item_type`, builds an empty item and writes it.
pub fn create_item(
    storage: &dyn Storage,
    app_version: &str,
    item_type: ItemType,
    fields: NewItem,
) -> AppResult<Item> {
    fields.validate()?;
    let item = ids::claim(storage, &ids::item_prefix(item_type), now_seconds(), |id| {
        Item::new(item_type, new_details(id, app_version, fields.clone()))
    })?;
    tracing::debug!(item_id = %item.id(), item_type = item_type.as_str(), "created item");
    Ok(item)
}

pub fn load_item(storage: &dyn Storage, app_version: &str, id: &str) -> AppResult<Item> {
    ids::validate_item_id(id)?;
    let content = storage.read(id)?;
    let item_type = get_item_type(id)
        .ok_or_else(|| AppError::Corrupted(format!("item '{}' has an unknown type tag", id)))?;
    let item = Item::decode(item_type, &content, app_version)?;
    if item.id() != id {
        return Err(AppError::Corrupted(format!(
            "file '{}' holds item '{}'",
            id,
            item.id()
        )));
    }
    Ok(item)
}

/// Best-effort removal of an item file.
pub fn delete_item(storage: &dyn Storage, id: &str) -> bool {
    let deleted = storage.delete(id);
    if deleted {
        tracing::debug!(item_id = %id, "deleted item");
    } else {
        tracing::warn!(item_id = %id, "failed to delete item");
    }
    deleted
}

pub fn get_item_type(id: &str) -> Option<ItemType> {
    ids::item_type_of(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::FileStore;

    const VERSION: &str = "2.0";

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().expect("temp root");
        let store = FileStore::new(dir.path()).expect("store");
        (dir, store)
    }

    #[test]
    fn counter_ids_carry_tag_one() {
        let (_dir, store) = temp_store();
        let item = create_item(&store, VERSION, ItemType::Counter, NewItem::named("Push-ups")).expect("create");
        assert_eq!(item.id().chars().nth(4), Some('1'));
        assert_eq!(get_item_type(item.id()), Some(ItemType::Counter));
        assert!(store.exists(item.id()));
    }

    #[test]
    fn created_items_reload_equal() {
        let (_dir, store) = temp_store();
        for item_type in ItemType::ALL {
            let item = create_item(&store, VERSION, item_type, NewItem::named("x")).expect("create");
            let loaded = load_item(&store, VERSION, item.id()).expect("load");
            assert_eq!(loaded, item);
        }
    }

    #[test]
    fn same_second_items_get_distinct_ids() {
        let (_dir, store) = temp_store();
        let first = create_item(&store, VERSION, ItemType::Sum, NewItem::named("a")).expect("create");
        let second = create_item(&store, VERSION, ItemType::Sum, NewItem::named("b")).expect("create");
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn load_failures_are_distinct() {
        let (_dir, store) = temp_store();
        assert!(matches!(load_item(&store, VERSION, ""), Err(AppError::InputInvalid(_))));
        assert!(matches!(
            load_item(&store, VERSION, "item001.json"),
            Err(AppError::NotFound(_))
        ));

        store.create("item901.json", "{}", false).expect("write");
        assert!(matches!(
            load_item(&store, VERSION, "item901.json"),
            Err(AppError::Corrupted(_))
        ));

        store.create("item001.json", "{\"name\":", false).expect("write");
        assert!(matches!(
            load_item(&store, VERSION, "item001.json"),
            Err(AppError::Corrupted(_))
        ));
    }

    #[test]
    fn mismatched_tag_and_payload_fails() {
        let (_dir, store) = temp_store();
        let sum = create_item(&store, VERSION, ItemType::Sum, NewItem::named("a")).expect("create");
        let content = store.read(sum.id()).expect("read");
        store.create("item101.json", &content, false).expect("write");
        assert!(load_item(&store, VERSION, "item101.json").is_err());
    }

    #[test]
    fn blank_names_are_invalid() {
        let (_dir, store) = temp_store();
        let error = create_item(&store, VERSION, ItemType::Journal, NewItem::named("")).expect_err("blank");
        assert!(matches!(error, AppError::InputInvalid(_)));
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn delete_is_best_effort() {
        let (_dir, store) = temp_store();
        let item = create_item(&store, VERSION, ItemType::Sum, NewItem::named("a")).expect("create");
        assert!(delete_item(&store, item.id()));
        assert!(!delete_item(&store, item.id()));
    }
}
