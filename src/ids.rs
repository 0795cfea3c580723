use crate::errors::{AppError, AppResult};
use crate::file_store::Storage;
use crate::models::ItemType;
use crate::transaction::Persist;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub const ITEM_PREFIX: &str = "item";
pub const LIST_PREFIX: &str = "list";
pub const FILE_EXT: &str = ".json";

/// Offset of the type digit inside an item ID.
pub const ITEM_TAG_OFFSET: usize = ITEM_PREFIX.len();

const MAX_ATTEMPTS: u8 = 10;

static ENTITY_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(item[0-9]|list)[0-9]-?[0-9]+\.json$").expect("valid regex"));

/// Writes the entity `build` makes for the first free
/// `<prefix><seq><epoch>.json` name, trying sequence digits 0 through 9.
///
/// A name is taken only when the no-overwrite write is refused and the file
/// is there, so two callers racing for one name never both get it.
pub fn claim<T, F>(storage: &dyn Storage, prefix: &str, now: DateTime<Utc>, mut build: F) -> AppResult<T>
where
    T: Persist,
    F: FnMut(String) -> T,
{
    let stamp = now.timestamp();
    for seq in 0..MAX_ATTEMPTS {
        let entity = build(format!("{}{}{}{}", prefix, seq, stamp, FILE_EXT));
        match storage.create(entity.file_name(), &entity.encode()?, false) {
            Ok(()) => return Ok(entity),
            Err(_) if storage.exists(entity.file_name()) => {
                tracing::debug!(file = %entity.file_name(), "file name taken, trying next sequence");
            }
            Err(error) => return Err(error),
        }
    }
    tracing::warn!(prefix = %prefix, stamp, "no free file name after {} attempts", MAX_ATTEMPTS);
    Err(AppError::IdExhausted(format!(
        "{} IDs for timestamp {} are all taken",
        prefix, stamp
    )))
}

pub fn item_prefix(item_type: ItemType) -> String {
    format!("{}{}", ITEM_PREFIX, item_type.tag())
}

/// Reads the type digit of an item ID. Pure string inspection.
pub fn item_type_of(id: &str) -> Option<ItemType> {
    if !id.starts_with(ITEM_PREFIX) {
        return None;
    }
    id.chars().nth(ITEM_TAG_OFFSET).and_then(ItemType::from_tag)
}

/// True for names produced by [`claim`] for lists or items.
pub fn is_entity_file(name: &str) -> bool {
    ENTITY_FILE.is_match(name)
}

/// Shape check done before any I/O on an item ID.
pub fn validate_item_id(id: &str) -> AppResult<()> {
    if id.trim().is_empty() || id.len() <= ITEM_TAG_OFFSET + 1 {
        return Err(AppError::InputInvalid(format!("bad item ID '{}'", id)));
    }
    if !id.starts_with(ITEM_PREFIX) {
        return Err(AppError::InputInvalid(format!("'{}' is not an item ID", id)));
    }
    Ok(())
}
