use crate::codec;
use crate::errors::{AppError, AppResult};
use crate::file_store::Storage;
use crate::format;
use crate::models::{
    accept_version, require_name, truncate_to_seconds, Element, Entry, ItemDetails, ItemType, Mutation, NewItem,
};
use crate::reorder::Reorderable;
use crate::transaction::{apply_and_persist, Persist};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SumFields {
    sum: f64,
    elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CounterFields {
    counter: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JournalFields {
    entries: Vec<Entry>,
}

/// On-disk shape of every item: the common header, the type name, then
/// the variant fields, all in one flat object.
#[derive(Serialize)]
struct ItemRecord<'a, F: Serialize> {
    #[serde(flatten)]
    details: &'a ItemDetails,
    #[serde(rename = "type")]
    item_type: ItemType,
    #[serde(flatten)]
    fields: &'a F,
}

fn encode_record<F: Serialize>(details: &ItemDetails, item_type: ItemType, fields: &F) -> AppResult<String> {
    codec::encode(&ItemRecord {
        details,
        item_type,
        fields,
    })
}

/// Decodes the common header, checks the stored type against `expected`,
/// then decodes the variant fields and finally the version.
fn decode_record<F: DeserializeOwned>(
    input: &str,
    expected: ItemType,
    app_version: &str,
) -> AppResult<(ItemDetails, F)> {
    let value = Value::Object(codec::decode_object(input)?);
    let mut details: ItemDetails = codec::decode_as(&value, "item header")?;

    let stored_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Corrupted(format!("item {} has no type", details.id)))?;
    if stored_type != expected.as_str() {
        return Err(AppError::Corrupted(format!(
            "item {} is of type '{}', expected '{}'",
            details.id,
            stored_type,
            expected.as_str()
        )));
    }

    let fields: F = codec::decode_as(&value, expected.as_str())?;
    details.version = accept_version(&details.version, app_version)?;
    Ok((details, fields))
}

pub(crate) fn new_details(id: String, app_version: &str, fields: NewItem) -> ItemDetails {
    ItemDetails {
        version: app_version.to_string(),
        name: fields.name,
        id,
        description: fields.description,
        use_date: fields.use_date,
        start_date: truncate_to_seconds(fields.start_date),
        end_date: truncate_to_seconds(fields.end_date),
    }
}

/// Relative gap between the stored and recomputed sums still counted as
/// rounding drift.
const SUM_TOLERANCE: f64 = 1e-9;

fn require_value(value: f64) -> AppResult<()> {
    if !value.is_finite() {
        return Err(AppError::InputInvalid(format!("element value {} is not a number", value)));
    }
    Ok(())
}

fn check_pair(a: usize, b: usize, len: usize) -> AppResult<()> {
    AppError::check_index(a, len)?;
    AppError::check_index(b, len)
}

/// Running total over named amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSum {
    details: ItemDetails,
    fields: SumFields,
}

impl ItemSum {
    pub(crate) fn new(details: ItemDetails) -> Self {
        Self {
            details,
            fields: SumFields {
                sum: 0.0,
                elements: Vec::new(),
            },
        }
    }

    pub fn decode(input: &str, app_version: &str) -> AppResult<Self> {
        let (details, fields) = decode_record::<SumFields>(input, ItemType::Sum, app_version)?;
        let item = Self { details, fields };
        let recomputed = item.recomputed_sum();
        if (recomputed - item.fields.sum).abs() > SUM_TOLERANCE * recomputed.abs().max(1.0) {
            tracing::warn!(
                item_id = %item.details.id,
                stored = item.fields.sum,
                recomputed,
                "stored sum differs from its elements"
            );
        }
        Ok(item)
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn sum(&self) -> f64 {
        self.fields.sum
    }

    pub fn elements(&self) -> &[Element] {
        &self.fields.elements
    }

    /// Sum rebuilt from scratch, for verifying the incrementally kept one.
    pub fn recomputed_sum(&self) -> f64 {
        self.fields.elements.iter().map(|element| element.value).sum()
    }

    pub fn insert_element(&mut self, storage: &dyn Storage, element: Element) -> AppResult<()> {
        require_name(&element.name, "element")?;
        require_value(element.value)?;
        apply_and_persist(self, storage, |item| {
            item.fields.sum += element.value;
            item.fields.elements.push(element);
            Ok(())
        })?;
        tracing::debug!(item_id = %self.details.id, "added element to sum item");
        Ok(())
    }

    pub fn remove_element(&mut self, storage: &dyn Storage, index: usize) -> AppResult<Element> {
        AppError::check_index(index, self.fields.elements.len())?;
        let removed = apply_and_persist(self, storage, |item| {
            AppError::check_index(index, item.fields.elements.len())?;
            let removed = item.fields.elements.remove(index);
            item.fields.sum -= removed.value;
            Ok(removed)
        })?;
        tracing::debug!(item_id = %self.details.id, index, "removed element from sum item");
        Ok(removed)
    }

    pub fn update_element(
        &mut self,
        storage: &dyn Storage,
        index: usize,
        name: &str,
        value: f64,
    ) -> AppResult<Mutation> {
        AppError::check_index(index, self.fields.elements.len())?;
        let current = &self.fields.elements[index];
        if current.name == name && current.value == value {
            return Ok(Mutation::Unchanged);
        }
        require_name(name, "element")?;
        require_value(value)?;

        let replacement = Element::new(name, value);
        apply_and_persist(self, storage, |item| {
            let old = std::mem::replace(&mut item.fields.elements[index], replacement);
            item.fields.sum -= old.value;
            item.fields.sum += value;
            Ok(())
        })?;
        tracing::debug!(item_id = %self.details.id, index, "updated element of sum item");
        Ok(Mutation::Applied)
    }

    /// In-memory swap used while dragging; persist with [`Persist::save`].
    pub fn exchange_elements(&mut self, src: usize, dst: usize) -> AppResult<()> {
        check_pair(src, dst, self.fields.elements.len())?;
        self.fields.elements.swap(src, dst);
        Ok(())
    }
}

impl Persist for ItemSum {
    fn file_name(&self) -> &str {
        &self.details.id
    }

    fn encode(&self) -> AppResult<String> {
        encode_record(&self.details, ItemType::Sum, &self.fields)
    }
}

impl Reorderable for ItemSum {
    fn row_count(&self) -> usize {
        self.fields.elements.len()
    }

    fn exchange_rows(&mut self, a: usize, b: usize) -> AppResult<()> {
        self.exchange_elements(a, b)
    }
}

/// Non-negative tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCounter {
    details: ItemDetails,
    fields: CounterFields,
}

impl ItemCounter {
    pub(crate) fn new(details: ItemDetails) -> Self {
        Self {
            details,
            fields: CounterFields { counter: 0 },
        }
    }

    pub fn decode(input: &str, app_version: &str) -> AppResult<Self> {
        let (details, fields) = decode_record(input, ItemType::Counter, app_version)?;
        Ok(Self { details, fields })
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn counter(&self) -> u64 {
        self.fields.counter
    }

    /// Steps the counter by one. Decrementing at zero is a no-op and
    /// reports `Unchanged` without touching disk.
    pub fn change_counter(&mut self, storage: &dyn Storage, increase: bool) -> AppResult<Mutation> {
        let next = if increase {
            self.fields.counter.saturating_add(1)
        } else {
            self.fields.counter.saturating_sub(1)
        };
        if next == self.fields.counter {
            return Ok(Mutation::Unchanged);
        }

        apply_and_persist(self, storage, |item| {
            item.fields.counter = next;
            Ok(())
        })?;
        tracing::debug!(item_id = %self.details.id, counter = next, "changed counter item");
        Ok(Mutation::Applied)
    }

    pub fn increment(&mut self, storage: &dyn Storage) -> AppResult<Mutation> {
        self.change_counter(storage, true)
    }

    pub fn decrement(&mut self, storage: &dyn Storage) -> AppResult<Mutation> {
        self.change_counter(storage, false)
    }
}

impl Persist for ItemCounter {
    fn file_name(&self) -> &str {
        &self.details.id
    }

    fn encode(&self) -> AppResult<String> {
        encode_record(&self.details, ItemType::Counter, &self.fields)
    }
}

/// Dated notes, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemJournal {
    details: ItemDetails,
    fields: JournalFields,
}

impl ItemJournal {
    pub(crate) fn new(details: ItemDetails) -> Self {
        Self {
            details,
            fields: JournalFields { entries: Vec::new() },
        }
    }

    pub fn decode(input: &str, app_version: &str) -> AppResult<Self> {
        let (details, fields) = decode_record(input, ItemType::Journal, app_version)?;
        Ok(Self { details, fields })
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn entries(&self) -> &[Entry] {
        &self.fields.entries
    }

    pub fn insert_entry(&mut self, storage: &dyn Storage, entry: Entry) -> AppResult<()> {
        require_name(&entry.name, "entry")?;
        let entry = Entry::new(entry.name, entry.value);
        apply_and_persist(self, storage, |item| {
            item.fields.entries.insert(0, entry);
            Ok(())
        })?;
        tracing::debug!(item_id = %self.details.id, "added entry to journal item");
        Ok(())
    }

    pub fn remove_entry(&mut self, storage: &dyn Storage, index: usize) -> AppResult<Entry> {
        AppError::check_index(index, self.fields.entries.len())?;
        let removed = apply_and_persist(self, storage, |item| {
            AppError::check_index(index, item.fields.entries.len())?;
            Ok(item.fields.entries.remove(index))
        })?;
        tracing::debug!(item_id = %self.details.id, index, "removed entry from journal item");
        Ok(removed)
    }

    pub fn update_entry(
        &mut self,
        storage: &dyn Storage,
        index: usize,
        name: &str,
        value: DateTime<Utc>,
    ) -> AppResult<Mutation> {
        AppError::check_index(index, self.fields.entries.len())?;
        let replacement = Entry::new(name, value);
        if self.fields.entries[index] == replacement {
            return Ok(Mutation::Unchanged);
        }
        require_name(name, "entry")?;

        apply_and_persist(self, storage, |item| {
            item.fields.entries[index] = replacement;
            Ok(())
        })?;
        tracing::debug!(item_id = %self.details.id, index, "updated entry of journal item");
        Ok(Mutation::Applied)
    }

    /// In-memory swap used while dragging; persist with [`Persist::save`].
    pub fn exchange_entries(&mut self, src: usize, dst: usize) -> AppResult<()> {
        check_pair(src, dst, self.fields.entries.len())?;
        self.fields.entries.swap(src, dst);
        Ok(())
    }
}

impl Persist for ItemJournal {
    fn file_name(&self) -> &str {
        &self.details.id
    }

    fn encode(&self) -> AppResult<String> {
        encode_record(&self.details, ItemType::Journal, &self.fields)
    }
}

impl Reorderable for ItemJournal {
    fn row_count(&self) -> usize {
        self.fields.entries.len()
    }

    fn exchange_rows(&mut self, a: usize, b: usize) -> AppResult<()> {
        self.exchange_entries(a, b)
    }
}

/// A mutation requested by the UI against a loaded item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOp {
    InsertElement(Element),
    RemoveElement(usize),
    UpdateElement { index: usize, name: String, value: f64 },
    ExchangeElements(usize, usize),
    Increment,
    Decrement,
    InsertEntry(Entry),
    RemoveEntry(usize),
    UpdateEntry { index: usize, name: String, value: DateTime<Utc> },
    ExchangeEntries(usize, usize),
    UpdateDetails(NewItem),
    /// Writes the item as it is, ending a drag.
    Save,
}

impl ItemOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertElement(_) => "insert-element",
            Self::RemoveElement(_) => "remove-element",
            Self::UpdateElement { .. } => "update-element",
            Self::ExchangeElements(..) => "exchange-elements",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::InsertEntry(_) => "insert-entry",
            Self::RemoveEntry(_) => "remove-entry",
            Self::UpdateEntry { .. } => "update-entry",
            Self::ExchangeEntries(..) => "exchange-entries",
            Self::UpdateDetails(_) => "update-details",
            Self::Save => "save",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Sum(ItemSum),
    Counter(ItemCounter),
    Journal(ItemJournal),
}

impl Item {
    pub(crate) fn new(item_type: ItemType, details: ItemDetails) -> Self {
        match item_type {
            ItemType::Sum => Self::Sum(ItemSum::new(details)),
            ItemType::Counter => Self::Counter(ItemCounter::new(details)),
            ItemType::Journal => Self::Journal(ItemJournal::new(details)),
        }
    }

    /// Routes `input` to the decoder of `item_type`. A payload of a
    /// different type fails as corrupted.
    pub fn decode(item_type: ItemType, input: &str, app_version: &str) -> AppResult<Self> {
        Ok(match item_type {
            ItemType::Sum => Self::Sum(ItemSum::decode(input, app_version)?),
            ItemType::Counter => Self::Counter(ItemCounter::decode(input, app_version)?),
            ItemType::Journal => Self::Journal(ItemJournal::decode(input, app_version)?),
        })
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Sum(_) => ItemType::Sum,
            Self::Counter(_) => ItemType::Counter,
            Self::Journal(_) => ItemType::Journal,
        }
    }

    pub fn details(&self) -> &ItemDetails {
        match self {
            Self::Sum(item) => &item.details,
            Self::Counter(item) => &item.details,
            Self::Journal(item) => &item.details,
        }
    }

    fn details_mut(&mut self) -> &mut ItemDetails {
        match self {
            Self::Sum(item) => &mut item.details,
            Self::Counter(item) => &mut item.details,
            Self::Journal(item) => &mut item.details,
        }
    }

    pub fn id(&self) -> &str {
        &self.details().id
    }

    pub fn name(&self) -> &str {
        &self.details().name
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Sum(item) => item.fields.elements.is_empty(),
            Self::Counter(item) => item.fields.counter == 0,
            Self::Journal(item) => item.fields.entries.is_empty(),
        }
    }

    pub fn as_sum(&self) -> Option<&ItemSum> {
        match self {
            Self::Sum(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<&ItemCounter> {
        match self {
            Self::Counter(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_journal(&self) -> Option<&ItemJournal> {
        match self {
            Self::Journal(item) => Some(item),
            _ => None,
        }
    }

    /// Text shown in the value column of an item row.
    pub fn display_value(&self, separator: bool) -> String {
        match self {
            Self::Sum(item) => format::amount(item.fields.sum, separator),
            Self::Counter(item) => format::count(item.fields.counter, separator),
            Self::Journal(item) => format::entries(item.fields.entries.len()),
        }
    }

    /// Replaces the user-editable header fields, writing only when one of
    /// them differs.
    pub fn update_details(&mut self, storage: &dyn Storage, fields: NewItem) -> AppResult<Mutation> {
        let start_date = truncate_to_seconds(fields.start_date);
        let end_date = truncate_to_seconds(fields.end_date);
        let current = self.details();
        let changed = current.name != fields.name
            || current.description != fields.description
            || current.use_date != fields.use_date
            || current.start_date != start_date
            || current.end_date != end_date;
        if !changed {
            return Ok(Mutation::Unchanged);
        }
        fields.validate()?;

        apply_and_persist(self, storage, |item| {
            let details = item.details_mut();
            details.name = fields.name;
            details.description = fields.description;
            details.use_date = fields.use_date;
            details.start_date = start_date;
            details.end_date = end_date;
            Ok(())
        })?;
        tracing::debug!(item_id = %self.id(), "updated item details");
        Ok(Mutation::Applied)
    }

    /// Runs one [`ItemOp`]. Exchanges only reorder in memory and need a
    /// closing [`ItemOp::Save`].
    pub fn apply(&mut self, storage: &dyn Storage, op: ItemOp) -> AppResult<Mutation> {
        let op_name = op.name();
        let item_type = self.item_type();
        match (self, op) {
            (item, ItemOp::UpdateDetails(fields)) => item.update_details(storage, fields),
            (item, ItemOp::Save) => {
                item.save(storage)?;
                Ok(Mutation::Applied)
            }
            (Self::Sum(item), ItemOp::InsertElement(element)) => {
                item.insert_element(storage, element)?;
                Ok(Mutation::Applied)
            }
            (Self::Sum(item), ItemOp::RemoveElement(index)) => {
                item.remove_element(storage, index)?;
                Ok(Mutation::Applied)
            }
            (Self::Sum(item), ItemOp::UpdateElement { index, name, value }) => {
                item.update_element(storage, index, &name, value)
            }
            (Self::Sum(item), ItemOp::ExchangeElements(src, dst)) => {
                item.exchange_elements(src, dst)?;
                Ok(if src == dst { Mutation::Unchanged } else { Mutation::Applied })
            }
            (Self::Counter(item), ItemOp::Increment) => item.increment(storage),
            (Self::Counter(item), ItemOp::Decrement) => item.decrement(storage),
            (Self::Journal(item), ItemOp::InsertEntry(entry)) => {
                item.insert_entry(storage, entry)?;
                Ok(Mutation::Applied)
            }
            (Self::Journal(item), ItemOp::RemoveEntry(index)) => {
                item.remove_entry(storage, index)?;
                Ok(Mutation::Applied)
            }
            (Self::Journal(item), ItemOp::UpdateEntry { index, name, value }) => {
                item.update_entry(storage, index, &name, value)
            }
            (Self::Journal(item), ItemOp::ExchangeEntries(src, dst)) => {
                item.exchange_entries(src, dst)?;
                Ok(if src == dst { Mutation::Unchanged } else { Mutation::Applied })
            }
            _ => Err(AppError::InputInvalid(format!(
                "{} does not apply to a {} item",
                op_name,
                item_type.as_str()
            ))),
        }
    }
}

impl Persist for Item {
    fn file_name(&self) -> &str {
        self.id()
    }

    fn encode(&self) -> AppResult<String> {
        match self {
            Self::Sum(item) => item.encode(),
            Self::Counter(item) => item.encode(),
            Self::Journal(item) => item.encode(),
        }
    }
}
