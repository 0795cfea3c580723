use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Sum,
    Counter,
    Journal,
}

impl ItemType {
    pub const ALL: [ItemType; 3] = [ItemType::Sum, ItemType::Counter, ItemType::Journal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "Sum",
            Self::Counter => "Counter",
            Self::Journal => "Journal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item_type| item_type.as_str() == name)
    }

    /// Single digit embedded in item file names. At most ten item types fit.
    pub fn tag(self) -> char {
        match self {
            Self::Sum => '0',
            Self::Counter => '1',
            Self::Journal => '2',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            '0' => Some(Self::Sum),
            '1' => Some(Self::Counter),
            '2' => Some(Self::Journal),
            _ => None,
        }
    }
}

/// One named amount of a Sum item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub value: f64,
}

impl Element {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One dated note of a Journal item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    #[serde(with = "epoch_seconds")]
    pub value: DateTime<Utc>,
}

impl Entry {
    pub fn new(name: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value: truncate_to_seconds(value),
        }
    }
}

/// Fields shared by every item variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    pub version: String,
    pub name: String,
    #[serde(rename = "ID")]
    pub id: String,
    pub description: String,
    pub use_date: bool,
    #[serde(with = "epoch_seconds")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "epoch_seconds")]
    pub end_date: DateTime<Utc>,
}

/// User-editable fields of an item, used both for creation and for the
/// details update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub use_date: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl NewItem {
    pub fn named(name: impl Into<String>) -> Self {
        let now = now_seconds();
        Self {
            name: name.into(),
            description: String::new(),
            use_date: false,
            start_date: now,
            end_date: now,
        }
    }

    pub(crate) fn validate(&self) -> AppResult<()> {
        require_name(&self.name, "item")
    }
}

/// Outcome of a write that may turn out to be a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mutation {
    Applied,
    Unchanged,
}

impl Mutation {
    pub fn changed(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Denormalized display data of one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInfo {
    pub name: String,
    pub num_items: usize,
}

/// Checks a persisted version against the running one and returns the
/// version the in-memory entity should carry.
///
/// Versions are compared as plain strings, so "9" sorts after "10". Files
/// written by a newer app are refused.
pub fn accept_version(loaded: &str, current: &str) -> AppResult<String> {
    if loaded > current {
        return Err(AppError::Corrupted(format!(
            "data version '{}' is newer than app version '{}'",
            loaded, current
        )));
    }
    Ok(current.to_string())
}

pub(crate) fn require_name(name: &str, entity: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::InputInvalid(format!("{} name must not be empty", entity)));
    }
    Ok(())
}

pub fn now_seconds() -> DateTime<Utc> {
    truncate_to_seconds(Utc::now())
}

/// Dates persist as whole epoch seconds; keep in-memory values at the same
/// precision so a reload compares equal.
pub fn truncate_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(value.timestamp(), 0).unwrap_or(value)
}

pub fn parse_epoch_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let seconds = match raw.parse::<i64>() {
        Ok(seconds) => seconds,
        Err(_) => {
            let value = raw.parse::<f64>().ok().filter(|value| value.is_finite())?;
            value.floor() as i64
        }
    };
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

pub(crate) mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.timestamp().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_epoch_seconds(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid epoch timestamp '{}'", raw)))
    }
}
