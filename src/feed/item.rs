use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::EPOCH_OFFSET_MS;
use crate::constants::ID_TIMESTAMP_SHIFT;
use crate::ConvertError;

const ID_SUB_MS_MASK: u64 = (1 << ID_TIMESTAMP_SHIFT) - 1;

/// Identifier of a feed item. The high bits encode the creation time, so
/// ordering ids orders items by publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ItemId(u64);

impl ItemId {
    pub const fn new(raw: u64) -> Self {
        ItemId(raw)
    }

    /// Smallest id whose decoded time is `timestamp_ms`
    pub fn from_timestamp_ms(timestamp_ms: u64) -> Self {
        ItemId(timestamp_ms.saturating_sub(EPOCH_OFFSET_MS) << ID_TIMESTAMP_SHIFT)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Decoded creation time in unix ms, rounded down
    pub fn timestamp_ms(&self) -> u64 {
        (self.0 >> ID_TIMESTAMP_SHIFT) + EPOCH_OFFSET_MS
    }

    /// Decoded creation time in unix ms, rounded up
    pub fn timestamp_ms_ceil(&self) -> u64 {
        let carry = u64::from(self.0 & ID_SUB_MS_MASK != 0);
        (self.0 >> ID_TIMESTAMP_SHIFT) + carry + EPOCH_OFFSET_MS
    }
}

impl fmt::Display for ItemId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConvertError::InvalidItemId(s.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(ItemId)
            .map_err(|_| ConvertError::InvalidItemId(s.to_string()))
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ItemId {
    type Error = ConvertError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Name and avatar a delivery is posted under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayIdentity {
    pub name: String,
    pub avatar_ref: String,
}

/// One candidate post extracted from a snapshot. Lives for a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub is_boosted: bool,
    pub is_pinned: bool,
    pub identity: DisplayIdentity,
    /// Permalink as found on the page, absolute
    pub link: String,
}

impl Item {
    pub fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}
