// -
// Database namespaces

/// Sled tree holding configuration records, keyed by group key
pub(crate) const SOURCES_TREE: &str = "_sources";

/// Sled tree holding the last delivered item id per source
pub(crate) const WATERMARKS_TREE: &str = "_watermarks";

/// Sled database directory under `db_root_dir`
pub(crate) const STORE_DIR: &str = "relay_store";

// -
// Item id scheme

/// Item ids carry their creation time in the bits above this shift
/// (`id / 4194304`).
pub const ID_TIMESTAMP_SHIFT: u32 = 22;

/// Epoch of the source platform's id scheme, in unix milliseconds
pub const EPOCH_OFFSET_MS: u64 = 1_288_834_974_657;

/// Watermark used for a source that has never delivered anything
pub const GENESIS_ITEM_ID: u64 = 1_667_202_321_338_576_898;

// -
// Delivery defaults

pub const DEFAULT_DISPLAY_NAME: &str = "Twitter";
pub const DEFAULT_AVATAR_REF: &str =
    "https://discord.com/assets/1f0bfc0865d324c2587920a7d80c609b.png";
