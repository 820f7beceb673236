use std::collections::BTreeSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

use crate::DisplayIdentity;
use crate::Item;
use crate::ItemId;
use crate::Settings;
use crate::SinkTarget;
use crate::SourceConfig;
use crate::SourceRecord;

/// Reference time of the item builders, unix ms
pub const BASE_TS: u64 = 1_700_000_000_000;

pub const HOOK_A: &str = "https://hooks.example/a";
pub const HOOK_B: &str = "https://hooks.example/b";

// This will ensure the subscriber is only initialized once.
static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    Lazy::force(&LOGGER_INIT);
}

/// Id whose decoded time is `BASE_TS + offset_ms`
pub fn id_at(offset_ms: i64) -> ItemId {
    ItemId::from_timestamp_ms(BASE_TS.saturating_add_signed(offset_ms))
}

pub fn test_identity() -> DisplayIdentity {
    DisplayIdentity {
        name: "Alice".to_string(),
        avatar_ref: "https://img.example/alice.jpg".to_string(),
    }
}

pub fn item_at(offset_ms: i64) -> Item {
    let id = id_at(offset_ms);
    Item {
        id,
        is_boosted: false,
        is_pinned: false,
        identity: test_identity(),
        link: format!("https://twitter.com/alice/status/{id}"),
    }
}

pub fn pinned_item_at(offset_ms: i64) -> Item {
    Item {
        is_pinned: true,
        ..item_at(offset_ms)
    }
}

pub fn sink_target(raw: &str) -> SinkTarget {
    SinkTarget::parse(raw).expect("valid sink target")
}

pub fn source_config(
    source_id: &str,
    sinks: &[&str],
) -> SourceConfig {
    SourceConfig {
        source_id: source_id.to_string(),
        enabled: true,
        sink_targets: sinks.iter().map(|s| sink_target(s)).collect(),
    }
}

pub fn record(
    key: &str,
    enabled: bool,
    accounts: &[&str],
    sink: &str,
) -> SourceRecord {
    SourceRecord {
        key: key.to_string(),
        enabled,
        accounts: accounts.iter().map(|a| a.to_string()).collect::<BTreeSet<_>>(),
        sink_target: sink_target(sink),
    }
}

/// Defaults with the periodic resync off
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.manager.resync_interval_in_secs = 0;
    settings
}

/// Polls `condition` until it holds, panicking after about two seconds of
/// (possibly virtual) time
pub async fn eventually<F>(
    what: &str,
    condition: F,
) where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}
