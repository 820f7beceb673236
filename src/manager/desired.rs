use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::SourceConfig;
use crate::SourceRecord;

/// Folds configuration records into one [`SourceConfig`] per account.
///
/// Disabled records are ignored. Sink targets of every enabled record that
/// names an account are unioned.
pub fn desired_sources(records: &[SourceRecord]) -> BTreeMap<String, SourceConfig> {
    let mut desired: BTreeMap<String, SourceConfig> = BTreeMap::new();

    for record in records.iter().filter(|r| r.enabled) {
        for account in &record.accounts {
            desired
                .entry(account.clone())
                .or_insert_with(|| SourceConfig {
                    source_id: account.clone(),
                    enabled: true,
                    sink_targets: BTreeSet::new(),
                })
                .sink_targets
                .insert(record.sink_target.clone());
        }
    }

    desired
}
