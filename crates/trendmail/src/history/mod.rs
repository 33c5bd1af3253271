use std::collections::BTreeMap;

use crate::models::{Record, Series};
use crate::store::{SnapshotStore, StorageError};
use crate::utils::date::DayStamp;

/// Report-specific composite key for trend lookups, derived from record
/// fields alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryKey(Vec<String>);

impl HistoryKey {
    #[must_use]
    pub fn single(part: impl Into<String>) -> Self {
        Self(vec![part.into()])
    }

    #[must_use]
    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(vec![first.into(), second.into()])
    }
}

/// One historical day's records indexed by key. An empty index means the
/// day had no snapshot; a populated index missing a key means the key saw
/// no activity that day. Callers rely on the difference.
pub type DayIndex = BTreeMap<HistoryKey, Record>;

/// Loads the `window_length` days before `anchor` (offsets 1 through
/// `window_length`; the anchor day itself is excluded, callers fold the
/// live query result in themselves) and returns exactly `window_length`
/// per-day indices ordered oldest first. Days without a snapshot yield an
/// empty index. Within a day, the last record wins on key collision.
/// Records for which `key_fn` returns `None` are left out of that day's
/// index. Every call re-reads the store; nothing is cached.
pub fn collect<K>(
    store: &SnapshotStore,
    report: &str,
    anchor: DayStamp,
    window_length: u32,
    key_fn: K,
) -> Result<Vec<DayIndex>, StorageError>
where
    K: Fn(&Record) -> Option<HistoryKey>,
{
    let mut days = Vec::with_capacity(window_length as usize);
    for offset in (1..=window_length).rev() {
        let day = anchor.days_back(offset);
        let mut index = DayIndex::new();
        if let Some(records) = store.load(report, day)? {
            for record in records {
                if let Some(key) = key_fn(&record) {
                    index.insert(key, record);
                }
            }
        }
        days.push(index);
    }
    Ok(days)
}

/// What a populated day without the key means for a trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKeyPolicy {
    /// The key simply has no sample that day (a gap in the line).
    Gap,
    /// The key saw zero activity that day; only a missing day is a gap.
    ZeroWhenDayPresent,
}

/// Builds a sparkline series for one key across the collected history,
/// oldest first. `value_fn` extracts the plotted value from that day's
/// record; returning `None` leaves a gap.
pub fn trend_series<F>(
    history: &[DayIndex],
    key: &HistoryKey,
    missing_key: MissingKeyPolicy,
    value_fn: F,
) -> Series
where
    F: Fn(&Record) -> Option<f64>,
{
    history
        .iter()
        .map(|index| match index.get(key) {
            Some(record) => value_fn(record),
            None if index.is_empty() => None,
            None => match missing_key {
                MissingKeyPolicy::Gap => None,
                MissingKeyPolicy::ZeroWhenDayPresent => Some(0.0),
            },
        })
        .collect()
}
