use super::entry::Entry;
use crate::common::codec::Expiry;
use bytes::Bytes;
use std::collections::HashMap;

/// Whether `entry` is logically gone at `now`. Both the lookup path and the
/// active sweep go through this predicate.
pub fn is_expired(entry: &Entry, now: u64) -> bool {
    entry.expires_at().is_some_and(|expires_at| expires_at <= now)
}

/// Turn a SET expiry option into an absolute unix-millisecond timestamp.
///
/// Absolute options are taken literally, even when already in the past; such
/// a key is stored and is simply invisible from then on. `live` is the entry
/// being replaced, if it is still unexpired, and only matters for `KEEPTTL`.
pub fn resolve_expires_at(expiry: Option<Expiry>, now: u64, live: Option<&Entry>) -> Option<u64> {
    match expiry? {
        Expiry::Ex(seconds) => Some(now.saturating_add(seconds.saturating_mul(1000))),
        Expiry::Px(millis) => Some(now.saturating_add(millis)),
        Expiry::ExAt(seconds) => Some(seconds.saturating_mul(1000)),
        Expiry::PxAt(millis) => Some(millis),
        Expiry::KeepTtl => live.and_then(Entry::expires_at),
    }
}

/// Drop every entry that is expired at `now`, returning how many were removed.
pub fn remove_expired(entries: &mut HashMap<Bytes, Entry>, now: u64) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !is_expired(entry, now));
    before - entries.len()
}
