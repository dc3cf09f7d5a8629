use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;

use crate::types::{CacheMode, Decision, RequestId, RuleId};

/// Key of one memoized leaf evaluation.
///
/// `input` is `None` for contextual leaves and a BLAKE3 digest of the
/// canonical JSON of (parent, args) for strict ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    rule: RuleId,
    request: RequestId,
    input: Option<[u8; 32]>,
}

impl CacheKey {
    /// Returns `None` when the mode is [`CacheMode::None`] or the inputs
    /// could not be hashed; the caller then evaluates without caching.
    pub(crate) fn for_leaf(
        mode: CacheMode,
        rule: RuleId,
        request: RequestId,
        parent: &Value,
        args: &Value,
    ) -> Option<Self> {
        let input = match mode {
            CacheMode::None => return None,
            CacheMode::Contextual => None,
            CacheMode::Strict => Some(input_digest(parent, args)?),
        };
        Some(Self {
            rule,
            request,
            input,
        })
    }
}

fn input_digest(parent: &Value, args: &Value) -> Option<[u8; 32]> {
    let mut hasher = blake3::Hasher::new();
    write_canonical(&mut hasher, parent).ok()?;
    hasher.update(&[0x1e]);
    write_canonical(&mut hasher, args).ok()?;
    Some(*hasher.finalize().as_bytes())
}

/// Compact JSON with object keys sorted at every depth, independent of the
/// map's iteration order.
fn write_canonical(hasher: &mut blake3::Hasher, value: &Value) -> serde_json::Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            hasher.update(b"{");
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                serde_json::to_writer(&mut *hasher, key)?;
                hasher.update(b":");
                write_canonical(hasher, item)?;
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                write_canonical(hasher, item)?;
            }
            hasher.update(b"]");
        }
        scalar => serde_json::to_writer(&mut *hasher, scalar)?,
    }
    Ok(())
}

/// A leaf evaluation that any number of callers can await. It keeps its
/// progress when a caller drops it, and settles at most once.
pub(crate) type Pending = Shared<BoxFuture<'static, Decision>>;

/// Hit/miss counters of a [`RuleCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Per-request memo of leaf decisions.
///
/// Each key maps to one shared evaluation: the first caller to reach a key
/// starts the predicate, and every later caller (concurrent or not) awaits
/// that same evaluation. A caller that stops waiting, e.g. a short-circuited
/// `and`, does not discard it; the next caller resumes where it left off.
pub struct RuleCache {
    request: RequestId,
    slots: Mutex<HashMap<CacheKey, Pending>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RuleCache {
    pub(crate) fn new(request: RequestId) -> Self {
        Self {
            request,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request
    }

    /// The evaluation for `key`, started with `start` if none exists yet.
    /// The flag is `true` on a hit.
    ///
    /// `start` runs under the lock, so it must only build the future.
    pub(crate) fn entry(
        &self,
        key: CacheKey,
        start: impl FnOnce() -> BoxFuture<'static, Decision>,
    ) -> (Pending, bool) {
        let mut slots = self.slots.lock();
        let (pending, hit) = match slots.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => (entry.insert(start().shared()).clone(), false),
        };
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        (pending, hit)
    }

    /// Number of keys with a settled decision.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|pending| pending.peek().is_some())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCache")
            .field("request", &self.request)
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
