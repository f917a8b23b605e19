//! Range Descriptor
//!
//! Caller-facing [`RangeOptions`] and the normalized [`ScanRange`] handed to
//! engine cursors.
//!
//! Normalization drops empty bounds, resolves the legacy `start`/`end` aliases
//! and fills in defaults, so an engine only ever sees concrete `Bound`s.

use std::ops::Bound;

use bytes::Bytes;

use crate::codec::Key;

/// Default prefetch page size in bytes
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Options of a range scan
#[derive(Debug, Clone)]
pub struct RangeOptions {
    pub gt: Option<Key>,
    pub gte: Option<Key>,
    pub lt: Option<Key>,
    pub lte: Option<Key>,
    /// Legacy alias for `gte`
    pub start: Option<Key>,
    /// Legacy alias for `lte`
    pub end: Option<Key>,
    pub reverse: bool,
    /// Yield keys
    pub keys: bool,
    /// Yield values
    pub values: bool,
    /// Maximum number of entries; `None` is unbounded
    pub limit: Option<usize>,
    pub key_as_buffer: bool,
    pub value_as_buffer: bool,
    /// Approximate byte size of one prefetch page
    pub high_water_mark: usize,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            start: None,
            end: None,
            reverse: false,
            keys: true,
            values: true,
            limit: None,
            key_as_buffer: true,
            value_as_buffer: true,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl RangeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gt(mut self, key: impl Into<Key>) -> Self {
        self.gt = Some(key.into());
        self
    }

    pub fn gte(mut self, key: impl Into<Key>) -> Self {
        self.gte = Some(key.into());
        self
    }

    pub fn lt(mut self, key: impl Into<Key>) -> Self {
        self.lt = Some(key.into());
        self
    }

    pub fn lte(mut self, key: impl Into<Key>) -> Self {
        self.lte = Some(key.into());
        self
    }

    pub fn start(mut self, key: impl Into<Key>) -> Self {
        self.start = Some(key.into());
        self
    }

    pub fn end(mut self, key: impl Into<Key>) -> Self {
        self.end = Some(key.into());
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn keys(mut self, keys: bool) -> Self {
        self.keys = keys;
        self
    }

    pub fn values(mut self, values: bool) -> Self {
        self.values = values;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn key_as_buffer(mut self, as_buffer: bool) -> Self {
        self.key_as_buffer = as_buffer;
        self
    }

    pub fn value_as_buffer(mut self, as_buffer: bool) -> Self {
        self.value_as_buffer = as_buffer;
        self
    }

    pub fn high_water_mark(mut self, bytes: usize) -> Self {
        self.high_water_mark = bytes;
        self
    }

    /// Resolve bounds and defaults into the engine form
    ///
    /// Precedence: `gt` over `gte` over `start`; `lt` over `lte` over `end`.
    pub fn normalize(&self) -> ScanRange {
        let lower = match (present(&self.gt), present(&self.gte), present(&self.start)) {
            (Some(k), _, _) => Bound::Excluded(k),
            (None, Some(k), _) | (None, None, Some(k)) => Bound::Included(k),
            (None, None, None) => Bound::Unbounded,
        };

        let upper = match (present(&self.lt), present(&self.lte), present(&self.end)) {
            (Some(k), _, _) => Bound::Excluded(k),
            (None, Some(k), _) | (None, None, Some(k)) => Bound::Included(k),
            (None, None, None) => Bound::Unbounded,
        };

        ScanRange {
            lower,
            upper,
            reverse: self.reverse,
            keys: self.keys,
            values: self.values,
            limit: self.limit,
            high_water_mark: self.high_water_mark.max(1),
        }
    }
}

/// An empty bound counts as absent
fn present(key: &Option<Key>) -> Option<Bytes> {
    key.as_ref()
        .filter(|k| !k.is_empty())
        .map(|k| k.to_bytes())
}

/// Normalized scan window consumed by engine cursors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub lower: Bound<Bytes>,
    pub upper: Bound<Bytes>,
    pub reverse: bool,
    pub keys: bool,
    pub values: bool,
    pub limit: Option<usize>,
    pub high_water_mark: usize,
}

impl Default for ScanRange {
    fn default() -> Self {
        RangeOptions::default().normalize()
    }
}

impl ScanRange {
    /// True if `key` lies inside both bounds
    pub fn contains(&self, key: &[u8]) -> bool {
        let above = match &self.lower {
            Bound::Included(k) => key >= &k[..],
            Bound::Excluded(k) => key > &k[..],
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(k) => key <= &k[..],
            Bound::Excluded(k) => key < &k[..],
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// True if no key can satisfy both bounds
///
/// `BTreeMap::range` panics on such bounds, so callers check first.
pub(crate) fn bounds_empty(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}
