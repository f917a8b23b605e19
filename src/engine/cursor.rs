//! Merged range cursor
//!
//! Walks a [`View`] in pages. Each refill asks every source for at most
//! `FETCH_SIZE` keys past the current position, merges them newest-wins and
//! emits keys up to the nearest point where a source may still hold unseen
//! keys.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;

use super::view::View;
use crate::backend::{EngineCursor, Page, RawEntry};
use crate::error::Result;
use crate::memtable::Record;
use crate::range::ScanRange;

/// Keys requested from each source per refill
const FETCH_SIZE: usize = 128;

pub(crate) struct LsmCursor {
    view: View,
    range: ScanRange,
    /// Near-side bound in scan direction; moves past every key handled
    from: Bound<Bytes>,
    emitted: usize,
    finished: bool,
}

impl LsmCursor {
    pub(crate) fn new(view: View, range: ScanRange) -> Self {
        let from = if range.reverse {
            range.upper.clone()
        } else {
            range.lower.clone()
        };

        Self {
            view,
            range,
            from,
            emitted: 0,
            finished: false,
        }
    }

    /// Effective (lower, upper) bounds for the next refill
    fn bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let from = as_slice(&self.from);
        if self.range.reverse {
            (as_slice(&self.range.lower), tighter(from, as_slice(&self.range.upper), true))
        } else {
            (tighter(from, as_slice(&self.range.lower), false), as_slice(&self.range.upper))
        }
    }

    fn limit_reached(&self) -> bool {
        self.range.limit.is_some_and(|limit| self.emitted >= limit)
    }

    /// Fetch and merge one refill; returns the keys safe to emit in scan
    /// order and whether they exhaust the range
    fn refill(&self) -> Result<(Vec<(Bytes, Record)>, bool)> {
        let (lower, upper) = self.bounds();
        let reverse = self.range.reverse;
        let sources = self.view.collect(lower, upper, reverse, FETCH_SIZE)?;

        // A full source may hold more keys past its last one; nothing beyond
        // the nearest such key is known to be complete
        let mut frontier: Option<Bytes> = None;
        for source in &sources {
            if source.len() < FETCH_SIZE {
                continue;
            }
            if let Some((last, _)) = source.last() {
                let nearer = match &frontier {
                    None => true,
                    Some(f) if reverse => last > f,
                    Some(f) => last < f,
                };
                if nearer {
                    frontier = Some(last.clone());
                }
            }
        }

        let mut merged: BTreeMap<Bytes, Record> = BTreeMap::new();
        for source in sources {
            for (key, record) in source {
                let beyond = match &frontier {
                    Some(f) if reverse => key < *f,
                    Some(f) => key > *f,
                    None => false,
                };
                if !beyond {
                    merged.entry(key).or_insert(record);
                }
            }
        }

        let ordered: Vec<(Bytes, Record)> = if reverse {
            merged.into_iter().rev().collect()
        } else {
            merged.into_iter().collect()
        };
        Ok((ordered, frontier.is_none()))
    }
}

impl EngineCursor for LsmCursor {
    fn seek(&mut self, target: &[u8]) {
        self.from = Bound::Included(Bytes::copy_from_slice(target));
        self.finished = false;
    }

    fn next_page(&mut self) -> Result<Page> {
        let mut entries = Vec::new();
        let mut page_bytes = 0;

        while !self.finished && page_bytes < self.range.high_water_mark {
            if self.limit_reached() {
                self.finished = true;
                break;
            }

            let (records, exhausted) = self.refill()?;
            let mut stopped_early = false;

            for (key, record) in records {
                self.from = Bound::Excluded(key.clone());

                let Record::Value(value) = record else {
                    continue;
                };

                page_bytes += key.len() + value.len();
                entries.push(RawEntry {
                    key: self.range.keys.then_some(key),
                    value: self.range.values.then_some(value),
                });
                self.emitted += 1;

                if self.limit_reached() || page_bytes >= self.range.high_water_mark {
                    stopped_early = true;
                    break;
                }
            }

            if self.limit_reached() || (exhausted && !stopped_early) {
                self.finished = true;
            }
        }

        tracing::debug!(
            "Cursor page: {} entries, {} bytes, finished={}",
            entries.len(),
            page_bytes,
            self.finished
        );

        Ok(Page {
            entries,
            finished: self.finished,
        })
    }
}

fn as_slice(bound: &Bound<Bytes>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(&k[..]),
        Bound::Excluded(k) => Bound::Excluded(&k[..]),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// The more restrictive of two bounds on the same side
///
/// `upper` selects the smaller bound, otherwise the larger one wins.
fn tighter<'a>(a: Bound<&'a [u8]>, b: Bound<&'a [u8]>, upper: bool) -> Bound<&'a [u8]> {
    let key = |bound: &Bound<&'a [u8]>| match bound {
        Bound::Included(k) | Bound::Excluded(k) => Some(*k),
        Bound::Unbounded => None,
    };

    match (key(&a), key(&b)) {
        (None, _) => b,
        (_, None) => a,
        (Some(x), Some(y)) if x == y => {
            // Excluded is tighter than Included at the same key
            if matches!(a, Bound::Excluded(_)) {
                a
            } else {
                b
            }
        }
        (Some(x), Some(y)) => {
            if (x < y) == upper {
                a
            } else {
                b
            }
        }
    }
}
