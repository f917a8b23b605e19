//! Stream adapter
//!
//! [`ReadStream`] turns a [`DbIterator`] into a pull-driven
//! `futures::Stream`; each poll drives at most one `next`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};

use super::iterator::{DbIterator, Entry};
use crate::codec::{Key, Value};
use crate::error::{EmberError, Result};

/// One streamed item, shaped by the stream's projection
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Key(Key),
    Value(Value),
    Pair(Key, Value),
}

impl StreamItem {
    pub fn key(&self) -> Option<&Key> {
        match self {
            StreamItem::Key(k) | StreamItem::Pair(k, _) => Some(k),
            StreamItem::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            StreamItem::Value(v) | StreamItem::Pair(_, v) => Some(v),
            StreamItem::Key(_) => None,
        }
    }
}

/// A stream of entries from one iterator
///
/// The iterator is ended when the stream is exhausted or fails; an error is
/// the stream's last item. If ending fails after exhaustion, that error is
/// yielded instead of a clean finish.
pub struct ReadStream {
    inner: BoxStream<'static, Result<StreamItem>>,
}

pub(crate) fn check_projection(keys: bool, values: bool) -> Result<()> {
    if !keys && !values {
        return Err(EmberError::InvalidArgument(
            "a read stream needs keys, values or both".to_string(),
        ));
    }
    Ok(())
}

impl ReadStream {
    pub(crate) fn new(iterator: DbIterator, keys: bool, values: bool) -> Result<Self> {
        check_projection(keys, values)?;

        let inner = stream::unfold(Some(iterator), |state| async move {
            let mut iterator = state?;
            match iterator.next().await {
                Ok(Some(entry)) => Some((project(entry), Some(iterator))),
                Ok(None) => match iterator.end().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
                Err(e) => {
                    if let Err(end_err) = iterator.end().await {
                        tracing::warn!("Failed to end iterator after stream error: {}", end_err);
                    }
                    Some((Err(e), None))
                }
            }
        })
        .boxed();

        Ok(Self { inner })
    }
}

fn project(entry: Entry) -> Result<StreamItem> {
    match (entry.key, entry.value) {
        (Some(key), Some(value)) => Ok(StreamItem::Pair(key, value)),
        (Some(key), None) => Ok(StreamItem::Key(key)),
        (None, Some(value)) => Ok(StreamItem::Value(value)),
        (None, None) => Err(EmberError::InvalidArgument(
            "iterator yielded neither key nor value".to_string(),
        )),
    }
}

impl Stream for ReadStream {
    type Item = Result<StreamItem>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
