//! Write batch accumulator

use std::sync::Arc;

use bytes::Bytes;

use super::LsmInner;
use crate::backend::{EngineBatch, RawOp};
use crate::config::WriteOptions;
use crate::error::Result;

/// Collects operations until `write` hands them to the engine as one WAL frame
pub(crate) struct LsmBatch {
    inner: Arc<LsmInner>,
    ops: Vec<RawOp>,
}

impl LsmBatch {
    pub(crate) fn new(inner: Arc<LsmInner>) -> Self {
        Self {
            inner,
            ops: Vec::new(),
        }
    }
}

impl EngineBatch for LsmBatch {
    fn put(&mut self, key: Bytes, value: Bytes) {
        self.ops.push(RawOp::Put { key, value });
    }

    fn delete(&mut self, key: Bytes) {
        self.ops.push(RawOp::Delete { key });
    }

    fn clear(&mut self) {
        self.ops.clear();
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    fn write(self: Box<Self>, options: &WriteOptions) -> Result<()> {
        let LsmBatch { inner, ops } = *self;
        inner.apply(ops, options)
    }
}
