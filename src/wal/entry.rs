//! WAL Entry definitions
//!
//! Defines the structure of individual WAL frames.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::backend::RawOp;
use crate::error::{EmberError, Result};

/// Frame header size: LSN (8) + CRC (4) + Len (4) = 16 bytes
pub const HEADER_SIZE: usize = 16;

/// A single frame in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Operations of one write call, in application order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl From<RawOp> for Operation {
    fn from(op: RawOp) -> Self {
        match op {
            RawOp::Put { key, value } => Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            },
            RawOp::Delete { key } => Operation::Delete { key: key.to_vec() },
        }
    }
}

impl From<Operation> for RawOp {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Put { key, value } => RawOp::Put {
                key: Bytes::from(key),
                value: Bytes::from(value),
            },
            Operation::Delete { key } => RawOp::Delete {
                key: Bytes::from(key),
            },
        }
    }
}

impl WalEntry {
    pub fn new(lsn: u64, operations: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operations,
            timestamp,
        }
    }

    /// Encode as a full frame: header + payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)
            .map_err(|e| EmberError::Serialization(format!("WAL entry encode failed: {}", e)))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);

        Ok(frame)
    }

    /// Decode a full frame, verifying length, checksum and LSN
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EmberError::WalCorruption(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let payload_len = Self::payload_len(&header);

        if bytes.len() < HEADER_SIZE + payload_len {
            return Err(EmberError::WalCorruption(format!(
                "Incomplete payload: expected {} bytes, got {}",
                payload_len,
                bytes.len() - HEADER_SIZE
            )));
        }

        Self::decode(&header, &bytes[HEADER_SIZE..HEADER_SIZE + payload_len])
    }

    /// Payload length recorded in a frame header
    pub(crate) fn payload_len(header: &[u8; HEADER_SIZE]) -> usize {
        u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize
    }

    pub(crate) fn decode(header: &[u8; HEADER_SIZE], payload: &[u8]) -> Result<Self> {
        let mut lsn_bytes = [0u8; 8];
        lsn_bytes.copy_from_slice(&header[0..8]);
        let lsn = u64::from_le_bytes(lsn_bytes);
        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

        let actual = crc32fast::hash(payload);
        if actual != crc {
            return Err(EmberError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:08x}, got {:08x}",
                lsn, crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(payload)
            .map_err(|e| EmberError::WalCorruption(format!("Undecodable entry: {}", e)))?;

        if entry.lsn != lsn {
            return Err(EmberError::WalCorruption(format!(
                "LSN mismatch: header {}, body {}",
                lsn, entry.lsn
            )));
        }

        Ok(entry)
    }
}
