//! Codec Layer
//!
//! Converts application keys and values to and from the engine's byte form.
//!
//! ## Encodings
//! ```text
//! key_encoding   : Buffer (default) | String
//! value_encoding : Buffer (default) | String | Json
//! ```
//!
//! Keys are always written as raw bytes; `key_encoding` only decides how keys
//! read back from an iterator are presented. Values are transformed on both
//! paths. Nothing else touches the bytes.

use bytes::Bytes;
use serde::Serialize;

use crate::error::{EmberError, Result};

// =============================================================================
// Encodings
// =============================================================================

/// Presentation of keys handed back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    #[default]
    Buffer,
    String,
}

/// Serialization of values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueEncoding {
    #[default]
    Buffer,
    String,
    Json,
}

/// Behaviour of a `Json` decode on malformed bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonDecode {
    /// Log a warning and yield JSON `null`
    #[default]
    Lenient,
    /// Fail the read with a serialization error
    Strict,
}

// =============================================================================
// Keys
// =============================================================================

/// An application key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Bytes(Bytes),
    String(String),
}

impl Key {
    /// Raw bytes as stored by the engine
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Key::Bytes(b) => b,
            Key::String(s) => s.as_bytes(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::String(s) => Some(s),
            Key::Bytes(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub(crate) fn to_bytes(&self) -> Bytes {
        match self {
            Key::Bytes(b) => b.clone(),
            Key::String(s) => Bytes::copy_from_slice(s.as_bytes()),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::String(s.clone())
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(b: &[u8; N]) -> Self {
        Key::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for Key {
    fn from(b: Bytes) -> Self {
        Key::Bytes(b)
    }
}

// Numbers are keyed by their decimal string form
impl From<u64> for Key {
    fn from(n: u64) -> Self {
        Key::String(n.to_string())
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::String(n.to_string())
    }
}

/// Reject keys the engine must never see: empty bytes or an empty string
pub fn check_key(key: &Key) -> Result<()> {
    match key {
        Key::Bytes(b) if b.is_empty() => Err(EmberError::InvalidKey(
            "key cannot be an empty Buffer".to_string(),
        )),
        Key::String(s) if s.is_empty() => Err(EmberError::InvalidKey(
            "key cannot be an empty String".to_string(),
        )),
        _ => Ok(()),
    }
}

// =============================================================================
// Values
// =============================================================================

/// An application value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Bytes),
    String(String),
    Json(serde_json::Value),
}

impl Value {
    /// Convert any serializable type into a JSON value
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Value::Json)
            .map_err(|e| EmberError::Serialization(format!("JSON encode failed: {}", e)))
    }

    /// The absent value; stored as an empty byte string
    pub fn null() -> Self {
        Value::Json(serde_json::Value::Null)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            Value::Json(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Value::Json(serde_json::Value::Null))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Serialization functions selected by a handle's encodings
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    key_encoding: KeyEncoding,
    value_encoding: ValueEncoding,
    json_decode: JsonDecode,
}

impl Codec {
    pub fn new(
        key_encoding: KeyEncoding,
        value_encoding: ValueEncoding,
        json_decode: JsonDecode,
    ) -> Self {
        Self {
            key_encoding,
            value_encoding,
            json_decode,
        }
    }

    pub fn key_encoding(&self) -> KeyEncoding {
        self.key_encoding
    }

    pub fn value_encoding(&self) -> ValueEncoding {
        self.value_encoding
    }

    /// Validate and serialize a key
    pub fn encode_key(&self, key: &Key) -> Result<Bytes> {
        check_key(key)?;
        Ok(key.to_bytes())
    }

    /// Serialize a value; `null` always becomes the empty byte string
    pub fn encode_value(&self, value: &Value) -> Result<Bytes> {
        if value.is_null() {
            return Ok(Bytes::new());
        }

        match (self.value_encoding, value) {
            (ValueEncoding::Json, Value::Bytes(b)) => to_json_bytes(&b[..]),
            (ValueEncoding::Json, Value::String(s)) => to_json_bytes(s),
            (_, Value::Json(v)) => to_json_bytes(v),
            (_, Value::Bytes(b)) => Ok(b.clone()),
            (_, Value::String(s)) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        }
    }

    /// Present a stored key
    pub fn decode_key(&self, raw: Bytes, as_buffer: bool) -> Key {
        match self.key_encoding {
            KeyEncoding::Buffer if as_buffer => Key::Bytes(raw),
            _ => Key::String(String::from_utf8_lossy(&raw).into_owned()),
        }
    }

    /// Deserialize a stored value
    pub fn decode_value(&self, raw: Bytes, as_buffer: bool) -> Result<Value> {
        match self.value_encoding {
            ValueEncoding::Buffer if as_buffer => Ok(Value::Bytes(raw)),
            ValueEncoding::Buffer | ValueEncoding::String => {
                Ok(Value::String(String::from_utf8_lossy(&raw).into_owned()))
            }
            ValueEncoding::Json => self.decode_json(&raw),
        }
    }

    fn decode_json(&self, raw: &[u8]) -> Result<Value> {
        if raw.is_empty() {
            return Ok(Value::null());
        }

        match serde_json::from_slice(raw) {
            Ok(v) => Ok(Value::Json(v)),
            Err(e) => match self.json_decode {
                JsonDecode::Lenient => {
                    tracing::warn!(
                        "Invalid JSON value {:?}: {}",
                        String::from_utf8_lossy(raw),
                        e
                    );
                    Ok(Value::null())
                }
                JsonDecode::Strict => Err(EmberError::Serialization(format!(
                    "Invalid JSON value: {}",
                    e
                ))),
            },
        }
    }
}

fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| EmberError::Serialization(format!("JSON encode failed: {}", e)))
}
