//! Runtime values: field slots and PDU records.

use std::collections::HashMap;

/// A single field slot value.
///
/// Integers are held as unsigned bit patterns regardless of declared width;
/// both float widths share the `f64` slot. `Nil` marks an empty slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Uint(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Record(Record),
}

impl Value {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Byte view shared by `binary`, `string` and `variable` fields: `Str`
    /// values encode as their UTF-8 bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Three-valued absence test used by conditional gates: `Nil`, integer
    /// zero, and empty strings/byte strings all count as absent.
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Uint(x) => *x == 0,
            Value::Str(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }
}

/// A PDU value: one slot per non-`constant` field of its type.
///
/// Constant fields exist only on the wire; `virtual` fields exist only here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    slots: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Chained slot assignment, for building call-site records.
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.slots.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }

    pub fn uint(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_uint)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Value::as_bytes)
    }

    pub fn str_(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Value::as_record)
    }

    /// Absence test over a slot: a missing slot is absent, otherwise the
    /// value decides (see [`Value::is_absent`]).
    pub fn is_absent(&self, name: &str) -> bool {
        match self.get(name) {
            Some(v) => v.is_absent(),
            None => true,
        }
    }
}
