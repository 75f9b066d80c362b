//! Encode/decode engine: derives the wire behavior of every field kind and
//! binds them into the per-type `encode`/`decode` operations.
//!
//! Fields are processed in declaration order on a shared bit cursor, so a
//! subrecord may begin mid-byte. Two gates run before every field codec:
//! the version gate (a missing runtime version admits everything) and the
//! conditional gate (an absent sibling slot elides the field). Decode applies
//! the same gates against the partially decoded record, which is why gates
//! and length fields must be declared before their dependents.

use crate::bits::{BitReader, BitWriter, BitsError};
use crate::schema::{FieldDescriptor, FieldKind, PduType, SkipWidth};
use crate::value::{Record, Value};
use crate::version::Version;
use log::trace;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("field `{field}`: binary value is {actual} bytes, needs {expected}")]
    BinaryTooShort { field: String, expected: usize, actual: usize },
    #[error("field `{field}`: no value and no default")]
    MissingValue { field: String },
    #[error("unknown field `{field}`")]
    UnknownField { field: String },
    #[error("in subrecord `{field}`: {source}")]
    Nested {
        field: String,
        #[source]
        source: Box<EncodeError>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("field `{field}`: constant mismatch: expected {expected:#x}, found {found:#x}")]
    ConstantMismatch { field: String, expected: u64, found: u64 },
    #[error("field `{field}`: {source}")]
    ShortInput {
        field: String,
        #[source]
        source: BitsError,
    },
    #[error("in subrecord `{field}`: {source}")]
    Nested {
        field: String,
        #[source]
        source: Box<DecodeError>,
    },
}

/// Version gate: no runtime version, or no predicate, admits the field.
pub(crate) fn version_admits(version: Option<&Version>, f: &FieldDescriptor) -> bool {
    match (&f.version, version) {
        (Some(req), Some(v)) => req.matches(v),
        _ => true,
    }
}

/// Conditional gate: the field is elided when its gate slot is absent.
pub(crate) fn conditionally_absent(record: &Record, f: &FieldDescriptor) -> bool {
    match &f.conditional {
        Some(gate) => record.is_absent(gate),
        None => false,
    }
}

impl PduType {
    /// Serialize `pdu` for the given version (or the current layout when
    /// `None`). Offset-to fields are filled in first; missing slots fall back
    /// to declared defaults.
    pub fn encode(&self, pdu: &Record, version: Option<&Version>) -> Result<Vec<u8>, EncodeError> {
        let staged = self.set_offsets(pdu.clone(), version)?;
        let mut w = BitWriter::new();
        self.encode_into(&staged, version, &mut w)?;
        trace!("encode `{}`: {} bits", self.name(), w.bit_len());
        Ok(w.into_bytes())
    }

    /// Append `pdu`'s admitted fields to an in-progress bit string. The
    /// record must already have gone through `set_offsets`.
    pub(crate) fn encode_into(
        &self,
        pdu: &Record,
        version: Option<&Version>,
        w: &mut BitWriter,
    ) -> Result<(), EncodeError> {
        for f in self.fields() {
            if !version_admits(version, f) || conditionally_absent(pdu, f) {
                continue;
            }
            encode_field(f, pdu, version, w)?;
        }
        Ok(())
    }

    /// Parse a prefix of `bytes` into a copy of `prototype`, returning the
    /// record and the unread remainder. Fields excluded by the version gate
    /// keep their prototype defaults and consume nothing.
    pub fn decode<'a>(
        &self,
        prototype: &Record,
        bytes: &'a [u8],
        version: Option<&Version>,
    ) -> Result<(Record, &'a [u8]), DecodeError> {
        let mut r = BitReader::new(bytes);
        let mut acc = prototype.clone();
        self.decode_fields(&mut acc, &mut r, version)?;
        let rest = r.remainder();
        trace!(
            "decode `{}`: {} bits consumed, {} bytes remaining",
            self.name(),
            r.position(),
            rest.len()
        );
        Ok((acc, rest))
    }

    pub(crate) fn decode_fields(
        &self,
        acc: &mut Record,
        r: &mut BitReader<'_>,
        version: Option<&Version>,
    ) -> Result<(), DecodeError> {
        for f in self.fields() {
            if !version_admits(version, f) || conditionally_absent(acc, f) {
                continue;
            }
            decode_field(f, acc, version, r)?;
        }
        Ok(())
    }
}

/// The staged slot value handed to custom encoders: slot, else default,
/// else `Nil`.
fn staged_value(f: &FieldDescriptor, pdu: &Record) -> Value {
    match pdu.get(&f.name) {
        Some(v) if *v != Value::Nil => v.clone(),
        _ => f.default.clone().unwrap_or(Value::Nil),
    }
}

fn uint_value(f: &FieldDescriptor, pdu: &Record) -> Result<u64, EncodeError> {
    pdu.uint(&f.name)
        .or_else(|| f.default.as_ref().and_then(Value::as_uint))
        .ok_or_else(|| EncodeError::MissingValue { field: f.name.clone() })
}

fn float_value(f: &FieldDescriptor, pdu: &Record) -> Result<f64, EncodeError> {
    pdu.float(&f.name)
        .or_else(|| f.default.as_ref().and_then(Value::as_f64))
        .ok_or_else(|| EncodeError::MissingValue { field: f.name.clone() })
}

fn bytes_value<'a>(f: &'a FieldDescriptor, pdu: &'a Record) -> Result<&'a [u8], EncodeError> {
    pdu.bytes(&f.name)
        .or_else(|| f.default.as_ref().and_then(Value::as_bytes))
        .ok_or_else(|| EncodeError::MissingValue { field: f.name.clone() })
}

/// Resolved width of a `skip` field in bits. Sibling-sized skips hold a byte
/// count in the referenced slot.
pub(crate) fn skip_bits(width: &SkipWidth, record: &Record) -> u64 {
    match width {
        SkipWidth::Bits(w) => *w as u64,
        SkipWidth::LengthField(name) => record.uint(name).unwrap_or(0) * 8,
    }
}

fn encode_field(
    f: &FieldDescriptor,
    pdu: &Record,
    version: Option<&Version>,
    w: &mut BitWriter,
) -> Result<(), EncodeError> {
    if let Some(enc) = &f.encode_override {
        let value = staged_value(f, pdu);
        return (enc.as_ref())(&value, w);
    }
    match &f.kind {
        FieldKind::Integer { width } => {
            let v = uint_value(f, pdu)?;
            w.put_uint(v, *width, f.endianness.resolve());
        }
        FieldKind::Float { width } => {
            let v = float_value(f, pdu)?;
            let raw = if *width == 32 {
                (v as f32).to_bits() as u64
            } else {
                v.to_bits()
            };
            w.put_uint(raw, *width, f.endianness.resolve());
        }
        FieldKind::Binary { len } => {
            let b = bytes_value(f, pdu)?;
            if b.len() < *len {
                return Err(EncodeError::BinaryTooShort {
                    field: f.name.clone(),
                    expected: *len,
                    actual: b.len(),
                });
            }
            w.put_bytes(&b[..*len]);
        }
        FieldKind::Str { len } => {
            let b = bytes_value(f, pdu)?;
            let n = b.len().min(*len);
            w.put_bytes(&b[..n]);
            for _ in n..*len {
                w.put_bits(0, 8);
            }
        }
        FieldKind::Constant { width } => {
            let v = f
                .default
                .as_ref()
                .and_then(Value::as_uint)
                .ok_or_else(|| EncodeError::MissingValue { field: f.name.clone() })?;
            w.put_uint(v, *width, f.endianness.resolve());
        }
        FieldKind::Subrecord { inner } => {
            let rec = pdu
                .record(&f.name)
                .or_else(|| f.default.as_ref().and_then(Value::as_record))
                .cloned()
                .unwrap_or_else(|| inner.prototype());
            let staged = inner
                .set_offsets(rec, version)
                .map_err(|e| EncodeError::Nested { field: f.name.clone(), source: Box::new(e) })?;
            inner
                .encode_into(&staged, version, w)
                .map_err(|e| EncodeError::Nested { field: f.name.clone(), source: Box::new(e) })?;
        }
        FieldKind::Virtual => {}
        FieldKind::Variable { len_field } => {
            let n = pdu.uint(len_field).unwrap_or(0) as usize;
            if n == 0 {
                return Ok(());
            }
            let b = bytes_value(f, pdu)?;
            if b.len() < n {
                return Err(EncodeError::BinaryTooShort {
                    field: f.name.clone(),
                    expected: n,
                    actual: b.len(),
                });
            }
            w.put_bytes(&b[..n]);
        }
        FieldKind::Skip { width } => {
            let bits = skip_bits(width, pdu);
            let v = f.default.as_ref().and_then(Value::as_uint).unwrap_or(0);
            if bits > 64 {
                // Right-align the default under leading zeros.
                let mut lead = bits - 64;
                while lead > 0 {
                    let chunk = lead.min(32) as u32;
                    w.put_bits(0, chunk);
                    lead -= chunk as u64;
                }
                w.put_uint(v, 64, f.endianness.resolve());
            } else {
                w.put_uint(v, bits as u32, f.endianness.resolve());
            }
        }
    }
    Ok(())
}

fn decode_field(
    f: &FieldDescriptor,
    acc: &mut Record,
    version: Option<&Version>,
    r: &mut BitReader<'_>,
) -> Result<(), DecodeError> {
    let short = |source: BitsError| DecodeError::ShortInput { field: f.name.clone(), source };
    if let Some(dec) = &f.decode_override {
        let v = (dec.as_ref())(r)?;
        acc.set(&f.name, v);
        return Ok(());
    }
    match &f.kind {
        FieldKind::Integer { width } => {
            let v = r.take_uint(*width, f.endianness.resolve()).map_err(short)?;
            acc.set(&f.name, Value::Uint(v));
        }
        FieldKind::Float { width } => {
            let raw = r.take_uint(*width, f.endianness.resolve()).map_err(short)?;
            let v = if *width == 32 {
                f32::from_bits(raw as u32) as f64
            } else {
                f64::from_bits(raw)
            };
            acc.set(&f.name, Value::Float(v));
        }
        FieldKind::Binary { len } => {
            let b = r.take_bytes(*len).map_err(short)?;
            acc.set(&f.name, Value::Bytes(b));
        }
        FieldKind::Str { len } => {
            let mut b = r.take_bytes(*len).map_err(short)?;
            while b.last() == Some(&0) {
                b.pop();
            }
            acc.set(&f.name, Value::Str(String::from_utf8_lossy(&b).into_owned()));
        }
        FieldKind::Constant { width } => {
            let found = r.take_uint(*width, f.endianness.resolve()).map_err(short)?;
            let expected = f.default.as_ref().and_then(Value::as_uint).unwrap_or(0);
            if found != expected {
                return Err(DecodeError::ConstantMismatch {
                    field: f.name.clone(),
                    expected,
                    found,
                });
            }
        }
        FieldKind::Subrecord { inner } => {
            let mut sub = acc
                .record(&f.name)
                .or_else(|| f.default.as_ref().and_then(Value::as_record))
                .cloned()
                .unwrap_or_else(|| inner.prototype());
            inner
                .decode_fields(&mut sub, r, version)
                .map_err(|e| DecodeError::Nested { field: f.name.clone(), source: Box::new(e) })?;
            acc.set(&f.name, Value::Record(sub));
        }
        FieldKind::Virtual => {
            acc.set(&f.name, f.default.clone().unwrap_or(Value::Nil));
        }
        FieldKind::Variable { len_field } => {
            let n = acc.uint(len_field).unwrap_or(0) as usize;
            let b = r.take_bytes(n).map_err(short)?;
            acc.set(&f.name, Value::Bytes(b));
        }
        FieldKind::Skip { width } => {
            let bits = skip_bits(width, acc);
            r.skip(bits as usize).map_err(short)?;
        }
    }
    Ok(())
}
