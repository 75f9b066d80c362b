//! Schema-time entities: field descriptors, the per-field and per-PDU
//! builders, and the sealed [`PduType`].
//!
//! A PDU type is described as an ordered list of named fields, built through
//! [`PduBuilder`] and validated once at definition time. After
//! [`PduBuilder::build`] succeeds the type is immutable; share it (e.g. as a
//! subrecord of other types) behind an [`Arc`].

use crate::bits::{self, BitReader, BitWriter};
use crate::codec::{DecodeError, EncodeError};
use crate::validate::{validate, SchemaError};
use crate::value::{Record, Value};
use crate::version::VersionReq;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Byte order of a multi-byte field. `Native` resolves to the target's order
/// at encode/decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
    Native,
}

impl Endianness {
    pub(crate) fn resolve(self) -> bits::Endianness {
        match self {
            Endianness::Big => bits::Endianness::Big,
            Endianness::Little => bits::Endianness::Little,
            Endianness::Native => {
                if cfg!(target_endian = "little") {
                    bits::Endianness::Little
                } else {
                    bits::Endianness::Big
                }
            }
        }
    }
}

/// Width of a `skip` field: a literal bit count, or the name of an earlier
/// integer sibling holding a byte count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipWidth {
    Bits(u32),
    LengthField(String),
}

/// The type of one field, with its size parameters.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Unsigned bit pattern of the given width (1..=64 bits).
    Integer { width: u32 },
    /// IEEE-754 single or double (width 32 or 64).
    Float { width: u32 },
    /// Exactly `len` bytes; strict on encode (`BinaryTooShort`).
    Binary { len: usize },
    /// `len` bytes, zero-padded on encode, trailing zeros stripped on decode.
    Str { len: usize },
    /// Fixed bit pattern present on the wire but absent from records.
    Constant { width: u32 },
    /// A nested PDU encoded/decoded in place with the same version.
    Subrecord { inner: Arc<PduType> },
    /// Record-only slot; contributes no wire bits.
    Virtual,
    /// Byte string whose length lives in an earlier integer sibling.
    Variable { len_field: String },
    /// Written from the default, consumed and discarded on decode.
    Skip { width: SkipWidth },
}

/// Custom per-field encoder: receives the staged slot value, appends raw bits.
pub type EncodeFn = dyn Fn(&Value, &mut BitWriter) -> Result<(), EncodeError> + Send + Sync;
/// Custom per-field decoder: consumes raw bits, returns the slot value.
pub type DecodeFn = dyn Fn(&mut BitReader<'_>) -> Result<Value, DecodeError> + Send + Sync;

/// One sealed field of a [`PduType`].
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub endianness: Endianness,
    pub default: Option<Value>,
    pub version: Option<VersionReq>,
    pub conditional: Option<String>,
    pub offset_to: Option<String>,
    pub(crate) encode_override: Option<Arc<EncodeFn>>,
    pub(crate) decode_override: Option<Arc<DecodeFn>>,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("endianness", &self.endianness)
            .field("default", &self.default)
            .field("version", &self.version)
            .field("conditional", &self.conditional)
            .field("offset_to", &self.offset_to)
            .field("custom_codec", &self.encode_override.is_some())
            .finish()
    }
}

impl FieldDescriptor {
    /// Declared wire width, counting only what is fixed at definition time.
    /// Variable fields, sibling-sized skips and virtual fields contribute 0.
    pub(crate) fn fixed_bits(&self) -> u64 {
        match &self.kind {
            FieldKind::Integer { width } | FieldKind::Float { width } | FieldKind::Constant { width } => {
                *width as u64
            }
            FieldKind::Binary { len } | FieldKind::Str { len } => *len as u64 * 8,
            FieldKind::Subrecord { inner } => inner.fixed_bit_len(),
            FieldKind::Skip { width: SkipWidth::Bits(w) } => *w as u64,
            FieldKind::Virtual
            | FieldKind::Variable { .. }
            | FieldKind::Skip { width: SkipWidth::LengthField(_) } => 0,
        }
    }
}

/// Builder for one field: a kind constructor plus chained properties.
pub struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) endianness: Endianness,
    pub(crate) default: Option<Value>,
    pub(crate) version: Option<String>,
    pub(crate) conditional: Option<String>,
    pub(crate) offset_to: Option<String>,
    pub(crate) encode_override: Option<Arc<EncodeFn>>,
    pub(crate) decode_override: Option<Arc<DecodeFn>>,
}

impl Field {
    fn new(name: &str, kind: FieldKind) -> Self {
        Field {
            name: name.to_string(),
            kind,
            endianness: Endianness::Big,
            default: None,
            version: None,
            conditional: None,
            offset_to: None,
            encode_override: None,
            decode_override: None,
        }
    }

    pub fn integer(name: &str, width: u32) -> Self {
        Field::new(name, FieldKind::Integer { width })
    }

    pub fn float(name: &str, width: u32) -> Self {
        Field::new(name, FieldKind::Float { width })
    }

    pub fn binary(name: &str, len: usize) -> Self {
        Field::new(name, FieldKind::Binary { len })
    }

    pub fn string(name: &str, len: usize) -> Self {
        Field::new(name, FieldKind::Str { len })
    }

    pub fn constant(name: &str, width: u32, value: u64) -> Self {
        Field::new(name, FieldKind::Constant { width }).default_value(Value::Uint(value))
    }

    /// Nested PDU field. The default record (the prototype handed to the
    /// nested decoder) is the inner type's own prototype unless overridden.
    pub fn subrecord(name: &str, inner: Arc<PduType>) -> Self {
        let proto = inner.prototype();
        Field::new(name, FieldKind::Subrecord { inner }).default_value(Value::Record(proto))
    }

    pub fn virtual_(name: &str) -> Self {
        Field::new(name, FieldKind::Virtual)
    }

    pub fn variable(name: &str, len_field: &str) -> Self {
        Field::new(name, FieldKind::Variable { len_field: len_field.to_string() })
    }

    /// Reserved bits of a literal width, written from the default (or zero).
    pub fn skip(name: &str, width: u32) -> Self {
        Field::new(name, FieldKind::Skip { width: SkipWidth::Bits(width) })
    }

    /// Skip whose byte count lives in an earlier integer sibling.
    pub fn skip_for(name: &str, len_field: &str) -> Self {
        Field::new(
            name,
            FieldKind::Skip { width: SkipWidth::LengthField(len_field.to_string()) },
        )
    }

    /// Integer field holding the byte offset from PDU start to `target`,
    /// filled in by `set_offsets` before every encode.
    pub fn offset(name: &str, width: u32, target: &str) -> Self {
        let mut f = Field::integer(name, width);
        f.offset_to = Some(target.to_string());
        f
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    pub fn endianness(mut self, e: Endianness) -> Self {
        self.endianness = e;
        self
    }

    pub fn little_endian(self) -> Self {
        self.endianness(Endianness::Little)
    }

    pub fn native_endian(self) -> Self {
        self.endianness(Endianness::Native)
    }

    /// Version gate: the field is only on the wire when the runtime version
    /// satisfies `predicate` (e.g. `">= 2.0.0"`, `"~> 2.1"`).
    pub fn when(mut self, predicate: &str) -> Self {
        self.version = Some(predicate.to_string());
        self
    }

    /// Conditional presence: the field is elided when the sibling `gate`
    /// slot is absent (nil, 0 or empty).
    pub fn conditional(mut self, gate: &str) -> Self {
        self.conditional = Some(gate.to_string());
        self
    }

    /// Replace the derived encoder. Must be paired with [`Field::decode_with`].
    pub fn encode_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &mut BitWriter) -> Result<(), EncodeError> + Send + Sync + 'static,
    {
        self.encode_override = Some(Arc::new(f));
        self
    }

    /// Replace the derived decoder. Must be paired with [`Field::encode_with`].
    pub fn decode_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut BitReader<'_>) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        self.decode_override = Some(Arc::new(f));
        self
    }
}

/// Ordered field list for one PDU type, pending validation.
pub struct PduBuilder {
    name: String,
    fields: Vec<Field>,
}

impl PduBuilder {
    pub fn new(name: &str) -> Self {
        PduBuilder { name: name.to_string(), fields: Vec::new() }
    }

    pub fn field(mut self, f: Field) -> Self {
        self.fields.push(f);
        self
    }

    /// Validate and seal the type. Any schema violation aborts construction.
    pub fn build(self) -> Result<PduType, SchemaError> {
        let PduBuilder { name, fields } = self;
        let mut descs = Vec::with_capacity(fields.len());
        for f in fields {
            let version = match f.version {
                Some(raw) => Some(VersionReq::parse(&raw).map_err(|source| {
                    SchemaError::BadVersionPredicate {
                        pdu: name.clone(),
                        field: f.name.clone(),
                        source,
                    }
                })?),
                None => None,
            };
            descs.push(FieldDescriptor {
                name: f.name,
                kind: f.kind,
                endianness: f.endianness,
                default: f.default,
                version,
                conditional: f.conditional,
                offset_to: f.offset_to,
                encode_override: f.encode_override,
                decode_override: f.decode_override,
            });
        }
        validate(&name, &descs)?;
        let by_name = descs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        let ty = PduType { name, fields: descs, by_name };
        debug!(
            "sealed pdu type `{}`: {} fields, {} fixed bits",
            ty.name,
            ty.fields.len(),
            ty.fixed_bit_len()
        );
        Ok(ty)
    }
}

/// A sealed PDU type: the ordered field descriptors plus the derived
/// operations (`encode`/`decode` in [`codec`](crate::codec), `sizeof`/
/// `sizeof_pdu`/`set_offsets` in [`layout`](crate::layout)).
///
/// Immutable after construction; safe to share across threads.
#[derive(Debug)]
pub struct PduType {
    name: String,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
}

impl PduType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Total declared fixed width in bits (variable parts excluded).
    pub fn fixed_bit_len(&self) -> u64 {
        self.fields.iter().map(FieldDescriptor::fixed_bits).sum()
    }

    /// The default record: declared defaults where present, `Nil` elsewhere.
    /// Constant fields get no slot. This is the `prototype` argument decode
    /// expects.
    pub fn prototype(&self) -> Record {
        let mut rec = Record::new();
        for f in &self.fields {
            if matches!(f.kind, FieldKind::Constant { .. }) {
                continue;
            }
            let slot = match (&f.default, &f.kind) {
                (Some(v), _) => v.clone(),
                (None, FieldKind::Subrecord { inner }) => Value::Record(inner.prototype()),
                (None, _) => Value::Nil,
            };
            rec.set(&f.name, slot);
        }
        rec
    }
}
