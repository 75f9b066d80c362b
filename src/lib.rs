//! # pducodec: declarative bit-precise PDU codec
//!
//! Describe a Protocol Data Unit as an ordered list of named, typed fields
//! with bit-precise widths; get back, per PDU type, matched encode/decode
//! routines plus size and offset introspection.
//!
//! ## Field kinds
//!
//! - `integer` (1..=64 bits), `float` (32/64), `binary`, `string`
//! - `constant` (on the wire, not in records), `virtual` (in records, not on
//!   the wire), `skip` (reserved spans)
//! - `variable` (length held by an earlier integer sibling)
//! - `subrecord` (a nested PDU type, encoded in place)
//!
//! Per-field properties: endianness (big default, little, native), defaults,
//! version predicates (`">= 2.0.0"`, `"~> 2.1"`, ...), conditional presence
//! gated on a sibling slot, offset-to self-references, and custom
//! encode/decode overrides.
//!
//! ## Example
//!
//! ```
//! use pducodec::{Field, PduBuilder, Record, Value};
//!
//! let ty = PduBuilder::new("Packet")
//!     .field(Field::constant("magic", 16, 0xCAFE))
//!     .field(Field::integer("kind", 4))
//!     .field(Field::integer("flags", 4))
//!     .field(Field::integer("len", 16))
//!     .field(Field::variable("payload", "len"))
//!     .build()?;
//!
//! let pdu = Record::new()
//!     .with("kind", Value::Uint(2))
//!     .with("flags", Value::Uint(1))
//!     .with("len", Value::Uint(2))
//!     .with("payload", Value::Bytes(vec![0xAA, 0xBB]));
//!
//! let bytes = ty.encode(&pdu, None)?;
//! assert_eq!(bytes, vec![0xCA, 0xFE, 0x21, 0x00, 0x02, 0xAA, 0xBB]);
//!
//! let (decoded, rest) = ty.decode(&ty.prototype(), &bytes, None)?;
//! assert_eq!(decoded.uint("kind"), Some(2));
//! assert!(rest.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Wire format
//!
//! Fields are concatenated at bit level: field *i*'s MSB immediately follows
//! field *i-1*'s LSB, no inter-field padding. The validator requires the
//! fixed layout of every type to be a whole number of bytes.
//!
//! ## Versioning
//!
//! A field gated with [`Field::when`] contributes bytes only when the runtime
//! version satisfies its predicate; passing `None` as the version means
//! "current" and admits everything. One PDU type thus serves all historical
//! layouts of a protocol.
//!
//! Encode, decode and the introspection calls are pure functions of their
//! arguments; sealed [`PduType`]s are immutable and freely shared across
//! threads.

pub mod bits;
pub mod codec;
pub mod layout;
pub mod schema;
pub mod validate;
pub mod value;
pub mod version;

pub use bits::{BitReader, BitWriter, BitsError};
pub use codec::{DecodeError, EncodeError};
pub use layout::SizeUnit;
pub use schema::{Endianness, Field, FieldDescriptor, FieldKind, PduBuilder, PduType, SkipWidth};
pub use validate::SchemaError;
pub use value::{Record, Value};
pub use version::{Version, VersionError, VersionReq};
