//! Size and offset introspection: structure-only traversal of a record
//! following the declared layout, without touching wire bytes.
//!
//! `sizeof`/`sizeof_pdu` report runtime sizes (variable fields read their
//! sibling length slot, gated fields report 0 when excluded). `set_offsets`
//! is the fixup pass encode runs first: it fills every offset-to field with
//! the byte distance from PDU start to its target, or 0 when the target is
//! absent under the active filters.

use crate::codec::{conditionally_absent, skip_bits, version_admits, EncodeError};
use crate::schema::{FieldDescriptor, FieldKind, PduType};
use crate::value::{Record, Value};
use crate::version::Version;
use log::trace;

/// Unit for [`PduType::sizeof_pdu`] results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Bits,
    Bytes,
}

impl PduType {
    /// Runtime size of one field in bits, for this record.
    ///
    /// Virtual fields and conditionally elided fields report 0; variable
    /// fields report their sibling length × 8; subrecords report their full
    /// recursive size. No version filter is applied (pass the version to
    /// [`PduType::sizeof_pdu`] for whole-PDU sizing).
    pub fn sizeof(&self, pdu: &Record, field: &str) -> Result<u64, EncodeError> {
        let f = self
            .field(field)
            .ok_or_else(|| EncodeError::UnknownField { field: field.to_string() })?;
        if conditionally_absent(pdu, f) {
            return Ok(0);
        }
        field_bits(f, pdu, None)
    }

    /// Whole-PDU size under the given version, in bits or bytes.
    pub fn sizeof_pdu(
        &self,
        pdu: &Record,
        version: Option<&Version>,
        unit: SizeUnit,
    ) -> Result<u64, EncodeError> {
        let bits = self.record_bits(pdu, version)?;
        Ok(match unit {
            SizeUnit::Bits => bits,
            SizeUnit::Bytes => bits / 8,
        })
    }

    /// Sum in bits over all fields surviving the version and conditional
    /// filters, recursing into subrecords.
    pub(crate) fn record_bits(
        &self,
        pdu: &Record,
        version: Option<&Version>,
    ) -> Result<u64, EncodeError> {
        let mut bits = 0;
        for f in self.fields() {
            if !version_admits(version, f) || conditionally_absent(pdu, f) {
                continue;
            }
            bits += field_bits(f, pdu, version)?;
        }
        Ok(bits)
    }

    /// Fill in every offset-to field, in declaration order, against the
    /// already-updated record: an offset field may act as the conditional
    /// gate of a later field and feed later offset computations.
    pub fn set_offsets(
        &self,
        mut pdu: Record,
        version: Option<&Version>,
    ) -> Result<Record, EncodeError> {
        for i in 0..self.fields().len() {
            let Some(target) = self.fields()[i].offset_to.clone() else {
                continue;
            };
            let off = self.offset_of(&pdu, &target, version)?.unwrap_or(0);
            let name = self.fields()[i].name.clone();
            trace!("set_offsets `{}`: {} -> {}", self.name(), name, off);
            pdu.set(&name, Value::Uint(off));
        }
        Ok(pdu)
    }

    /// Byte distance from PDU start to `target`'s first bit, or `None` when
    /// the target is excluded by the version filter or its conditional gate.
    fn offset_of(
        &self,
        pdu: &Record,
        target: &str,
        version: Option<&Version>,
    ) -> Result<Option<u64>, EncodeError> {
        let idx = self
            .field_index(target)
            .ok_or_else(|| EncodeError::UnknownField { field: target.to_string() })?;
        let tf = &self.fields()[idx];
        if !version_admits(version, tf) || conditionally_absent(pdu, tf) {
            return Ok(None);
        }
        let mut bits = 0;
        for f in &self.fields()[..idx] {
            if !version_admits(version, f) || conditionally_absent(pdu, f) {
                continue;
            }
            bits += field_bits(f, pdu, version)?;
        }
        Ok(Some(bits / 8))
    }
}

fn field_bits(
    f: &FieldDescriptor,
    pdu: &Record,
    version: Option<&Version>,
) -> Result<u64, EncodeError> {
    Ok(match &f.kind {
        FieldKind::Integer { width }
        | FieldKind::Float { width }
        | FieldKind::Constant { width } => *width as u64,
        FieldKind::Binary { len } | FieldKind::Str { len } => *len as u64 * 8,
        FieldKind::Virtual => 0,
        FieldKind::Variable { len_field } => pdu.uint(len_field).unwrap_or(0) * 8,
        FieldKind::Skip { width } => skip_bits(width, pdu),
        FieldKind::Subrecord { inner } => {
            if let Some(sub) = pdu
                .record(&f.name)
                .or_else(|| f.default.as_ref().and_then(Value::as_record))
            {
                inner.record_bits(sub, version)?
            } else {
                inner.record_bits(&inner.prototype(), version)?
            }
        }
    })
}
