//! Definition-time schema validation.
//!
//! Runs once over the field list when a PDU type is built. Any finding is
//! fatal: the type is not constructed. Every error names the PDU and the
//! offending field.

use crate::schema::{Endianness, FieldDescriptor, FieldKind, SkipWidth};
use crate::value::Value;
use crate::version::VersionError;
use log::debug;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("pdu `{pdu}`: duplicate field name `{field}`")]
    DuplicateField { pdu: String, field: String },
    #[error("pdu `{pdu}`: fixed layout is {bits} bits, not a whole number of bytes")]
    MisalignedLayout { pdu: String, bits: u64 },
    #[error("pdu `{pdu}`: field `{field}`: integer width must be 1..=64, got {width}")]
    IntegerWidth { pdu: String, field: String, width: u32 },
    #[error("pdu `{pdu}`: field `{field}`: float width must be 32 or 64, got {width}")]
    FloatWidth { pdu: String, field: String, width: u32 },
    #[error("pdu `{pdu}`: field `{field}`: byte length must be at least 1")]
    ZeroLength { pdu: String, field: String },
    #[error("pdu `{pdu}`: field `{field}`: constant requires an integer default")]
    ConstantDefault { pdu: String, field: String },
    #[error("pdu `{pdu}`: field `{field}`: subrecord default must be a record")]
    SubrecordDefault { pdu: String, field: String },
    #[error("pdu `{pdu}`: field `{field}`: length field `{target}` must be an integer declared earlier")]
    BadLengthField { pdu: String, field: String, target: String },
    #[error("pdu `{pdu}`: field `{field}`: conditional gate `{target}` must be declared earlier")]
    BadConditionalGate { pdu: String, field: String, target: String },
    #[error("pdu `{pdu}`: field `{field}`: offset target `{target}` does not exist")]
    BadOffsetTarget { pdu: String, field: String, target: String },
    #[error("pdu `{pdu}`: field `{field}`: offset fields must be plain integers")]
    OffsetNotInteger { pdu: String, field: String },
    #[error("pdu `{pdu}`: field `{field}`: custom encode and decode must be supplied together")]
    HalfCustomCodec { pdu: String, field: String },
    #[error("pdu `{pdu}`: field `{field}`: little/native endianness requires a whole-byte width")]
    SubByteEndianness { pdu: String, field: String },
    #[error("pdu `{pdu}`: field `{field}`: bad version predicate: {source}")]
    BadVersionPredicate { pdu: String, field: String, source: VersionError },
}

pub(crate) fn validate(pdu: &str, fields: &[FieldDescriptor]) -> Result<(), SchemaError> {
    let err = |field: &FieldDescriptor, make: fn(String, String) -> SchemaError| {
        make(pdu.to_string(), field.name.clone())
    };

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (i, f) in fields.iter().enumerate() {
        if seen.insert(&f.name, i).is_some() {
            return Err(err(f, |pdu, field| SchemaError::DuplicateField { pdu, field }));
        }
    }

    // Has `name` been declared before field index `at`, and is it an integer?
    let earlier_integer = |name: &str, at: usize| {
        matches!(
            seen.get(name),
            Some(&idx) if idx < at && matches!(fields[idx].kind, FieldKind::Integer { .. })
        )
    };

    for (i, f) in fields.iter().enumerate() {
        match &f.kind {
            FieldKind::Integer { width } | FieldKind::Constant { width } => {
                if *width == 0 || *width > 64 {
                    let width = *width;
                    return Err(SchemaError::IntegerWidth {
                        pdu: pdu.to_string(),
                        field: f.name.clone(),
                        width,
                    });
                }
            }
            FieldKind::Float { width } => {
                if *width != 32 && *width != 64 {
                    return Err(SchemaError::FloatWidth {
                        pdu: pdu.to_string(),
                        field: f.name.clone(),
                        width: *width,
                    });
                }
            }
            FieldKind::Binary { len } | FieldKind::Str { len } => {
                if *len == 0 {
                    return Err(err(f, |pdu, field| SchemaError::ZeroLength { pdu, field }));
                }
            }
            FieldKind::Skip { width: SkipWidth::Bits(w) } => {
                if *w == 0 || *w > 64 {
                    return Err(SchemaError::IntegerWidth {
                        pdu: pdu.to_string(),
                        field: f.name.clone(),
                        width: *w,
                    });
                }
            }
            FieldKind::Variable { len_field } => {
                if !earlier_integer(len_field, i) {
                    return Err(SchemaError::BadLengthField {
                        pdu: pdu.to_string(),
                        field: f.name.clone(),
                        target: len_field.clone(),
                    });
                }
            }
            FieldKind::Skip { width: SkipWidth::LengthField(len_field) } => {
                if !earlier_integer(len_field, i) {
                    return Err(SchemaError::BadLengthField {
                        pdu: pdu.to_string(),
                        field: f.name.clone(),
                        target: len_field.clone(),
                    });
                }
            }
            FieldKind::Subrecord { .. } | FieldKind::Virtual => {}
        }

        if matches!(f.kind, FieldKind::Constant { .. })
            && !matches!(f.default, Some(Value::Uint(_)))
        {
            return Err(err(f, |pdu, field| SchemaError::ConstantDefault { pdu, field }));
        }
        if matches!(f.kind, FieldKind::Subrecord { .. })
            && !matches!(f.default, Some(Value::Record(_)))
        {
            return Err(err(f, |pdu, field| SchemaError::SubrecordDefault { pdu, field }));
        }

        if let Some(gate) = &f.conditional {
            let ok = matches!(seen.get(gate.as_str()), Some(&idx) if idx < i);
            if !ok {
                return Err(SchemaError::BadConditionalGate {
                    pdu: pdu.to_string(),
                    field: f.name.clone(),
                    target: gate.clone(),
                });
            }
        }

        if let Some(target) = &f.offset_to {
            if !matches!(f.kind, FieldKind::Integer { .. }) {
                return Err(err(f, |pdu, field| SchemaError::OffsetNotInteger { pdu, field }));
            }
            if !seen.contains_key(target.as_str()) {
                return Err(SchemaError::BadOffsetTarget {
                    pdu: pdu.to_string(),
                    field: f.name.clone(),
                    target: target.clone(),
                });
            }
        }

        if f.encode_override.is_some() != f.decode_override.is_some() {
            return Err(err(f, |pdu, field| SchemaError::HalfCustomCodec { pdu, field }));
        }

        if f.endianness != Endianness::Big {
            let whole_byte = match &f.kind {
                FieldKind::Integer { width }
                | FieldKind::Float { width }
                | FieldKind::Constant { width } => width % 8 == 0,
                _ => true,
            };
            if !whole_byte {
                return Err(err(f, |pdu, field| SchemaError::SubByteEndianness { pdu, field }));
            }
        }
    }

    let bits: u64 = fields.iter().map(FieldDescriptor::fixed_bits).sum();
    if bits % 8 != 0 {
        debug!("pdu `{pdu}` rejected: fixed layout is {bits} bits");
        return Err(SchemaError::MisalignedLayout { pdu: pdu.to_string(), bits });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, PduBuilder};
    use crate::value::Value;
    use std::sync::Arc;

    fn build(fields: Vec<Field>) -> Result<crate::schema::PduType, SchemaError> {
        let mut b = PduBuilder::new("T");
        for f in fields {
            b = b.field(f);
        }
        b.build()
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = build(vec![Field::integer("a", 8), Field::integer("a", 8)]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn misaligned_layout_is_rejected() {
        let err = build(vec![Field::integer("a", 12)]).unwrap_err();
        assert!(matches!(err, SchemaError::MisalignedLayout { bits: 12, .. }));
    }

    #[test]
    fn virtual_and_variable_do_not_count_toward_alignment() {
        let ty = build(vec![
            Field::integer("len", 8),
            Field::virtual_("ghost"),
            Field::variable("data", "len"),
        ])
        .expect("schema");
        assert_eq!(ty.fixed_bit_len(), 8);
    }

    #[test]
    fn integer_width_bounds() {
        assert!(matches!(
            build(vec![Field::integer("a", 0)]).unwrap_err(),
            SchemaError::IntegerWidth { width: 0, .. }
        ));
        assert!(matches!(
            build(vec![Field::integer("a", 65)]).unwrap_err(),
            SchemaError::IntegerWidth { width: 65, .. }
        ));
    }

    #[test]
    fn float_width_must_be_32_or_64() {
        let err = build(vec![Field::float("f", 16), Field::integer("pad", 16)]).unwrap_err();
        assert!(matches!(err, SchemaError::FloatWidth { width: 16, .. }));
    }

    #[test]
    fn constant_default_must_be_integer() {
        let err = build(vec![Field::constant("c", 8, 1).default_value(Value::Nil)]).unwrap_err();
        assert!(matches!(err, SchemaError::ConstantDefault { .. }));
    }

    #[test]
    fn variable_length_field_must_be_earlier_integer() {
        let err = build(vec![Field::variable("data", "len")]).unwrap_err();
        assert!(matches!(err, SchemaError::BadLengthField { .. }));

        let err = build(vec![
            Field::variable("data", "len"),
            Field::integer("len", 8),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::BadLengthField { .. }));

        let err = build(vec![
            Field::string("len", 1),
            Field::variable("data", "len"),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::BadLengthField { .. }));
    }

    #[test]
    fn conditional_gate_must_be_earlier() {
        let err = build(vec![
            Field::integer("a", 8).conditional("flag"),
            Field::integer("flag", 8),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::BadConditionalGate { .. }));
    }

    #[test]
    fn offset_target_must_exist_but_may_be_later() {
        let ok = build(vec![
            Field::offset("off", 16, "payload"),
            Field::integer("payload", 8),
        ]);
        assert!(ok.is_ok());

        let err = build(vec![Field::offset("off", 16, "nowhere")]).unwrap_err();
        assert!(matches!(err, SchemaError::BadOffsetTarget { .. }));
    }

    #[test]
    fn custom_codec_must_be_a_pair() {
        let err = build(vec![
            Field::integer("x", 8).encode_with(|_, _| Ok(())),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::HalfCustomCodec { .. }));
    }

    #[test]
    fn little_endian_needs_whole_bytes() {
        let err = build(vec![
            Field::integer("x", 12).little_endian(),
            Field::integer("pad", 4),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::SubByteEndianness { .. }));
    }

    #[test]
    fn bad_version_predicate_is_a_schema_error() {
        let err = build(vec![Field::integer("x", 8).when("latest")]).unwrap_err();
        assert!(matches!(err, SchemaError::BadVersionPredicate { .. }));
    }

    #[test]
    fn subrecord_alignment_counts_nested_width() {
        let inner = Arc::new(
            PduBuilder::new("Inner")
                .field(Field::integer("a", 8))
                .build()
                .expect("inner"),
        );
        let ty = build(vec![
            Field::integer("head", 8),
            Field::subrecord("sub", inner),
        ])
        .expect("schema");
        assert_eq!(ty.fixed_bit_len(), 16);
    }
}
