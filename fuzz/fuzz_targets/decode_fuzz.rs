//! Fuzz decode with arbitrary bytes over a schema that touches every field
//! kind. Decode must either produce a record or fail cleanly; it must never
//! panic or read out of bounds.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pducodec::{Field, PduBuilder, PduType, Value};
use std::sync::{Arc, OnceLock};

fn everything_pdu() -> &'static PduType {
    static TY: OnceLock<PduType> = OnceLock::new();
    TY.get_or_init(|| {
        let inner = Arc::new(
            PduBuilder::new("Inner")
                .field(Field::integer("x", 8))
                .build()
                .expect("inner schema"),
        );
        PduBuilder::new("Everything")
            .field(Field::constant("magic", 8, 0x7E))
            .field(Field::integer("bits", 12))
            .field(Field::integer("flag", 4))
            .field(Field::float("ratio", 32).little_endian())
            .field(Field::binary("raw", 2))
            .field(Field::string("name", 4))
            .field(Field::subrecord("sub", inner))
            .field(Field::virtual_("ghost").default_value(Value::Uint(1)))
            .field(Field::integer("len", 8))
            .field(Field::variable("data", "len"))
            .field(Field::skip("reserved", 8))
            .field(Field::integer("tail", 8).conditional("flag"))
            .build()
            .expect("schema")
    })
}

fuzz_target!(|data: &[u8]| {
    let ty = everything_pdu();
    let proto = ty.prototype();
    if let Ok((record, rest)) = ty.decode(&proto, data, None) {
        // Whatever decoded must re-encode without panicking, and the two
        // together must cover the input.
        let _ = ty.encode(&record, None);
        assert!(rest.len() <= data.len());
    }
});
