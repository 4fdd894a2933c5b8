#![no_main]

use libfuzzer_sys::fuzz_target;
use witrack_core::model::field_definition::decode_fields;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(fields) = decode_fields(json) else {
        return;
    };

    // Anything that decodes must encode and decode to the same set.
    let encoded = serde_json::to_string(&fields).expect("field set encodes");
    let decoded = decode_fields(&encoded).expect("encoded field set decodes");
    assert_eq!(decoded, fields);
});
