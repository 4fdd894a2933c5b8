#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use witrack_core::model::{FieldType, Kind};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(value) = serde_json::from_slice::<Value>(rest) else {
        return;
    };

    let simple: Vec<Kind> = Kind::ALL.into_iter().filter(|kind| kind.is_simple()).collect();
    let kind = simple[usize::from(selector) % simple.len()];
    let field = if selector & 0x80 == 0 {
        FieldType::simple(kind)
    } else {
        FieldType::list(kind)
    }
    .expect("simple kinds build");

    // Storage form must convert back, and converting that wire form again
    // must land on the same storage form.
    if let Ok(stored) = field.convert_to_model(&value) {
        let wire = field.convert_from_model(&stored).expect("stored value converts back");
        let again = field.convert_to_model(&wire).expect("canonical wire value converts");
        assert_eq!(again, stored);
    }
});
