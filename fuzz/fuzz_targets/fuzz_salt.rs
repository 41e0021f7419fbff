#![no_main]

use libfuzzer_sys::fuzz_target;
use sigil_seal_core::{validate_salt, SALT_CONSTANT};

fuzz_target!(|data: &[u8]| {
    // Must never panic; acceptance is exactly "tag plus at least one byte"
    let accepted = validate_salt(data).is_ok();
    assert_eq!(
        accepted,
        data.len() > SALT_CONSTANT.len() && data.starts_with(SALT_CONSTANT)
    );

    // Anything appended to the tag is a valid salt
    let mut salt = SALT_CONSTANT.to_vec();
    salt.extend_from_slice(data);
    assert_eq!(validate_salt(&salt).is_ok(), !data.is_empty());
});
