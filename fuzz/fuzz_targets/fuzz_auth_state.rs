#![no_main]

use libfuzzer_sys::fuzz_target;
use sigil_seal_auth::AuthBlockState;

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = std::str::from_utf8(data) {
        if let Ok(state) = AuthBlockState::from_json(json) {
            let reserialized = state.to_json().unwrap();
            let state2 = AuthBlockState::from_json(&reserialized).unwrap();
            assert_eq!(state, state2);
        }
    }
});
