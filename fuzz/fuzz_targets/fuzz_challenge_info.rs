#![no_main]

use libfuzzer_sys::fuzz_target;
use sigil_seal_core::ChallengeInfo;

fuzz_target!(|data: &[u8]| {
    // Persisted challenge info comes from disk; parsing and validation must not panic
    if let Ok(info) = serde_json::from_slice::<ChallengeInfo>(data) {
        if let Ok(algorithm) = info.validate() {
            assert_eq!(info.salt_signature_algorithm, Some(algorithm));
        }
    }
});
