#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sigil_seal_core::{choose_challenge_algorithm, SignatureAlgorithm};

#[derive(Arbitrary, Debug)]
struct Input {
    picks: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let algorithms: Vec<SignatureAlgorithm> = input
        .picks
        .iter()
        .map(|b| SignatureAlgorithm::ALL[(*b as usize) % SignatureAlgorithm::ALL.len()])
        .collect();

    match choose_challenge_algorithm(&algorithms) {
        None => assert!(algorithms.is_empty()),
        Some(chosen) => {
            assert!(algorithms.contains(&chosen));
            if chosen.is_sha1() {
                assert!(algorithms.iter().all(|a| a.is_sha1()));
            } else {
                let first = algorithms.iter().find(|a| !a.is_sha1());
                assert_eq!(first, Some(&chosen));
            }
        }
    }
});
