//! Platform-state restrictions a sealed secret is bound to

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::sha256_multi;

/// PCR extended with the obfuscated username when a user session starts
pub const USER_PCR_INDEX: u32 = 4;

/// Size of a SHA-256 PCR bank value
pub const PCR_DIGEST_SIZE: usize = 32;

/// Expected PCR values; every listed PCR must match for unsealing to succeed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrRestriction {
    pub pcr_values: BTreeMap<u32, Vec<u8>>,
}

impl PcrRestriction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pcr(mut self, index: u32, value: Vec<u8>) -> Self {
        self.pcr_values.insert(index, value);
        self
    }

    /// Whether the given current PCR values satisfy this restriction
    pub fn is_satisfied_by(&self, current: &BTreeMap<u32, Vec<u8>>) -> bool {
        self.pcr_values
            .iter()
            .all(|(index, expected)| current.get(index) == Some(expected))
    }
}

/// Alternative restriction sets a secret is sealed against
///
/// The backend accepts unsealing when the restriction selected at unseal time
/// is satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRestrictions(pub Vec<PcrRestriction>);

impl PlatformRestrictions {
    /// Bind to the user PCR before and after the user's session is started
    ///
    /// Entry 0 expects the initial zero value, entry 1 the value after the
    /// PCR was extended with `obfuscated_username`.
    pub fn for_user(obfuscated_username: &str) -> Self {
        let initial = vec![0u8; PCR_DIGEST_SIZE];
        let extended = extend_pcr(&initial, obfuscated_username.as_bytes());
        Self(vec![
            PcrRestriction::new().with_pcr(USER_PCR_INDEX, initial),
            PcrRestriction::new().with_pcr(USER_PCR_INDEX, extended),
        ])
    }

    /// Restriction used for unsealing
    ///
    /// Secrets sealed with a single restriction use it in both modes.
    pub fn select(&self, locked_to_single_user: bool) -> Option<&PcrRestriction> {
        if locked_to_single_user {
            self.0.last()
        } else {
            self.0.first()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `new = SHA-256(old || SHA-256(data))`
pub fn extend_pcr(current: &[u8], data: &[u8]) -> Vec<u8> {
    let measurement = sha256_multi(&[data]);
    sha256_multi(&[current, &measurement]).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_user_two_entries() {
        let restrictions = PlatformRestrictions::for_user("user-hash");
        assert_eq!(restrictions.0.len(), 2);
        assert_ne!(restrictions.0[0], restrictions.0[1]);
        assert_eq!(
            restrictions.select(false).unwrap().pcr_values[&USER_PCR_INDEX],
            vec![0u8; PCR_DIGEST_SIZE]
        );
    }

    #[test]
    fn test_different_users_differ() {
        let a = PlatformRestrictions::for_user("alice");
        let b = PlatformRestrictions::for_user("bob");
        assert_eq!(a.0[0], b.0[0]);
        assert_ne!(a.0[1], b.0[1]);
    }

    #[test]
    fn test_satisfaction() {
        let restrictions = PlatformRestrictions::for_user("alice");
        let mut current = BTreeMap::new();
        current.insert(USER_PCR_INDEX, vec![0u8; PCR_DIGEST_SIZE]);

        assert!(restrictions.select(false).unwrap().is_satisfied_by(&current));
        assert!(!restrictions.select(true).unwrap().is_satisfied_by(&current));

        let extended = extend_pcr(&current[&USER_PCR_INDEX], b"alice");
        current.insert(USER_PCR_INDEX, extended);
        assert!(restrictions.select(true).unwrap().is_satisfied_by(&current));
    }

    #[test]
    fn test_empty_restriction_always_satisfied() {
        assert!(PcrRestriction::new().is_satisfied_by(&BTreeMap::new()));
    }
}
