//! Salt construction and validation
//!
//! A salt is a fixed constant tag followed by random bytes. The tag lets the
//! signing authority (and anyone auditing its logs) recognize that the value
//! it is asked to sign is a salt and not, say, a login challenge. A salt that
//! lacks the tag or the random part is treated as corrupted state.

use rand::RngCore;

use crate::error::{Error, Result};

/// Fixed prefix of every salt
///
/// MUST NOT change: salts persisted by earlier versions are validated against it.
pub const SALT_CONSTANT: &[u8] = b"Sigil challenge credentials salt v1\0";

/// Number of random bytes appended to the constant
pub const SALT_RANDOM_BYTES: usize = 20;

/// Generate a fresh salt: `SALT_CONSTANT || random`
pub fn generate_salt() -> Vec<u8> {
    let mut random = [0u8; SALT_RANDOM_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut random);

    let mut salt = Vec::with_capacity(SALT_CONSTANT.len() + SALT_RANDOM_BYTES);
    salt.extend_from_slice(SALT_CONSTANT);
    salt.extend_from_slice(&random);
    salt
}

/// Check that a persisted salt is tag-prefixed and has a random suffix
pub fn validate_salt(salt: &[u8]) -> Result<()> {
    if salt.is_empty() {
        return Err(Error::MalformedSalt("salt is empty".to_string()));
    }
    if !salt.starts_with(SALT_CONSTANT) {
        return Err(Error::MalformedSalt(
            "salt does not start with the salt constant".to_string(),
        ));
    }
    if salt.len() == SALT_CONSTANT.len() {
        return Err(Error::MalformedSalt(
            "salt has no random suffix".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_salt_is_valid() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_CONSTANT.len() + SALT_RANDOM_BYTES);
        assert!(salt.starts_with(SALT_CONSTANT));
        validate_salt(&salt).unwrap();
    }

    #[test]
    fn test_generated_salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(validate_salt(&[]), Err(Error::MalformedSalt(_))));
    }

    #[test]
    fn test_rejects_bare_constant() {
        assert!(matches!(
            validate_salt(SALT_CONSTANT),
            Err(Error::MalformedSalt(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_prefix() {
        let mut salt = generate_salt();
        salt[0] ^= 0xFF;
        assert!(matches!(validate_salt(&salt), Err(Error::MalformedSalt(_))));

        // Shorter than the constant
        assert!(validate_salt(&SALT_CONSTANT[..4]).is_err());
    }

    #[test]
    fn test_accepts_single_random_byte() {
        let mut salt = SALT_CONSTANT.to_vec();
        salt.push(0);
        validate_salt(&salt).unwrap();
    }
}
