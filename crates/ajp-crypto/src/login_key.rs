//! Entropy seeds and computed keys for the AJP14 login
//!
//! Both values are 32 ASCII characters: the upper-case hex form of an MD5
//! digest. The backend picks a seed; both sides then derive the computed key
//! as `MD5(seed || secret)` and compare.

use crate::error::{CryptoError, Result};
use md5::{Digest, Md5};
use rand::{RngExt, rng};
use std::fmt;

/// Length of a seed or key in bytes
pub const KEY_LEN: usize = 32;

/// MD5 over the concatenated parts, as 32 upper-case hex characters
fn md5_upper_hex(parts: &[&[u8]]) -> [u8; KEY_LEN] {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(hex::encode_upper(digest).as_bytes());
    out
}

fn check_hex(bytes: &[u8]) -> Result<[u8; KEY_LEN]> {
    let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeySize {
        expected: KEY_LEN,
        actual: bytes.len(),
    })?;
    if !key.iter().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b)) {
        return Err(CryptoError::InvalidKeyFormat(
            String::from_utf8_lossy(&key).into_owned(),
        ));
    }
    Ok(key)
}

/// Random challenge sent by the backend in LOGIN_SEED
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntropySeed([u8; KEY_LEN]);

impl EntropySeed {
    /// Wrap seed bytes as received; no format check, backends may send any bytes
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a seed from its 32-character upper-case hex text
    pub fn from_hex(text: &str) -> Result<Self> {
        check_hex(text.as_bytes()).map(Self)
    }

    /// Fresh seed: the hex MD5 of 16 random bytes
    pub fn random() -> Self {
        let noise: [u8; 16] = rng().random();
        Self(md5_upper_hex(&[&noise]))
    }

    /// Raw bytes as they travel on the wire
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EntropySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntropySeed({})", String::from_utf8_lossy(&self.0))
    }
}

/// Proof of the shared secret sent in LOGIN_COMPLETE and SHUTDOWN
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputedKey([u8; KEY_LEN]);

impl ComputedKey {
    /// Derive the key for `seed` and `secret`
    pub fn compute(seed: &EntropySeed, secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        Ok(Self(md5_upper_hex(&[seed.as_bytes(), secret.as_bytes()])))
    }

    /// Wrap key bytes as received
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 32-character upper-case hex text
    pub fn from_hex(text: &str) -> Result<Self> {
        check_hex(text.as_bytes()).map(Self)
    }

    /// Raw bytes as they travel on the wire
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Whether `received` matches this key, in time independent of the contents
    pub fn verify(&self, received: &[u8]) -> bool {
        received.len() == KEY_LEN
            && self
                .0
                .iter()
                .zip(received)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl fmt::Display for ComputedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

// Never print the key itself in logs
impl fmt::Debug for ComputedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ComputedKey(..)")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_md5_known_values() {
        assert_eq!(&md5_upper_hex(&[b""]), b"D41D8CD98F00B204E9800998ECF8427E");
        assert_eq!(&md5_upper_hex(&[b"a", b"bc"]), b"900150983CD24FB0D6963F7D28E17F72");
    }

    #[test]
    fn test_computed_key_known_value() {
        let seed = EntropySeed::from_hex("0123456789ABCDEF0123456789ABCDEF")
            .expect("Operation should succeed");
        let key = ComputedKey::compute(&seed, "s3cret").expect("Operation should succeed");
        assert_eq!(key.to_string(), "D6EBE5A262B888CAD76F2F2C382BB42C");
    }

    #[test]
    fn test_computed_key_from_hashed_seed() {
        let seed = EntropySeed::from_bytes(md5_upper_hex(&[b"seed"]));
        assert_eq!(seed.as_bytes(), b"FE4C0F30AA359C41D9F9A5F69C8C4192");
        let key = ComputedKey::compute(&seed, "changeit").expect("Operation should succeed");
        assert_eq!(key.as_bytes(), b"FD847E2E93151DD818370230276218B1");
    }

    #[test]
    fn test_empty_secret_rejected() {
        let seed = EntropySeed::random();
        assert!(matches!(
            ComputedKey::compute(&seed, ""),
            Err(CryptoError::EmptySecret)
        ));
    }

    #[test]
    fn test_hex_parsing() {
        assert!(matches!(
            EntropySeed::from_hex("ABC"),
            Err(CryptoError::InvalidKeySize {
                expected: 32,
                actual: 3
            })
        ));
        assert!(matches!(
            ComputedKey::from_hex("d41d8cd98f00b204e9800998ecf8427e"),
            Err(CryptoError::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_random_seeds_differ() {
        let a = EntropySeed::random();
        let b = EntropySeed::random();
        assert_ne!(a, b);
        assert!(EntropySeed::from_hex(&String::from_utf8_lossy(a.as_bytes())).is_ok());
    }

    #[test]
    fn test_debug_hides_key() {
        let seed = EntropySeed::random();
        let key = ComputedKey::compute(&seed, "secret").unwrap();
        assert_eq!(format!("{key:?}"), "ComputedKey(..)");
    }

    proptest! {
        #[test]
        fn prop_key_is_deterministic(seed in any::<[u8; 32]>(), secret in "[ -~]{1,40}") {
            let seed = EntropySeed::from_bytes(seed);
            let a = ComputedKey::compute(&seed, &secret).unwrap();
            let b = ComputedKey::compute(&seed, &secret).unwrap();
            prop_assert_eq!(a, b);
            prop_assert!(a.verify(b.as_bytes()));
            prop_assert!(ComputedKey::from_hex(&a.to_string()).is_ok());
        }
    }
}
