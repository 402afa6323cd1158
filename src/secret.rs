//! Instance secret and its constant-time verification.
//!
//! The secret is the only long-lived credential of a preview instance. It is
//! presented once through the bootstrap URL (or the token header) and then
//! traded for a session cookie.
//!
//! # Timing Behavior
//!
//! [`Secret::is_valid`] never exits early:
//!
//! - Bytes are compared with [`subtle::ConstantTimeEq`], so the position of the
//!   first mismatch is not observable.
//! - A credential of the wrong length is still compared, byte for byte, against
//!   a zeroed buffer of its own length. Every call performs exactly one
//!   comparison over `presented.len()` bytes whatever the outcome.

use std::fmt;

use subtle::{Choice, ConstantTimeEq};

/// Number of random bytes in a generated secret (hex-encoded to twice as many chars).
pub const GENERATED_SECRET_BYTES: usize = 32;

/// Per-instance access secret.
///
/// `Debug` output is redacted so the value never ends up in logs. There is no
/// `PartialEq`; compare credentials with [`Secret::is_valid`].
#[derive(Clone)]
pub struct Secret {
    value: String,
}

impl Secret {
    /// Wrap an externally assigned secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Generate a random hex-encoded secret.
    pub fn generate() -> Self {
        let bytes: [u8; GENERATED_SECRET_BYTES] = rand::random();
        Self::new(hex::encode(bytes))
    }

    /// The raw secret, for building bootstrap URLs.
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Length of the secret in bytes.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Check a presented credential against the secret in constant time.
    ///
    /// Returns `true` only when `presented` is byte-for-byte equal to the secret.
    pub fn is_valid(&self, presented: &[u8]) -> bool {
        self.verify_with(presented, |a, b| a.ct_eq(b))
    }

    /// Comparison core, parameterized over the byte comparison so the number
    /// and width of comparisons can be observed in tests.
    fn verify_with<F>(&self, presented: &[u8], mut eq: F) -> bool
    where
        F: FnMut(&[u8], &[u8]) -> Choice,
    {
        let expected = self.value.as_bytes();
        let same_len = (presented.len() as u64).ct_eq(&(expected.len() as u64));

        // Wrong-length credentials are compared against zeros of their own length.
        let mut comparand = vec![0u8; presented.len()];
        if bool::from(same_len) {
            comparand.copy_from_slice(expected);
        }

        bool::from(eq(presented, &comparand) & same_len)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.value.len())
            .finish_non_exhaustive()
    }
}
