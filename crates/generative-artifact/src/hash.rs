//! Content-addressed hashing primitives
//!
//! Provides [`ContentHash`], a 32-byte Blake3 digest, and [`Fingerprint`],
//! the cache key derived from a unit's identity and one call's arguments.

use crate::call::CallContext;
use crate::unit::UnitId;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte content hash (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Compute Blake3 hash of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self::new(*hash.as_bytes())
    }

    /// Compute hash from serializable value (JSON encoding)
    ///
    /// # Errors
    /// Returns error if serialization fails
    #[inline]
    pub fn compute_serializable<T>(value: &T) -> Result<Self, HashError>
    where
        T: Serialize,
    {
        let json = serde_json::to_vec(value)?;
        Ok(Self::compute(&json))
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

/// Canonical payload hashed into a [`Fingerprint`]
///
/// Keyword arguments live in a `BTreeMap`, so the encoding is independent of
/// the order the caller supplied them in.
#[derive(Serialize)]
struct FingerprintPayload<'a> {
    unit: &'a UnitId,
    args: &'a [crate::Value],
    kwargs: &'a std::collections::BTreeMap<String, crate::Value>,
}

/// Deterministic cache key for one (unit, call) pair
///
/// Equal call contexts for the same unit produce equal fingerprints. The
/// unit's qualified name is part of the hashed payload, so two units never
/// share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// Derive the fingerprint for `unit` invoked with `call`
    ///
    /// # Errors
    /// Returns error if the arguments cannot be encoded
    pub fn compute(unit: &UnitId, call: &CallContext) -> Result<Self, HashError> {
        let payload = FingerprintPayload {
            unit,
            args: call.args(),
            kwargs: call.kwargs(),
        };
        ContentHash::compute_serializable(&payload).map(Self)
    }

    /// Underlying content hash
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.0
    }

    /// Key string used at the cache boundary
    #[inline]
    #[must_use]
    pub fn as_key(&self) -> String {
        self.0.to_string()
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for Fingerprint {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_key())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let key = <String as serde::Deserialize>::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when working with content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn content_hash_from_slice_invalid_length() {
        let bytes = vec![1u8; 31];
        let result = ContentHash::from_slice(&bytes);
        assert!(matches!(result, Err(HashError::InvalidLength { expected: 32, actual: 31 })));
    }

    #[test]
    fn content_hash_display_and_parse() {
        let hash = ContentHash::compute(b"test");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_string().starts_with(&hash.short()));
    }

    #[test]
    fn fingerprint_ignores_kwarg_insertion_order() {
        let unit = UnitId::new("add");
        let a = CallContext::new().kwarg("a", 1).kwarg("b", 2);
        let b = CallContext::new().kwarg("b", 2).kwarg("a", 1);

        assert_eq!(
            Fingerprint::compute(&unit, &a).unwrap(),
            Fingerprint::compute(&unit, &b).unwrap()
        );
    }

    #[test]
    fn fingerprint_separates_units() {
        let call = CallContext::positional([Value::Int(3), Value::Int(4)]);
        let add = Fingerprint::compute(&UnitId::new("add"), &call).unwrap();
        let mul = Fingerprint::compute(&UnitId::new("multiply"), &call).unwrap();
        let scoped = Fingerprint::compute(&UnitId::scoped("Calc", "add"), &call).unwrap();

        assert_ne!(add, mul);
        assert_ne!(add, scoped);
    }

    #[test]
    fn fingerprint_separates_arguments() {
        let unit = UnitId::new("add");
        let a = Fingerprint::compute(&unit, &CallContext::positional([Value::Int(1)])).unwrap();
        let b = Fingerprint::compute(&unit, &CallContext::positional([Value::Int(2)])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_key_round_trips() {
        let fp = Fingerprint::compute(&UnitId::new("f"), &CallContext::new()).unwrap();
        let parsed: Fingerprint = fp.as_key().parse().unwrap();
        assert_eq!(fp, parsed);
        assert_eq!(fp.as_key().len(), 64);
    }
}
