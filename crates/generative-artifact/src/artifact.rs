//! Synthesized artifacts and cache entries

use crate::call::CallContext;
use crate::hash::{ContentHash, Fingerprint};
use crate::unit::UnitId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the source text of an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Supplied explicitly by the embedding application
    Supplied,
    /// Read back from the cache
    Cached,
    /// Produced by an oracle during this call
    Oracle,
}

/// Validated, loadable synthesized code plus its entry-point name
///
/// Only the validator builds these; an artifact either passed every
/// validation stage or does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedArtifact {
    raw: String,
    source: String,
    entry_point: String,
    origin: Origin,
}

impl SynthesizedArtifact {
    /// Assemble an artifact from validator output
    #[must_use]
    pub fn new(
        raw: impl Into<String>,
        source: impl Into<String>,
        entry_point: impl Into<String>,
        origin: Origin,
    ) -> Self {
        Self {
            raw: raw.into(),
            source: source.into(),
            entry_point: entry_point.into(),
            origin,
        }
    }

    /// Text exactly as received
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Cleaned source text
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name of the single top-level function
    #[inline]
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Provenance of the source text
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Content hash of the cleaned source
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute(self.source.as_bytes())
    }
}

/// Record persisted by a cache backend after a successful synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Lookup key
    pub fingerprint: Fingerprint,
    /// Name of the unit the code was synthesized for
    pub unit_name: String,
    /// Positional arguments snapshot
    pub args: Vec<Value>,
    /// Keyword arguments snapshot
    pub kwargs: BTreeMap<String, Value>,
    /// Cleaned, accepted source text
    pub generated_code: String,
}

impl CacheEntry {
    /// Build the entry for `unit` called with `call`
    #[must_use]
    pub fn new(
        fingerprint: Fingerprint,
        unit: &UnitId,
        call: &CallContext,
        generated_code: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint,
            unit_name: unit.to_string(),
            args: call.args().to_vec(),
            kwargs: call.kwargs().clone(),
            generated_code: generated_code.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_entry_snapshots_call() {
        let unit = UnitId::new("add");
        let call = CallContext::positional([3, 4]);
        let fp = Fingerprint::compute(&unit, &call).unwrap();
        let entry = CacheEntry::new(fp, &unit, &call, "def add(a, b):\n    return a + b\n");

        assert_eq!(entry.unit_name, "add");
        assert_eq!(entry.args, vec![Value::Int(3), Value::Int(4)]);

        let json = serde_json::to_string(&entry).unwrap();
        let decoded: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn artifact_hash_tracks_source() {
        let a = SynthesizedArtifact::new("raw", "def f():\n    return 1\n", "f", Origin::Oracle);
        let b = SynthesizedArtifact::new("other raw", "def f():\n    return 1\n", "f", Origin::Cached);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.entry_point(), "f");
    }
}
