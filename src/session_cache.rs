use hex;
use sha2::{Digest, Sha256};

/// Integrity-validated entries for the session cache.
///
/// Verified identities are cached by bearer token to skip identity-provider
/// round-trips. Each entry stores the identity JSON together with a SHA-256
/// checksum computed at insert time and re-checked on every read; an entry
/// that fails the check is discarded and the token re-verified upstream.

/// Wrapper for a cached session identity with integrity validation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedSessionEntry {
    /// The cached identity (JSON string).
    pub data: String,
    /// SHA-256 checksum of the data (hex encoded).
    pub checksum: String,
}

impl ValidatedSessionEntry {
    /// Creates a new entry with a computed checksum.
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    /// Computes the SHA-256 checksum of the data.
    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Validates the integrity of the cached identity.
    ///
    /// Returns true if the checksum matches, false if tampered.
    pub fn is_valid(&self) -> bool {
        let computed = Self::compute_checksum(&self.data);
        computed == self.checksum
    }

    /// Serializes the entry for storage in the cache.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserializes and validates a cached entry.
    ///
    /// Returns Some(identity JSON) if valid, None if corrupted or invalid
    /// JSON; callers fall back to a fresh token verification.
    pub fn deserialize_and_validate(serialized: &str) -> Option<String> {
        let entry: ValidatedSessionEntry = serde_json::from_str(serialized).ok()?;

        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Session cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            None
        }
    }
}
