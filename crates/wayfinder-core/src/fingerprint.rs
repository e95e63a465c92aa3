//! Analysis fingerprints
//!
//! A [`Fingerprint`] is the derived identity of an [`AnalysisResult`]: a Blake3
//! hash over business name, target audience and content focus. Downstream
//! strategies and topics are only valid for the fingerprint they were
//! generated from.

use crate::types::AnalysisResult;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte analysis fingerprint (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create fingerprint from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fingerprint an analysis
    ///
    /// Only the identifying fields participate; URL, keywords and description
    /// may change without invalidating downstream results. Each field is
    /// length-prefixed so no two field splits hash alike.
    #[must_use]
    pub fn of(analysis: &AnalysisResult) -> Self {
        let mut hasher = blake3::Hasher::new();
        for field in [
            &analysis.business_name,
            &analysis.target_audience,
            &analysis.content_focus,
        ] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| FingerprintError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a fingerprint
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Wrong number of bytes
    #[error("invalid fingerprint length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    /// Not hex
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
