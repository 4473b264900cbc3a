//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Longest SKU accepted from the catalog.
pub const MAX_SKU_LEN: usize = 100;

/// Stock-keeping unit: the identifier of one sellable product variant.
///
/// Always non-empty and free of surrounding whitespace. Variants without a SKU
/// cannot be represented, so they never reach aggregation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("Sku: must not be empty"));
        }
        if trimmed.len() > MAX_SKU_LEN {
            return Err(DomainError::invalid_id(format!(
                "Sku: longer than {MAX_SKU_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sku {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Sku {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Sku> for String {
    fn from(value: Sku) -> Self {
        value.0
    }
}

/// Identifier of one forecast batch run (correlates log lines and reports).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer `from_uuid` in tests for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RunId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("RunId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_is_trimmed() {
        let sku = Sku::parse("  RING-001 ").unwrap();
        assert_eq!(sku.as_str(), "RING-001");
    }

    #[test]
    fn empty_sku_is_rejected() {
        assert!(matches!(Sku::parse("   "), Err(DomainError::InvalidId(_))));
        assert!(matches!(Sku::parse(""), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn overlong_sku_is_rejected() {
        let raw = "X".repeat(MAX_SKU_LEN + 1);
        assert!(Sku::parse(raw).is_err());
    }

    #[test]
    fn sku_deserialization_validates() {
        let ok: Sku = serde_json::from_str("\"NECK-9\"").unwrap();
        assert_eq!(ok.to_string(), "NECK-9");
        assert!(serde_json::from_str::<Sku>("\"\"").is_err());
    }

    #[test]
    fn run_id_round_trips_through_display() {
        let id = RunId::from_uuid(Uuid::nil());
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
