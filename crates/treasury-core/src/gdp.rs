use std::collections::BTreeMap;

use crate::error::TreasuryError;
use crate::types::{validate_entity_id, GdpRecord};

/// Declared-output records for group entities.
///
/// Purely informational except as the loan-cap input: issuance against a
/// lender with a recorded GDP is limited to half that figure. Records are
/// created alongside a group entity and removed when the entity is deleted.
#[derive(Debug, Default, Clone)]
pub struct GdpRegistry {
    records: BTreeMap<String, i64>,
}

impl GdpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(records: BTreeMap<String, GdpRecord>) -> Self {
        Self {
            records: records.into_iter().map(|(id, r)| (id, r.gdp)).collect(),
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<i64> {
        self.records.get(entity_id).copied()
    }

    pub fn set(&mut self, entity_id: &str, gdp: i64) -> Result<(), TreasuryError> {
        validate_entity_id(entity_id)?;
        if gdp < 0 {
            return Err(TreasuryError::InvalidAmount { amount: gdp });
        }
        self.records.insert(entity_id.to_string(), gdp);
        Ok(())
    }

    /// Drop the record for a deleted entity. Returns the old value if any.
    pub fn remove(&mut self, entity_id: &str) -> Option<i64> {
        self.records.remove(entity_id)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, GdpRecord> {
        self.records
            .iter()
            .map(|(id, gdp)| (id.clone(), GdpRecord { gdp: *gdp }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let mut registry = GdpRegistry::new();
        registry.set("nation-1", 10_000).unwrap();
        assert_eq!(registry.get("nation-1"), Some(10_000));
        assert_eq!(registry.remove("nation-1"), Some(10_000));
        assert_eq!(registry.get("nation-1"), None);
    }

    #[test]
    fn negative_gdp_rejected() {
        let mut registry = GdpRegistry::new();
        assert!(matches!(
            registry.set("nation-1", -1),
            Err(TreasuryError::InvalidAmount { amount: -1 })
        ));
    }

    #[test]
    fn snapshot_document_shape() {
        let mut registry = GdpRegistry::new();
        registry.set("nation-1", 500).unwrap();
        let json = serde_json::to_string(&registry.snapshot()).unwrap();
        assert_eq!(json, r#"{"nation-1":{"gdp":500}}"#);

        let restored = GdpRegistry::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.get("nation-1"), Some(500));
    }
}
