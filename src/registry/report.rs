//! Registry statistics and health reporting

use std::collections::BTreeMap;

use serde::Serialize;

use crate::type_id::MetaDataTypeId;

/// Counts over the registered type table
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total_types: usize,
    /// Number of subtypes per primary type
    pub types_by_family: BTreeMap<String, usize>,
    pub types_with_parent: usize,
    pub memoised_effective: usize,
}

impl RegistryStats {
    pub fn family_count(&self) -> usize {
        self.types_by_family.len()
    }
}

/// Result of [`super::MetaDataRegistry::health_report`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryHealthReport {
    pub total_types: usize,
    pub type_families: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub families_missing_base: Vec<String>,
    pub unresolved_parents: Vec<MetaDataTypeId>,
    pub cyclic_types: Vec<MetaDataTypeId>,
}

impl RegistryHealthReport {
    /// Healthy means no errors; warnings are advisory
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line status used by the inspect binary
    pub fn summary(&self) -> String {
        format!(
            "{} types in {} families: {} errors, {} warnings",
            self.total_types,
            self.type_families,
            self.errors.len(),
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_healthy() {
        let report = RegistryHealthReport::default();
        assert!(report.is_healthy());
        assert_eq!(report.summary(), "0 types in 0 families: 0 errors, 0 warnings");
    }
}
