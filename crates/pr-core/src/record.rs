//! Typed records built from parsed tables
//!
//! The engine works on these rather than on string-keyed rows, so a missing
//! column shows up once here (as an empty field) instead of at every lookup.

use crate::shape::columns;
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Separator between the incoming product and its secondary attribute
pub const SECONDARY_SEPARATOR: &str = " + ";

/// A row from the trusted export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeRecord {
    pub key: String,
    pub status: String,
    /// Raw premium text, possibly currency formatted ("$1,234.56")
    pub premium: String,
    pub product: String,
}

impl AuthoritativeRecord {
    pub fn new(key: &str, status: &str, premium: &str, product: &str) -> Self {
        Self {
            key: key.trim().to_string(),
            status: status.trim().to_string(),
            premium: premium.trim().to_string(),
            product: product.trim().to_string(),
        }
    }

    /// Build records from a table parsed with the authoritative shape
    pub fn from_table(table: &Table) -> Vec<Self> {
        (0..table.row_count())
            .map(|i| {
                let cell = |name: &str| table.value(i, name).unwrap_or_default();
                Self::new(
                    cell(columns::POLICY_ID),
                    cell(columns::APPLICATION_STATUS),
                    cell(columns::PREMIUM_ISSUED),
                    cell(columns::PRODUCT_ISSUED),
                )
            })
            .collect()
    }
}

/// A row from the submitted file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingRecord {
    pub key: String,
    pub status: String,
    pub premium: String,
    pub product: String,
    /// Tiered risk / rider qualifier; empty when absent
    pub secondary: String,
}

impl IncomingRecord {
    pub fn new(key: &str, status: &str, premium: &str, product: &str, secondary: &str) -> Self {
        Self {
            key: key.trim().to_string(),
            status: status.trim().to_string(),
            premium: premium.trim().to_string(),
            product: product.trim().to_string(),
            secondary: secondary.trim().to_string(),
        }
    }

    /// Build records from a table parsed with the incoming shape
    pub fn from_table(table: &Table) -> Vec<Self> {
        (0..table.row_count())
            .map(|i| {
                let cell = |name: &str| table.value(i, name).unwrap_or_default();
                Self::new(
                    cell(columns::POLICY_ID),
                    cell(columns::STATUS),
                    cell(columns::PREMIUM_AMOUNT),
                    cell(columns::PRODUCT_TYPE),
                    cell(columns::TIERED_RISK),
                )
            })
            .collect()
    }

    /// Product plus `" + secondary"` when a secondary attribute is present
    pub fn effective_product(&self) -> String {
        if self.secondary.is_empty() {
            self.product.clone()
        } else {
            format!("{}{}{}", self.product, SECONDARY_SEPARATOR, self.secondary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::shape::TableShape;

    #[test]
    fn test_effective_product() {
        let plain = IncomingRecord::new("P1", "Approved", "1", "GAWL", "");
        assert_eq!(plain.effective_product(), "GAWL");

        let tiered = IncomingRecord::new("P2", "Approved", "1", "TAWL", " Good Risk ");
        assert_eq!(tiered.effective_product(), "TAWL + Good Risk");
    }

    #[test]
    fn test_incoming_from_table_without_optional_column() {
        let csv = "PolicyId,Status,PremiumAmount,ProductType\nP1,Approved,500,GAWL\n";
        let parsed = parse_str(csv, &TableShape::incoming(), "in.csv").unwrap();
        let records = IncomingRecord::from_table(&parsed.table);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "P1");
        assert_eq!(records[0].secondary, "");
    }

    #[test]
    fn test_authoritative_from_table() {
        let csv = "Policy #,Application Status,Premium Issued,Product Issued,Agent\nP1,Policy Issued,$500.00,GAWL,Kim\n";
        let parsed = parse_str(csv, &TableShape::authoritative(), "sf.csv").unwrap();
        let records = AuthoritativeRecord::from_table(&parsed.table);

        assert_eq!(
            records,
            vec![AuthoritativeRecord::new("P1", "Policy Issued", "$500.00", "GAWL")]
        );
    }
}
