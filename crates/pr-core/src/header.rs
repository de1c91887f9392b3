//! Locating the header row inside loosely structured exports
//!
//! Exports often start with a title, a run date or a few blank lines before
//! the real column headers. The locator scans a bounded prefix of raw rows
//! and returns the first row the shape's predicate accepts.

use crate::shape::HeaderDetection;
use crate::table::is_blank;
use tracing::debug;

/// Find the zero-based index of the header row
///
/// Only the first `max_scan` rows are inspected. Blank rows are skipped. If
/// nothing matches the first row is treated as the header and 0 is returned.
pub fn locate_header_row<S: AsRef<str>>(
    rows: &[Vec<S>],
    detection: &HeaderDetection,
    max_scan: usize,
) -> usize {
    for (idx, row) in rows.iter().take(max_scan).enumerate() {
        if is_blank(row) {
            continue;
        }
        if detection.is_header(row) {
            debug!(row = idx, "header row located");
            return idx;
        }
    }

    debug!(scanned = rows.len().min(max_scan), "no header row matched, using row 0");
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::TableShape;

    fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_exact_set_after_preamble() {
        let table = rows(&[
            &["Carrier submission report"],
            &[""],
            &["Generated", "2024-03-01"],
            &["PolicyId", "Status", "PremiumAmount", "ProductType", "TieredRisk"],
            &["P1", "Approved", "500", "GAWL", ""],
        ]);
        let shape = TableShape::incoming();
        assert_eq!(locate_header_row(&table, &shape.detection, 20), 3);
    }

    #[test]
    fn test_fingerprint_after_preamble() {
        let table = rows(&[
            &["Salesforce Report: Issued Business"],
            &["", "", ""],
            &["Policy #", "Application Status", "Premium Issued", "Product Issued"],
            &["P1", "Policy Issued", "$500.00", "GAWL"],
        ]);
        let shape = TableShape::authoritative();
        assert_eq!(locate_header_row(&table, &shape.detection, 20), 2);
    }

    #[test]
    fn test_header_on_first_row() {
        let table = rows(&[&["PolicyId", "Status", "PremiumAmount", "ProductType"]]);
        let shape = TableShape::incoming();
        assert_eq!(locate_header_row(&table, &shape.detection, 20), 0);
    }

    #[test]
    fn test_fallback_to_zero() {
        let table = rows(&[&["a", "b"], &["1", "2"], &["3", "4"]]);
        assert_eq!(
            locate_header_row(&table, &TableShape::incoming().detection, 20),
            0
        );
        assert_eq!(
            locate_header_row(&table, &TableShape::authoritative().detection, 20),
            0
        );
    }

    #[test]
    fn test_scan_is_bounded() {
        let mut raw: Vec<Vec<String>> = (0..25).map(|i| vec![format!("note {i}")]).collect();
        raw.push(vec!["Policy #".to_string(), "Application Status".to_string()]);
        let shape = TableShape::authoritative();
        assert_eq!(locate_header_row(&raw, &shape.detection, 20), 0);
        assert_eq!(locate_header_row(&raw, &shape.detection, 30), 25);
    }

    #[test]
    fn test_empty_input() {
        let table: Vec<Vec<String>> = Vec::new();
        assert_eq!(
            locate_header_row(&table, &TableShape::incoming().detection, 20),
            0
        );
    }
}
