//! Reconciliation engine: join incoming records to trusted ones and flag
//! field-level differences
//!
//! Pure and synchronous. Rules and options come in as values; nothing is
//! read from ambient state, and no input can make a run fail.

use crate::config::{ProductComparison, ReconOptions, UnmatchedPolicy};
use crate::record::{AuthoritativeRecord, IncomingRecord};
use crate::rules::EquivalenceRules;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Premiums are compared in ten-thousandths of a currency unit
pub const PREMIUM_SCALE: i64 = 10_000;

/// Largest premium difference still treated as equal: 0.01, in scaled units
pub const PREMIUM_TOLERANCE: i64 = PREMIUM_SCALE / 100;

/// Placeholder for trusted-side fields when the key was not found
pub const NOT_FOUND: &str = "Not Found";

/// One reconciled pair, or one unmatched incoming record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub key: String,
    pub authoritative_status: String,
    pub incoming_status: String,
    pub authoritative_premium: String,
    pub incoming_premium: String,
    pub authoritative_product: String,
    /// Effective incoming product ("product + secondary")
    pub incoming_product: String,
    pub status_mismatch: bool,
    pub premium_mismatch: bool,
    pub product_mismatch: bool,
}

impl DiscrepancyRecord {
    pub fn has_mismatch(&self) -> bool {
        self.status_mismatch || self.premium_mismatch || self.product_mismatch
    }

    /// False when the key had no trusted counterpart
    ///
    /// Derived from the trusted-side placeholders, so it survives a CSV or
    /// JSON round trip.
    pub fn is_found(&self) -> bool {
        !(self.authoritative_status == NOT_FOUND
            && self.authoritative_premium == NOT_FOUND
            && self.authoritative_product == NOT_FOUND)
    }

    /// Labels for the flags that are set, in display order
    pub fn mismatch_labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.status_mismatch {
            labels.push("Status");
        }
        if self.premium_mismatch {
            labels.push("Premium");
        }
        if self.product_mismatch {
            labels.push("Product");
        }
        labels
    }

    fn not_found(incoming: &IncomingRecord) -> Self {
        Self {
            key: incoming.key.clone(),
            authoritative_status: NOT_FOUND.to_string(),
            incoming_status: incoming.status.clone(),
            authoritative_premium: NOT_FOUND.to_string(),
            incoming_premium: incoming.premium.clone(),
            authoritative_product: NOT_FOUND.to_string(),
            incoming_product: incoming.effective_product(),
            status_mismatch: true,
            premium_mismatch: true,
            product_mismatch: true,
        }
    }
}

/// Aggregate counts over one run's candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconStats {
    pub total_incoming: usize,
    /// Candidates with at least one flag set
    pub mismatched: usize,
    /// Incoming records with no trusted counterpart
    pub not_found: usize,
    /// Matched pairs with no flag set
    pub clean: usize,
}

impl ReconStats {
    /// Recompute from the candidate list of a run
    ///
    /// Works under either unmatched policy: records skipped by the engine
    /// are exactly the incoming records missing from `candidates`.
    pub fn compute(total_incoming: usize, candidates: &[DiscrepancyRecord]) -> Self {
        let found = candidates.iter().filter(|c| c.is_found()).count();
        Self {
            total_incoming,
            mismatched: candidates.iter().filter(|c| c.has_mismatch()).count(),
            not_found: total_incoming.saturating_sub(found),
            clean: candidates
                .iter()
                .filter(|c| c.is_found() && !c.has_mismatch())
                .count(),
        }
    }
}

/// Parse a premium cell, stripping `$`, `,` and whitespace
///
/// Empty or unparsable text reads as 0.
pub fn parse_premium(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Premium as a fixed-point integer in `PREMIUM_SCALE` units
///
/// Rounding happens once per value, so a one-cent gap is the same number of
/// units at any magnitude.
pub fn premium_units(raw: &str) -> i64 {
    (parse_premium(raw) * PREMIUM_SCALE as f64).round() as i64
}

/// True when the premiums differ by strictly more than 0.01
pub fn premium_mismatch(authoritative: &str, incoming: &str) -> bool {
    premium_units(authoritative)
        .saturating_sub(premium_units(incoming))
        .saturating_abs()
        > PREMIUM_TOLERANCE
}

/// Joins and compares records under a fixed rule snapshot and option set
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    rules: EquivalenceRules,
    options: ReconOptions,
}

impl Reconciler {
    pub fn new(rules: EquivalenceRules, options: ReconOptions) -> Self {
        Self { rules, options }
    }

    pub fn rules(&self) -> &EquivalenceRules {
        &self.rules
    }

    pub fn options(&self) -> &ReconOptions {
        &self.options
    }

    pub fn status_mismatch(&self, authoritative: &str, incoming: &str) -> bool {
        let case = self.options.status_case;
        !case.equals(authoritative, incoming)
            && !self.rules.status_equivalent(authoritative, incoming, case)
    }

    pub fn product_mismatch(&self, authoritative_product: &str, incoming: &IncomingRecord) -> bool {
        if self.options.product_comparison == ProductComparison::ExactThenRules
            && authoritative_product == incoming.effective_product()
        {
            return false;
        }
        !self.rules.product_equivalent(authoritative_product, incoming)
    }

    /// Compare one joined pair
    pub fn compare_pair(
        &self,
        authoritative: &AuthoritativeRecord,
        incoming: &IncomingRecord,
    ) -> DiscrepancyRecord {
        DiscrepancyRecord {
            key: incoming.key.clone(),
            authoritative_status: authoritative.status.clone(),
            incoming_status: incoming.status.clone(),
            authoritative_premium: authoritative.premium.clone(),
            incoming_premium: incoming.premium.clone(),
            authoritative_product: authoritative.product.clone(),
            incoming_product: incoming.effective_product(),
            status_mismatch: self.status_mismatch(&authoritative.status, &incoming.status),
            premium_mismatch: premium_mismatch(&authoritative.premium, &incoming.premium),
            product_mismatch: self.product_mismatch(&authoritative.product, incoming),
        }
    }

    /// One candidate per considered incoming record, in incoming order
    ///
    /// Unmatched records appear only under `FlagAllMismatch`. A trusted
    /// record pairs with at most one incoming record; later incoming
    /// duplicates of an already paired key count as unmatched.
    pub fn compare(
        &self,
        authoritative: &[AuthoritativeRecord],
        incoming: &[IncomingRecord],
    ) -> Vec<DiscrepancyRecord> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, record) in authoritative.iter().enumerate() {
            if record.key.is_empty() {
                continue;
            }
            if index.contains_key(record.key.as_str()) {
                debug!(key = %record.key, "duplicate trusted key, keeping first");
                continue;
            }
            index.insert(record.key.as_str(), i);
        }

        let mut paired: HashSet<usize> = HashSet::new();
        let mut candidates = Vec::with_capacity(incoming.len());

        for record in incoming {
            let counterpart = index
                .get(record.key.as_str())
                .copied()
                .filter(|i| !paired.contains(i));

            match counterpart {
                Some(i) => {
                    paired.insert(i);
                    candidates.push(self.compare_pair(&authoritative[i], record));
                }
                None => {
                    if index.contains_key(record.key.as_str()) {
                        debug!(key = %record.key, "trusted record already paired, treating as unmatched");
                    }
                    if self.options.on_unmatched == UnmatchedPolicy::FlagAllMismatch {
                        candidates.push(DiscrepancyRecord::not_found(record));
                    }
                }
            }
        }

        let stats = ReconStats::compute(incoming.len(), &candidates);
        info!(
            total = stats.total_incoming,
            mismatched = stats.mismatched,
            not_found = stats.not_found,
            clean = stats.clean,
            "reconciliation complete"
        );

        candidates
    }

    /// Only the candidates with at least one mismatch
    pub fn reconcile(
        &self,
        authoritative: &[AuthoritativeRecord],
        incoming: &[IncomingRecord],
    ) -> Vec<DiscrepancyRecord> {
        self.compare(authoritative, incoming)
            .into_iter()
            .filter(DiscrepancyRecord::has_mismatch)
            .collect()
    }
}

/// Reconcile with an explicit rule snapshot and options
pub fn reconcile(
    authoritative: &[AuthoritativeRecord],
    incoming: &[IncomingRecord],
    rules: &EquivalenceRules,
    options: &ReconOptions,
) -> Vec<DiscrepancyRecord> {
    Reconciler::new(rules.clone(), *options).reconcile(authoritative, incoming)
}
