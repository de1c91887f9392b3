//! Upload lifecycle
//!
//! A session keeps the most recent record set for each side and the report
//! computed from them. Each successful upload replaces one side; when the
//! other side is already loaded the report is recomputed with the rules as
//! they are at that moment. A failed upload changes nothing.

use crate::config::ReconOptions;
use crate::engine::{DiscrepancyRecord, ReconStats, Reconciler};
use crate::error::Result;
use crate::parser::{parse_bytes, ValidationWarning};
use crate::record::{AuthoritativeRecord, IncomingRecord};
use crate::report;
use crate::rules::RuleRepository;
use crate::shape::{Side, TableShape};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// A parsed upload, ready to be swapped into a session
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub source_name: String,
    pub records: UploadRecords,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone)]
pub enum UploadRecords {
    Authoritative(Vec<AuthoritativeRecord>),
    Incoming(Vec<IncomingRecord>),
}

impl UploadRecords {
    pub fn side(&self) -> Side {
        match self {
            UploadRecords::Authoritative(_) => Side::Authoritative,
            UploadRecords::Incoming(_) => Side::Incoming,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UploadRecords::Authoritative(r) => r.len(),
            UploadRecords::Incoming(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PreparedUpload {
    /// Parse a payload for one side; touches no session state
    pub fn parse(side: Side, bytes: &[u8], source_name: &str) -> Result<Self> {
        let parsed = parse_bytes(bytes, &TableShape::for_side(side), source_name)?;
        let records = match side {
            Side::Authoritative => {
                UploadRecords::Authoritative(AuthoritativeRecord::from_table(&parsed.table))
            }
            Side::Incoming => UploadRecords::Incoming(IncomingRecord::from_table(&parsed.table)),
        };
        Ok(Self {
            source_name: source_name.to_string(),
            records,
            warnings: parsed.warnings,
        })
    }
}

/// What an upload did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub side: Side,
    pub records: usize,
    pub warnings: usize,
    /// True when the report was rebuilt
    pub recomputed: bool,
}

/// Latest uploads for both sides plus the report derived from them
#[derive(Debug)]
pub struct ReconSession<R> {
    rules: R,
    options: ReconOptions,
    authoritative: Option<Vec<AuthoritativeRecord>>,
    incoming: Option<Vec<IncomingRecord>>,
    candidates: Vec<DiscrepancyRecord>,
    stats: Option<ReconStats>,
    warnings: Vec<ValidationWarning>,
}

impl<R: RuleRepository> ReconSession<R> {
    pub fn new(rules: R, options: ReconOptions) -> Self {
        Self {
            rules,
            options,
            authoritative: None,
            incoming: None,
            candidates: Vec::new(),
            stats: None,
            warnings: Vec::new(),
        }
    }

    pub fn upload_authoritative(&mut self, bytes: &[u8], source_name: &str) -> Result<UploadOutcome> {
        let prepared = PreparedUpload::parse(Side::Authoritative, bytes, source_name)?;
        self.apply(prepared)
    }

    pub fn upload_incoming(&mut self, bytes: &[u8], source_name: &str) -> Result<UploadOutcome> {
        let prepared = PreparedUpload::parse(Side::Incoming, bytes, source_name)?;
        self.apply(prepared)
    }

    /// Swap in a parsed upload and recompute if both sides are loaded
    ///
    /// The rule snapshot is taken before anything is replaced, so a store
    /// error leaves the session as it was.
    pub fn apply(&mut self, upload: PreparedUpload) -> Result<UploadOutcome> {
        let side = upload.records.side();
        let other_loaded = match side {
            Side::Authoritative => self.incoming.is_some(),
            Side::Incoming => self.authoritative.is_some(),
        };
        let snapshot = if other_loaded {
            Some(self.rules.snapshot()?)
        } else {
            None
        };

        let records = upload.records.len();
        let warnings = upload.warnings.len();
        info!(%side, source = %upload.source_name, records, warnings, "upload accepted");

        match upload.records {
            UploadRecords::Authoritative(r) => self.authoritative = Some(r),
            UploadRecords::Incoming(r) => self.incoming = Some(r),
        }
        self.warnings = upload.warnings;

        let recomputed = match snapshot {
            Some(rules) => {
                self.run(Reconciler::new(rules, self.options));
                true
            }
            None => false,
        };

        Ok(UploadOutcome {
            side,
            records,
            warnings,
            recomputed,
        })
    }

    /// Rebuild the report with current rules, e.g. after a rule edit
    ///
    /// Returns false when a side is still missing.
    pub fn recompute(&mut self) -> Result<bool> {
        if self.authoritative.is_none() || self.incoming.is_none() {
            return Ok(false);
        }
        let rules = self.rules.snapshot()?;
        self.run(Reconciler::new(rules, self.options));
        Ok(true)
    }

    fn run(&mut self, reconciler: Reconciler) {
        let (Some(authoritative), Some(incoming)) = (&self.authoritative, &self.incoming) else {
            warn!("recompute requested with a side missing");
            return;
        };
        self.candidates = reconciler.compare(authoritative, incoming);
        self.stats = Some(ReconStats::compute(incoming.len(), &self.candidates));
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Rule edits take effect on the next upload or `recompute`
    pub fn rules_mut(&mut self) -> &mut R {
        &mut self.rules
    }

    pub fn options(&self) -> &ReconOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ReconOptions) {
        self.options = options;
    }

    pub fn authoritative(&self) -> Option<&[AuthoritativeRecord]> {
        self.authoritative.as_deref()
    }

    pub fn incoming(&self) -> Option<&[IncomingRecord]> {
        self.incoming.as_deref()
    }

    /// Every candidate of the last run, matched pairs included
    pub fn candidates(&self) -> &[DiscrepancyRecord] {
        &self.candidates
    }

    /// Mismatches only, or every candidate with `show_matches`
    pub fn view(&self, show_matches: bool) -> Vec<&DiscrepancyRecord> {
        report::view(&self.candidates, show_matches)
    }

    /// None until a report has been computed
    pub fn stats(&self) -> Option<ReconStats> {
        self.stats
    }

    /// Warnings from the most recent successful upload
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }
}

/// A session shared between threads
///
/// Uploads parse without holding the lock; only the swap and the recompute
/// run under it, so two uploads never interleave.
#[derive(Debug)]
pub struct SharedSession<R> {
    inner: Arc<Mutex<ReconSession<R>>>,
}

impl<R> Clone for SharedSession<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RuleRepository> SharedSession<R> {
    pub fn new(session: ReconSession<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn upload_authoritative(&self, bytes: &[u8], source_name: &str) -> Result<UploadOutcome> {
        let prepared = PreparedUpload::parse(Side::Authoritative, bytes, source_name)?;
        self.lock().apply(prepared)
    }

    pub fn upload_incoming(&self, bytes: &[u8], source_name: &str) -> Result<UploadOutcome> {
        let prepared = PreparedUpload::parse(Side::Incoming, bytes, source_name)?;
        self.lock().apply(prepared)
    }

    /// Run a closure against the locked session
    pub fn with<T>(&self, f: impl FnOnce(&mut ReconSession<R>) -> T) -> T {
        f(&mut self.lock())
    }

    pub fn stats(&self) -> Option<ReconStats> {
        self.lock().stats()
    }

    /// Owned copy of the visible records
    pub fn view(&self, show_matches: bool) -> Vec<DiscrepancyRecord> {
        self.lock().view(show_matches).into_iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, ReconSession<R>> {
        // A panic mid-recompute leaves a consistent, if stale, session
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnmatchedPolicy;
    use crate::error::Error;
    use crate::rules::{MemoryStore, RuleStore, StatusRule};

    const AUTH: &[u8] = b"Policy #,Application Status,Premium Issued,Product Issued\nP1,Policy Issued,$500.00,GAWL\nP2,Declined,$120.00,TAWL\n";
    const INCOMING: &[u8] =
        b"PolicyId,Status,PremiumAmount,ProductType\nP1,Approved,500,GAWL\nP2,Approved,120,TAWL\n";

    fn session() -> ReconSession<RuleStore<MemoryStore>> {
        ReconSession::new(RuleStore::new(MemoryStore::new()), ReconOptions::default())
    }

    #[test]
    fn test_no_report_until_both_sides_loaded() {
        let mut s = session();
        let outcome = s.upload_incoming(INCOMING, "in.csv").unwrap();

        assert_eq!(outcome.records, 2);
        assert!(!outcome.recomputed);
        assert!(s.stats().is_none());
        assert!(s.candidates().is_empty());
    }

    #[test]
    fn test_second_upload_recomputes() {
        let mut s = session();
        s.upload_authoritative(AUTH, "sf.csv").unwrap();
        let outcome = s.upload_incoming(INCOMING, "in.csv").unwrap();

        assert!(outcome.recomputed);
        let stats = s.stats().unwrap();
        assert_eq!(stats.total_incoming, 2);
        assert_eq!(stats.mismatched, 1);
        assert_eq!(s.view(false)[0].key, "P2");
        assert_eq!(s.view(true).len(), 2);
    }

    #[test]
    fn test_failed_upload_leaves_state() {
        let mut s = session();
        s.upload_authoritative(AUTH, "sf.csv").unwrap();
        s.upload_incoming(INCOMING, "in.csv").unwrap();
        let before = s.candidates().to_vec();

        let err = s.upload_incoming(b"\xff\xfe\0garbage", "bad.bin").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(s.candidates(), before.as_slice());
        assert_eq!(s.incoming().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_other_side_still_recomputes() {
        let mut s = session();
        s.set_options(ReconOptions {
            on_unmatched: UnmatchedPolicy::FlagAllMismatch,
            ..ReconOptions::default()
        });
        s.upload_authoritative(b"", "empty.csv").unwrap();
        let outcome = s.upload_incoming(INCOMING, "in.csv").unwrap();

        assert!(outcome.recomputed);
        assert_eq!(s.stats().unwrap().not_found, 2);
        assert_eq!(s.view(false).len(), 2);
    }

    #[test]
    fn test_rule_edit_applies_on_recompute() {
        let mut s = session();
        s.upload_authoritative(AUTH, "sf.csv").unwrap();
        s.upload_incoming(INCOMING, "in.csv").unwrap();
        assert_eq!(s.stats().unwrap().mismatched, 1);

        let mut status = s.rules().status_rules().unwrap();
        status.push(StatusRule::new("Declined", "Approved"));
        s.rules_mut().save_status_rules(status).unwrap();
        assert!(s.recompute().unwrap());
        assert_eq!(s.stats().unwrap().mismatched, 0);
    }

    #[test]
    fn test_shared_session_across_threads() {
        let shared = SharedSession::new(session());
        let a = shared.clone();
        let b = shared.clone();

        let t1 = std::thread::spawn(move || a.upload_authoritative(AUTH, "sf.csv").unwrap());
        let t2 = std::thread::spawn(move || b.upload_incoming(INCOMING, "in.csv").unwrap());
        let o1 = t1.join().unwrap();
        let o2 = t2.join().unwrap();

        // Whichever landed second saw the other side and recomputed
        assert!(o1.recomputed ^ o2.recomputed);
        assert_eq!(shared.stats().unwrap().total_incoming, 2);
        assert_eq!(shared.view(false).len(), 1);
    }
}
