use pr_core::{
    parse_file, AuthoritativeRecord, IncomingRecord, JsonFileStore, ReconOptions, ReconSession,
    ReconStats, Reconciler, RuleRepository, RuleStore, StatusRule, TableShape, UnmatchedPolicy,
};
use std::fs;

const CRM_EXPORT: &str = "\
Policy Report,,,,
\"Generated 2024-03-01
by ops\",,,,
,,,,
Agent,Policy #,Application Status,Premium Issued,Product Issued
Kim,P1,Policy Issued,$500.00,TruStage Guaranteed Whole Life (GAWL)
Lee,P2,Policy Issued,\"$1,200.00\",TruStage Advantage Whole Life (TAWL) - Preferred
Ray,P3,Declined,$80.00,TruStage Term Band 1
,,,,
Total,,,,
";

const SUBMISSION: &str = "\
PolicyId,Status,PremiumAmount,ProductType,TieredRisk
P1,Approved,500,GAWL,
P2,Approved,1200.004,TAWL,Good Risk
P3,Approved,80,SI Term Band 1,
P9,Approved,10,GAWL,
";

fn records() -> (Vec<AuthoritativeRecord>, Vec<IncomingRecord>) {
    let dir = tempfile::tempdir().unwrap();
    let auth_path = dir.path().join("crm.csv");
    let inc_path = dir.path().join("submission.csv");
    fs::write(&auth_path, CRM_EXPORT).unwrap();
    fs::write(&inc_path, SUBMISSION).unwrap();

    let auth = parse_file(&auth_path, &TableShape::authoritative()).unwrap();
    let inc = parse_file(&inc_path, &TableShape::incoming()).unwrap();
    assert_eq!(auth.header_row, 3);
    (
        AuthoritativeRecord::from_table(&auth.table),
        IncomingRecord::from_table(&inc.table),
    )
}

#[test]
fn issued_policy_equivalent_to_approved() {
    let auth = vec![AuthoritativeRecord::new("P1", "Policy Issued", "$500.00", "GAWL")];
    let inc = vec![IncomingRecord::new("P1", "Approved", "500", "GAWL", "")];

    let report = Reconciler::default().reconcile(&auth, &inc);
    assert!(report.is_empty());
}

#[test]
fn preamble_exports_reconcile_end_to_end() {
    let (auth, inc) = records();
    // The "Total" row has no policy id and is dropped
    assert_eq!(auth.len(), 3);
    assert_eq!(auth[1].premium, "$1,200.00");
    assert_eq!(inc.len(), 4);

    let reconciler = Reconciler::default();
    let candidates = reconciler.compare(&auth, &inc);
    let mismatches: Vec<_> = candidates.iter().filter(|c| c.has_mismatch()).collect();

    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].key, "P3");
    assert_eq!(mismatches[0].mismatch_labels(), vec!["Status"]);

    let stats = ReconStats::compute(inc.len(), &candidates);
    assert_eq!(stats.total_incoming, 4);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.clean, 2);
}

#[test]
fn unmatched_records_flagged_when_configured() {
    let (auth, inc) = records();
    let options = ReconOptions {
        on_unmatched: UnmatchedPolicy::FlagAllMismatch,
        ..ReconOptions::default()
    };

    let report = Reconciler::new(Default::default(), options).reconcile(&auth, &inc);
    let missing = report.iter().find(|r| r.key == "P9").unwrap();

    assert_eq!(missing.authoritative_status, "Not Found");
    assert!(missing.status_mismatch && missing.premium_mismatch && missing.product_mismatch);
    assert_eq!(report.len(), 2);
}

#[test]
fn rules_persisted_to_disk_drive_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("config").join("rules.json");

    let mut store = RuleStore::new(JsonFileStore::new(&rules_path));
    let mut status = store.status_rules().unwrap();
    status.push(StatusRule::new("Declined", "Approved"));
    store.save_status_rules(status).unwrap();

    let reopened = RuleStore::new(JsonFileStore::new(&rules_path));
    assert_eq!(reopened.snapshot().unwrap().status.len(), 2);

    let mut session = ReconSession::new(reopened, ReconOptions::default());
    session
        .upload_authoritative(CRM_EXPORT.as_bytes(), "crm.csv")
        .unwrap();
    let outcome = session
        .upload_incoming(SUBMISSION.as_bytes(), "submission.csv")
        .unwrap();

    assert!(outcome.recomputed);
    assert!(session.view(false).is_empty());
    assert_eq!(session.stats().unwrap().clean, 3);
}
