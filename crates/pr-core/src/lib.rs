//! pr-core: reconcile submitted policy files against a trusted CRM export
//!
//! This library provides functionality to:
//! - Locate the real header row in exports that carry preamble lines
//! - Parse CSV payloads into tables and typed records
//! - Join incoming records to trusted ones by policy id and flag status,
//!   premium and product differences
//! - Keep user-editable equivalence rules in a key-value store
//! - Render and export the resulting discrepancy report

pub mod config;
pub mod engine;
pub mod error;
pub mod header;
pub mod parser;
pub mod record;
pub mod report;
pub mod rules;
pub mod session;
pub mod shape;
pub mod table;

pub use config::{CaseSensitivity, ProductComparison, ReconConfig, ReconOptions, UnmatchedPolicy};
pub use engine::{reconcile, DiscrepancyRecord, ReconStats, Reconciler};
pub use error::{Error, Result};
pub use header::locate_header_row;
pub use parser::{parse_bytes, parse_file, parse_str, ParsedTable, ValidationWarning};
pub use record::{AuthoritativeRecord, IncomingRecord};
pub use report::{export, render_text, write_csv, write_table, ReportDocument, ReportFormat};
pub use rules::{
    EquivalenceRules, JsonFileStore, KeyValueStore, MemoryStore, ProductRule, RuleKind, RuleList,
    RuleRepository, RuleStore, StatusRule,
};
pub use session::{ReconSession, SharedSession, UploadOutcome};
pub use shape::{Side, TableShape};
pub use table::{Column, Row, Table};
