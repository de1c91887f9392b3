//! Rendering and exporting discrepancy reports

use crate::config::ReconOptions;
use crate::engine::{DiscrepancyRecord, ReconStats};
use crate::error::{Error, Result};
use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output formats for an exported report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Csv,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            other => Err(Error::InvalidArgument(format!(
                "unknown format '{other}', supported formats: text, csv, json"
            ))),
        }
    }
}

/// Records to show: only mismatches, or everything when `show_matches` is set
pub fn view(candidates: &[DiscrepancyRecord], show_matches: bool) -> Vec<&DiscrepancyRecord> {
    candidates
        .iter()
        .filter(|r| show_matches || r.has_mismatch())
        .collect()
}

/// Write records as CSV, one row per record, header = field names
pub fn write_csv<'a, W, I>(records: I, writer: W) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a DiscrepancyRecord>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut wrote_any = false;
    for record in records {
        csv_writer.serialize(record).map_err(csv_error)?;
        wrote_any = true;
    }
    if !wrote_any {
        csv_writer.write_record(CSV_HEADER).map_err(csv_error)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Header used when there are no records to derive it from
const CSV_HEADER: [&str; 10] = [
    "key",
    "authoritative_status",
    "incoming_status",
    "authoritative_premium",
    "incoming_premium",
    "authoritative_product",
    "incoming_product",
    "status_mismatch",
    "premium_mismatch",
    "product_mismatch",
];

/// Re-serialize a parsed table, normalized headers first
pub fn write_table<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(table.columns.iter().map(|c| c.name.as_str()))
        .map_err(csv_error)?;
    for row in &table.rows {
        csv_writer.write_record(&row.cells).map_err(csv_error)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn csv_error(e: csv::Error) -> Error {
    Error::Csv {
        source_name: "report".to_string(),
        source: e,
    }
}

/// Tab-separated display of a report
pub fn render_text<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a DiscrepancyRecord>,
{
    let mut out = String::new();
    out.push_str("Policy ID\tStatus (Auth/Incoming)\tPremium (Auth/Incoming)\tProduct (Auth/Incoming)\tMismatches\n");
    out.push_str(&"-".repeat(96));
    out.push('\n');

    let mut count = 0;
    for r in records {
        let labels = r.mismatch_labels();
        let mismatches = if labels.is_empty() {
            "-".to_string()
        } else {
            labels.join(", ")
        };
        out.push_str(&format!(
            "{}\t{} / {}\t{} / {}\t{} / {}\t{}\n",
            r.key,
            r.authoritative_status,
            r.incoming_status,
            r.authoritative_premium,
            r.incoming_premium,
            r.authoritative_product,
            r.incoming_product,
            mismatches
        ));
        count += 1;
    }

    if count == 0 {
        out.push_str("No mismatches found.\n");
    }
    out
}

/// Run metadata attached to a JSON export
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub generated_at: DateTime<Utc>,
    pub engine_version: String,
    pub options: ReconOptions,
    pub show_matches: bool,
}

/// Full JSON export: metadata, stats and the visible records
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument<'a> {
    pub meta: ReportMeta,
    pub stats: ReconStats,
    pub records: Vec<&'a DiscrepancyRecord>,
}

impl<'a> ReportDocument<'a> {
    pub fn new(
        candidates: &'a [DiscrepancyRecord],
        stats: ReconStats,
        options: ReconOptions,
        show_matches: bool,
    ) -> Self {
        Self {
            meta: ReportMeta {
                generated_at: Utc::now(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                options,
                show_matches,
            },
            stats,
            records: view(candidates, show_matches),
        }
    }
}

/// Write a report to `path` in the given format
pub fn export<P: AsRef<Path>>(
    path: P,
    format: ReportFormat,
    document: &ReportDocument<'_>,
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    match format {
        ReportFormat::Csv => write_csv(document.records.iter().copied(), &mut writer)?,
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, document)?;
            writeln!(writer)?;
        }
        ReportFormat::Text => {
            write!(writer, "{}", render_text(document.records.iter().copied()))?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnmatchedPolicy;
    use crate::engine::Reconciler;
    use crate::parser::parse_str;
    use crate::record::{AuthoritativeRecord, IncomingRecord};
    use crate::rules::EquivalenceRules;
    use crate::shape::TableShape;

    fn record(key: &str, status_mismatch: bool) -> DiscrepancyRecord {
        DiscrepancyRecord {
            key: key.to_string(),
            authoritative_status: "Policy Issued".to_string(),
            incoming_status: "Pending, docs".to_string(),
            authoritative_premium: "$1,200.00".to_string(),
            incoming_premium: "1200".to_string(),
            authoritative_product: "GAWL".to_string(),
            incoming_product: "GAWL".to_string(),
            status_mismatch,
            premium_mismatch: false,
            product_mismatch: false,
        }
    }

    #[test]
    fn test_view_filters_matches() {
        let records = vec![record("P1", true), record("P2", false)];
        assert_eq!(view(&records, false).len(), 1);
        assert_eq!(view(&records, true).len(), 2);
    }

    #[test]
    fn test_write_csv_header_and_quoting() {
        let records = vec![record("P1", true)];
        let mut out = Vec::new();
        write_csv(&records, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "P1,Policy Issued,\"Pending, docs\",\"$1,200.00\",1200,GAWL,GAWL,true,false,false"
        );
    }

    #[test]
    fn test_write_csv_empty_still_has_header() {
        let none: Vec<DiscrepancyRecord> = Vec::new();
        let mut out = Vec::new();
        write_csv(&none, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim_end(), CSV_HEADER.join(","));
    }

    #[test]
    fn test_csv_reads_back_verbatim() {
        let records = vec![record("P1", true), record("P2", false)];
        let mut out = Vec::new();
        write_csv(&records, &mut out).unwrap();

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let back: Vec<DiscrepancyRecord> = reader
            .deserialize()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(back[0].incoming_status, "Pending, docs");
        assert_eq!(back[0].authoritative_premium, "$1,200.00");
        assert!(back[0].status_mismatch);
        assert!(!back[1].status_mismatch);
    }

    #[test]
    fn test_stats_survive_csv_read_back() {
        let authoritative = [AuthoritativeRecord::new("P1", "Policy Issued", "$10.00", "GAWL")];
        let incoming = [
            IncomingRecord::new("P1", "Approved", "10", "GAWL", ""),
            IncomingRecord::new("P9", "Approved", "10", "GAWL", ""),
        ];
        let options = ReconOptions {
            on_unmatched: UnmatchedPolicy::FlagAllMismatch,
            ..ReconOptions::default()
        };
        let candidates = Reconciler::new(EquivalenceRules::default(), options)
            .compare(&authoritative, &incoming);

        let mut out = Vec::new();
        write_csv(&candidates, &mut out).unwrap();
        let back: Vec<DiscrepancyRecord> = csv::Reader::from_reader(out.as_slice())
            .deserialize()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        assert_eq!(back, candidates);
        let stats = ReconStats::compute(2, &back);
        assert_eq!(stats, ReconStats::compute(2, &candidates));
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.clean, 1);
    }

    #[test]
    fn test_table_round_trip_is_verbatim() {
        let csv = "PolicyId,Status,PremiumAmount,ProductType\nP1,\"Approved, final\",\"$1,200.50\",\"Term\nBand 1\"\nP2,Approved,0012.10,GAWL\n";
        let first = parse_str(csv, &TableShape::incoming(), "in.csv").unwrap().table;

        let mut out = Vec::new();
        write_table(&first, &mut out).unwrap();
        let again = parse_str(std::str::from_utf8(&out).unwrap(), &TableShape::incoming(), "again.csv")
            .unwrap()
            .table;

        assert_eq!(again.columns, first.columns);
        let cells = |t: &Table| t.rows.iter().map(|r| r.cells.clone()).collect::<Vec<_>>();
        assert_eq!(cells(&again), cells(&first));
        assert_eq!(again.value(1, "PremiumAmount"), Some("0012.10"));
    }

    #[test]
    fn test_render_text() {
        let records = vec![record("P1", true)];
        let text = render_text(&records);
        assert!(text.contains("P1\tPolicy Issued / Pending, docs"));
        assert!(text.trim_end().ends_with("Status"));

        let none: Vec<DiscrepancyRecord> = Vec::new();
        assert!(render_text(&none).contains("No mismatches found."));
    }

    #[test]
    fn test_json_document() {
        let records = vec![record("P1", true), record("P2", false)];
        let stats = ReconStats::compute(2, &records);
        let doc = ReportDocument::new(&records, stats, ReconOptions::default(), false);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["records"].as_array().unwrap().len(), 1);
        assert_eq!(value["stats"]["clean"], 1);
        assert_eq!(value["meta"]["options"]["on_unmatched"], "skip");
    }

    #[test]
    fn test_export_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mismatches.csv");
        let records = vec![record("P1", true)];
        let doc = ReportDocument::new(&records, ReconStats::compute(1, &records), ReconOptions::default(), false);

        export(&path, ReportFormat::Csv, &doc).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("key,authoritative_status"));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert!("xlsx".parse::<ReportFormat>().is_err());
    }
}
