//! Policy Recon CLI
//!
//! Command-line tool for reconciling submitted policy files against a CRM export
//! and maintaining the equivalence rules used to compare them.

use clap::{ArgAction, Parser, Subcommand};
use pr_core::{
    export, parse_file, render_text, write_csv, AuthoritativeRecord, IncomingRecord,
    JsonFileStore, ProductRule, ReconConfig, ReconStats, Reconciler, ReportDocument,
    ReportFormat, RuleKind, RuleList, RuleRepository, RuleStore, Side, StatusRule, TableShape,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pr-cli")]
#[command(about = "Policy submission reconciliation", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a submitted file against the CRM export
    Compare {
        /// CRM export (trusted side)
        #[arg(short, long)]
        authoritative: PathBuf,

        /// Submitted file
        #[arg(short, long)]
        incoming: PathBuf,

        /// Include matched records in the output
        #[arg(long)]
        show_matches: bool,

        /// Output format (text, csv or json)
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rule store file, overrides the config
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Parse and display a single upload
    Parse {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Which kind of file it is (authoritative or incoming)
        #[arg(short, long)]
        shape: String,

        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Inspect or edit the equivalence rules
    Rules {
        /// Rule store file
        #[arg(long, global = true)]
        rules: Option<PathBuf>,

        #[command(subcommand)]
        action: RulesAction,
    },

    /// Create a config file template
    CreateConfig {
        /// Output path for the config file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// Show both rule lists
    List,

    /// Treat a CRM status as equal to a submitted one
    AddStatus {
        #[arg(long)]
        authoritative: String,

        #[arg(long)]
        incoming: String,
    },

    /// Treat a CRM product as equal to a submitted one
    AddProduct {
        #[arg(long)]
        authoritative: String,

        #[arg(long)]
        incoming: String,

        /// Also require this secondary (tiered risk) value
        #[arg(long)]
        secondary: Option<String>,
    },

    /// Remove one rule by its position in `rules list`
    Remove {
        /// status or product
        #[arg(short, long)]
        kind: String,

        #[arg(short, long)]
        index: usize,
    },

    /// Restore the built-in rules
    Reset {
        /// status or product; both when omitted
        #[arg(short, long)]
        kind: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> pr_core::Result<()> {
    match cli.command {
        Commands::Compare {
            authoritative,
            incoming,
            show_matches,
            format,
            output,
            config,
            rules,
        } => cmd_compare(
            &authoritative,
            &incoming,
            show_matches,
            &format,
            output.as_deref(),
            config.as_deref(),
            rules,
        ),
        Commands::Parse { file, shape, limit } => cmd_parse(&file, &shape, limit),
        Commands::Rules { rules, action } => cmd_rules(rule_store(rules, None), action),
        Commands::CreateConfig { output } => cmd_create_config(&output),
    }
}

fn rule_store(explicit: Option<PathBuf>, config: Option<&ReconConfig>) -> RuleStore<JsonFileStore> {
    let path = explicit
        .or_else(|| config.and_then(|c| c.rules_path.clone()))
        .unwrap_or_else(JsonFileStore::default_path);
    info!(path = %path.display(), "using rule store");
    RuleStore::new(JsonFileStore::new(path))
}

fn cmd_compare(
    authoritative: &Path,
    incoming: &Path,
    show_matches: bool,
    format: &str,
    output: Option<&Path>,
    config: Option<&Path>,
    rules: Option<PathBuf>,
) -> pr_core::Result<()> {
    let format: ReportFormat = format.parse()?;
    let config = match config {
        Some(path) => ReconConfig::load(path)?,
        None => ReconConfig::default(),
    };
    let store = rule_store(rules, Some(&config));
    let snapshot = store.snapshot()?;

    let auth = parse_file(authoritative, &TableShape::authoritative())?;
    let inc = parse_file(incoming, &TableShape::incoming())?;
    for warning in auth.warnings.iter().chain(&inc.warnings) {
        eprintln!("warning: {}", warning);
    }

    let auth_records = AuthoritativeRecord::from_table(&auth.table);
    let inc_records = IncomingRecord::from_table(&inc.table);

    let reconciler = Reconciler::new(snapshot, config.options);
    let candidates = reconciler.compare(&auth_records, &inc_records);
    let stats = ReconStats::compute(inc_records.len(), &candidates);
    let document = ReportDocument::new(&candidates, stats, config.options, show_matches);

    match output {
        Some(path) => {
            export(path, format, &document)?;
            println!("Wrote {} records to {}", document.records.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            match format {
                ReportFormat::Text => write!(out, "{}", render_text(document.records.iter().copied()))?,
                ReportFormat::Csv => write_csv(document.records.iter().copied(), &mut out)?,
                ReportFormat::Json => {
                    serde_json::to_writer_pretty(&mut out, &document)?;
                    writeln!(out)?;
                }
            }
        }
    }

    eprintln!();
    eprintln!("Incoming records: {}", stats.total_incoming);
    eprintln!("Mismatched:       {}", stats.mismatched);
    eprintln!("Not found:        {}", stats.not_found);
    eprintln!("Clean:            {}", stats.clean);

    Ok(())
}

fn cmd_parse(file: &Path, shape: &str, limit: Option<usize>) -> pr_core::Result<()> {
    let side: Side = shape.parse()?;
    let parsed = parse_file(file, &TableShape::for_side(side))?;
    let table = &parsed.table;

    println!("File: {}", file.display());
    println!("Shape: {}", side);
    println!("Header row: {}", parsed.header_row);
    println!("Columns: {}", table.column_count());
    println!("Rows: {}", table.row_count());
    println!();

    let header: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join("\t"));
    println!("{}", "-".repeat(header.len() * 12));

    let row_limit = limit.unwrap_or(10);
    for row in table.rows.iter().take(row_limit) {
        println!("{}", row.cells.join("\t"));
    }
    if table.row_count() > row_limit {
        println!("... ({} more rows)", table.row_count() - row_limit);
    }

    if !parsed.warnings.is_empty() {
        println!();
        println!("Warnings ({}):", parsed.warnings.len());
        for warning in &parsed.warnings {
            println!("  {}", warning);
        }
    }

    Ok(())
}

fn cmd_rules(mut store: RuleStore<JsonFileStore>, action: RulesAction) -> pr_core::Result<()> {
    match action {
        RulesAction::List => {
            print_rules(&store.load(RuleKind::Status)?);
            println!();
            print_rules(&store.load(RuleKind::Product)?);
        }
        RulesAction::AddStatus {
            authoritative,
            incoming,
        } => {
            let mut rules = store.status_rules()?;
            rules.push(StatusRule::new(&authoritative, &incoming));
            store.save_status_rules(rules)?;
            println!("Added status rule: {} = {}", authoritative, incoming);
        }
        RulesAction::AddProduct {
            authoritative,
            incoming,
            secondary,
        } => {
            let rule = match &secondary {
                Some(value) => ProductRule::with_secondary(&authoritative, &incoming, value),
                None => ProductRule::new(&authoritative, &incoming),
            };
            let mut rules = store.product_rules()?;
            rules.push(rule);
            store.save_product_rules(rules)?;
            println!("Added product rule: {} = {}", authoritative, incoming);
        }
        RulesAction::Remove { kind, index } => {
            let kind: RuleKind = kind.parse()?;
            let mut list = store.load(kind)?;
            list.remove(index)?;
            store.save(&list)?;
            println!("Removed {} rule {} ({} left)", kind, index, list.len());
        }
        RulesAction::Reset { kind } => {
            let kinds = match kind {
                Some(k) => vec![k.parse::<RuleKind>()?],
                None => RuleKind::all().to_vec(),
            };
            for kind in kinds {
                store.reset(kind)?;
                println!("Reset {} rules to defaults", kind);
            }
        }
    }
    println!("Rule store: {}", store.store().path().display());
    Ok(())
}

fn print_rules(list: &RuleList) {
    println!("{} rules ({}):", list.kind(), list.len());
    match list {
        RuleList::Status(rules) => {
            for (i, rule) in rules.iter().enumerate() {
                println!("  {}. {} = {}", i, rule.authoritative, rule.incoming);
            }
        }
        RuleList::Product(rules) => {
            for (i, rule) in rules.iter().enumerate() {
                match (&rule.secondary_value, rule.constrain_secondary) {
                    (Some(value), true) => println!(
                        "  {}. {} = {} [{}]",
                        i, rule.authoritative, rule.incoming, value
                    ),
                    _ => println!("  {}. {} = {}", i, rule.authoritative, rule.incoming),
                }
            }
        }
    }
}

fn cmd_create_config(output: &Path) -> pr_core::Result<()> {
    let config = ReconConfig {
        rules_path: Some(JsonFileStore::default_path()),
        ..ReconConfig::default()
    };
    config.save(output)?;

    println!("Created config template: {}", output.display());
    println!();
    println!("Options:");
    println!("  on_unmatched: skip | flag_all_mismatch");
    println!("  product_comparison: exact_then_rules | rules_only");
    println!("  status_case: sensitive | insensitive");

    Ok(())
}
