//! Declarative descriptions of the two upload shapes
//!
//! A shape says how to recognise the header row of an upload and how to map
//! whatever header text a particular export used onto canonical column names.

use serde::{Deserialize, Serialize};

/// Canonical column names shared by both shapes
pub mod columns {
    pub const POLICY_ID: &str = "PolicyId";
    pub const APPLICATION_STATUS: &str = "ApplicationStatus";
    pub const PREMIUM_ISSUED: &str = "PremiumIssued";
    pub const PRODUCT_ISSUED: &str = "ProductIssued";
    pub const STATUS: &str = "Status";
    pub const PREMIUM_AMOUNT: &str = "PremiumAmount";
    pub const PRODUCT_TYPE: &str = "ProductType";
    pub const TIERED_RISK: &str = "TieredRisk";
}

/// Default number of leading rows searched for a header
pub const DEFAULT_MAX_HEADER_SCAN: usize = 20;

/// Which side of the reconciliation an upload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Authoritative,
    Incoming,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Authoritative => write!(f, "authoritative"),
            Side::Incoming => write!(f, "incoming"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "authoritative" | "trusted" => Ok(Side::Authoritative),
            "incoming" | "submitted" => Ok(Side::Incoming),
            other => Err(crate::error::Error::InvalidArgument(format!(
                "unknown side '{other}', expected authoritative or incoming"
            ))),
        }
    }
}

/// One expected header cell, with the spellings accepted for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderToken {
    pub alternatives: Vec<String>,
}

impl HeaderToken {
    pub fn one(name: &str) -> Self {
        Self {
            alternatives: vec![name.to_string()],
        }
    }

    pub fn any_of(names: &[&str]) -> Self {
        Self {
            alternatives: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Exact, case-insensitive cell match against any alternative
    pub fn matches(&self, cell: &str) -> bool {
        let cell = cell.trim();
        self.alternatives.iter().any(|a| a.eq_ignore_ascii_case(cell))
    }
}

/// Predicate deciding whether a raw row is the header row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderDetection {
    /// Every token is present as a whole cell somewhere in the row
    AllOf(Vec<HeaderToken>),
    /// Some single cell contains every marker substring
    Fingerprint(Vec<String>),
}

impl HeaderDetection {
    /// Evaluate the predicate over one raw row, case-insensitively
    pub fn is_header<S: AsRef<str>>(&self, cells: &[S]) -> bool {
        match self {
            HeaderDetection::AllOf(tokens) => tokens
                .iter()
                .all(|t| cells.iter().any(|c| t.matches(c.as_ref()))),
            HeaderDetection::Fingerprint(markers) => cells.iter().any(|c| {
                let cell = c.as_ref().trim().to_lowercase();
                markers.iter().all(|m| cell.contains(&m.to_lowercase()))
            }),
        }
    }
}

/// How an observed header is recognised as a canonical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMatcher {
    /// Whole header equals the text, ignoring case
    Exact(String),
    /// Whole header equals one of the texts, ignoring case
    AnyOf(Vec<String>),
    /// Header contains the text, ignoring case
    Contains(String),
    /// Header contains every fragment, anywhere and in any order, ignoring case
    ContainsAll(Vec<String>),
}

impl HeaderMatcher {
    pub fn matches(&self, header: &str) -> bool {
        let header = header.trim();
        match self {
            HeaderMatcher::Exact(s) => header.eq_ignore_ascii_case(s),
            HeaderMatcher::AnyOf(options) => options.iter().any(|s| header.eq_ignore_ascii_case(s)),
            HeaderMatcher::Contains(s) => header.to_lowercase().contains(&s.to_lowercase()),
            HeaderMatcher::ContainsAll(parts) => {
                let header = header.to_lowercase();
                parts.iter().all(|p| header.contains(&p.to_lowercase()))
            }
        }
    }
}

/// A canonical column and the matcher that finds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub canonical: String,
    pub matcher: HeaderMatcher,
}

impl ColumnSpec {
    pub fn new(canonical: &str, matcher: HeaderMatcher) -> Self {
        Self {
            canonical: canonical.to_string(),
            matcher,
        }
    }
}

/// Everything the parser needs to know about one kind of upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    pub name: String,
    pub detection: HeaderDetection,
    /// Ordered; the first column whose matcher accepts a header wins
    pub columns: Vec<ColumnSpec>,
    /// Canonical name of the join key column; rows with an empty key are dropped
    pub key_column: String,
    pub skip_blank_rows: bool,
    pub max_header_scan: usize,
}

impl TableShape {
    /// The trusted export: headers vary across exports, so detection keys
    /// off a "Policy #" style cell and columns are matched by substring.
    pub fn authoritative() -> Self {
        let key_markers = vec!["policy".to_string(), "#".to_string()];
        Self {
            name: "authoritative".to_string(),
            detection: HeaderDetection::Fingerprint(key_markers.clone()),
            columns: vec![
                ColumnSpec::new(columns::POLICY_ID, HeaderMatcher::ContainsAll(key_markers)),
                ColumnSpec::new(
                    columns::APPLICATION_STATUS,
                    HeaderMatcher::Contains("application status".to_string()),
                ),
                ColumnSpec::new(
                    columns::PREMIUM_ISSUED,
                    HeaderMatcher::Contains("premium issued".to_string()),
                ),
                ColumnSpec::new(
                    columns::PRODUCT_ISSUED,
                    HeaderMatcher::Contains("product issued".to_string()),
                ),
            ],
            key_column: columns::POLICY_ID.to_string(),
            skip_blank_rows: true,
            max_header_scan: DEFAULT_MAX_HEADER_SCAN,
        }
    }

    /// The submitted file: fixed header names, `TieredRisk` optional.
    pub fn incoming() -> Self {
        Self {
            name: "incoming".to_string(),
            detection: HeaderDetection::AllOf(vec![
                HeaderToken::any_of(&["PolicyId", "ApplicationID"]),
                HeaderToken::one(columns::STATUS),
                HeaderToken::one(columns::PREMIUM_AMOUNT),
                HeaderToken::one(columns::PRODUCT_TYPE),
            ]),
            columns: vec![
                ColumnSpec::new(
                    columns::POLICY_ID,
                    HeaderMatcher::AnyOf(vec!["PolicyId".to_string(), "ApplicationID".to_string()]),
                ),
                ColumnSpec::new(columns::STATUS, HeaderMatcher::Exact(columns::STATUS.to_string())),
                ColumnSpec::new(
                    columns::PREMIUM_AMOUNT,
                    HeaderMatcher::Exact(columns::PREMIUM_AMOUNT.to_string()),
                ),
                ColumnSpec::new(
                    columns::PRODUCT_TYPE,
                    HeaderMatcher::Exact(columns::PRODUCT_TYPE.to_string()),
                ),
                ColumnSpec::new(
                    columns::TIERED_RISK,
                    HeaderMatcher::Exact(columns::TIERED_RISK.to_string()),
                ),
            ],
            key_column: columns::POLICY_ID.to_string(),
            skip_blank_rows: true,
            max_header_scan: DEFAULT_MAX_HEADER_SCAN,
        }
    }

    /// Built-in shape for a side
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Authoritative => Self::authoritative(),
            Side::Incoming => Self::incoming(),
        }
    }

    /// Map an observed header onto its canonical name, or keep the trimmed text
    pub fn canonical_header(&self, header: &str) -> String {
        self.columns
            .iter()
            .find(|spec| spec.matcher.matches(header))
            .map(|spec| spec.canonical.clone())
            .unwrap_or_else(|| header.trim().to_string())
    }
}
