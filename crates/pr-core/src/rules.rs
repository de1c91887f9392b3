//! Equivalence rules and their persistence
//!
//! Two independent rule lists decide when differently spelled values count
//! as equal: status synonyms and product synonyms. Product rules can also
//! require a particular secondary attribute on the incoming record.
//!
//! Lists live in a flat key-value area. Reads fall back to built-in defaults
//! when nothing is stored; writes always replace the whole list.

use crate::config::CaseSensitivity;
use crate::error::{Error, Result};
use crate::record::IncomingRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Status synonym: `authoritative` on the trusted side equals `incoming`
///
/// Directional. The pair does not imply its reverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRule {
    #[serde(rename = "salesforce")]
    pub authoritative: String,
    pub incoming: String,
}

impl StatusRule {
    pub fn new(authoritative: &str, incoming: &str) -> Self {
        Self {
            authoritative: authoritative.to_string(),
            incoming: incoming.to_string(),
        }
    }

    pub fn matches(&self, authoritative: &str, incoming: &str, case: CaseSensitivity) -> bool {
        case.equals(&self.authoritative, authoritative) && case.equals(&self.incoming, incoming)
    }
}

/// Product synonym, optionally constrained on the incoming secondary attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRule {
    #[serde(rename = "salesforce")]
    pub authoritative: String,
    pub incoming: String,
    #[serde(rename = "includeTieredRisk", default)]
    pub constrain_secondary: bool,
    #[serde(
        rename = "tieredRiskValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secondary_value: Option<String>,
}

impl ProductRule {
    pub fn new(authoritative: &str, incoming: &str) -> Self {
        Self {
            authoritative: authoritative.to_string(),
            incoming: incoming.to_string(),
            constrain_secondary: false,
            secondary_value: None,
        }
    }

    pub fn with_secondary(authoritative: &str, incoming: &str, secondary: &str) -> Self {
        Self {
            authoritative: authoritative.to_string(),
            incoming: incoming.to_string(),
            constrain_secondary: true,
            secondary_value: Some(secondary.to_string()),
        }
    }

    /// Does this rule make `authoritative_product` equivalent to the record?
    ///
    /// The rule's incoming value may name either the bare product or the
    /// effective "product + secondary" string. A constrained rule also
    /// requires the record's secondary attribute to equal `secondary_value`.
    pub fn matches(&self, authoritative_product: &str, incoming: &IncomingRecord) -> bool {
        if self.authoritative != authoritative_product {
            return false;
        }
        if self.incoming != incoming.product && self.incoming != incoming.effective_product() {
            return false;
        }
        if self.constrain_secondary {
            let required = self.secondary_value.as_deref().unwrap_or_default();
            return incoming.secondary == required;
        }
        true
    }
}

/// Which rule list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Status,
    Product,
}

impl RuleKind {
    /// Key the list is stored under
    pub fn storage_key(&self) -> &'static str {
        match self {
            RuleKind::Status => "statusMappings",
            RuleKind::Product => "productMappings",
        }
    }

    pub fn all() -> [RuleKind; 2] {
        [RuleKind::Status, RuleKind::Product]
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Status => write!(f, "status"),
            RuleKind::Product => write!(f, "product"),
        }
    }
}

impl FromStr for RuleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "status" => Ok(RuleKind::Status),
            "product" => Ok(RuleKind::Product),
            other => Err(Error::InvalidArgument(format!(
                "unknown rule kind '{other}', expected 'status' or 'product'"
            ))),
        }
    }
}

/// A full rule list of one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleList {
    Status(Vec<StatusRule>),
    Product(Vec<ProductRule>),
}

impl RuleList {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleList::Status(_) => RuleKind::Status,
            RuleList::Product(_) => RuleKind::Product,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RuleList::Status(rules) => rules.len(),
            RuleList::Product(rules) => rules.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Built-in list used when nothing is stored
    pub fn defaults(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Status => RuleList::Status(default_status_rules()),
            RuleKind::Product => RuleList::Product(default_product_rules()),
        }
    }

    /// Remove the rule at `index`, returning an error if it does not exist
    pub fn remove(&mut self, index: usize) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(Error::InvalidArgument(format!(
                "{} rule index {index} out of range (have {len})",
                self.kind()
            )));
        }
        match self {
            RuleList::Status(rules) => {
                rules.remove(index);
            }
            RuleList::Product(rules) => {
                rules.remove(index);
            }
        }
        Ok(())
    }

    fn to_value(&self) -> Result<Value> {
        let value = match self {
            RuleList::Status(rules) => serde_json::to_value(rules)?,
            RuleList::Product(rules) => serde_json::to_value(rules)?,
        };
        Ok(value)
    }

    fn from_value(kind: RuleKind, value: Value) -> Result<Self> {
        let list = match kind {
            RuleKind::Status => RuleList::Status(serde_json::from_value(value)?),
            RuleKind::Product => RuleList::Product(serde_json::from_value(value)?),
        };
        Ok(list)
    }
}

pub fn default_status_rules() -> Vec<StatusRule> {
    vec![StatusRule::new("Policy Issued", "Approved")]
}

pub fn default_product_rules() -> Vec<ProductRule> {
    vec![
        ProductRule::with_secondary(
            "TruStage Advantage Whole Life (TAWL) - Preferred",
            "TAWL",
            "Good Risk",
        ),
        ProductRule::with_secondary(
            "TruStage Advantage Whole Life (TAWL) - Standard",
            "TAWL",
            "Moderate Risk",
        ),
        ProductRule::new("TruStage Guaranteed Whole Life (GAWL)", "GAWL"),
        ProductRule::new("TruStage Term Band 1", "SI Term Band 1"),
        ProductRule::new("TruStage Term Band 2", "SI Term Band 2"),
    ]
}

/// Both rule lists, fetched once per reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceRules {
    pub status: Vec<StatusRule>,
    pub product: Vec<ProductRule>,
}

impl Default for EquivalenceRules {
    fn default() -> Self {
        Self {
            status: default_status_rules(),
            product: default_product_rules(),
        }
    }
}

impl EquivalenceRules {
    /// No rules at all; only literal equality counts
    pub fn empty() -> Self {
        Self {
            status: Vec::new(),
            product: Vec::new(),
        }
    }

    pub fn status_equivalent(&self, authoritative: &str, incoming: &str, case: CaseSensitivity) -> bool {
        self.status
            .iter()
            .any(|r| r.matches(authoritative, incoming, case))
    }

    pub fn product_equivalent(&self, authoritative_product: &str, incoming: &IncomingRecord) -> bool {
        self.product
            .iter()
            .any(|r| r.matches(authoritative_product, incoming))
    }
}

/// Flat key-value area holding structured values
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// In-memory store, used by tests and one-shot runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a single JSON object file
///
/// Every `set` rewrites the file; the last writer wins.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `<config dir>/policy-recon/rules.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("policy-recon")
            .join("rules.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| Error::FileRead {
            path: self.path.clone(),
            source: e,
        })?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content).map_err(Error::Json)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&Value::Object(map))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Load/save access to the rule lists
///
/// The engine never reads this directly; callers take a snapshot and pass it in.
pub trait RuleRepository {
    fn load(&self, kind: RuleKind) -> Result<RuleList>;
    fn save(&mut self, rules: &RuleList) -> Result<()>;

    /// Both lists as they are right now
    fn snapshot(&self) -> Result<EquivalenceRules> {
        let status = match self.load(RuleKind::Status)? {
            RuleList::Status(rules) => rules,
            RuleList::Product(_) => default_status_rules(),
        };
        let product = match self.load(RuleKind::Product)? {
            RuleList::Product(rules) => rules,
            RuleList::Status(_) => default_product_rules(),
        };
        Ok(EquivalenceRules { status, product })
    }

    /// Overwrite a list with the built-in defaults
    fn reset(&mut self, kind: RuleKind) -> Result<()> {
        self.save(&RuleList::defaults(kind))
    }
}

/// Rule repository over any key-value store
#[derive(Debug, Clone, Default)]
pub struct RuleStore<S> {
    store: S,
}

impl<S: KeyValueStore> RuleStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn status_rules(&self) -> Result<Vec<StatusRule>> {
        Ok(self.snapshot()?.status)
    }

    pub fn product_rules(&self) -> Result<Vec<ProductRule>> {
        Ok(self.snapshot()?.product)
    }

    pub fn save_status_rules(&mut self, rules: Vec<StatusRule>) -> Result<()> {
        self.save(&RuleList::Status(rules))
    }

    pub fn save_product_rules(&mut self, rules: Vec<ProductRule>) -> Result<()> {
        self.save(&RuleList::Product(rules))
    }
}

impl<S: KeyValueStore> RuleRepository for RuleStore<S> {
    fn load(&self, kind: RuleKind) -> Result<RuleList> {
        let Some(value) = self.store.get(kind.storage_key())? else {
            debug!(%kind, "no stored rules, using defaults");
            return Ok(RuleList::defaults(kind));
        };

        match RuleList::from_value(kind, value) {
            Ok(list) => Ok(list),
            Err(e) => {
                warn!(%kind, error = %e, "stored rules are unreadable, using defaults");
                Ok(RuleList::defaults(kind))
            }
        }
    }

    fn save(&mut self, rules: &RuleList) -> Result<()> {
        let kind = rules.kind();
        debug!(%kind, count = rules.len(), "saving rules");
        self.store.set(kind.storage_key(), rules.to_value()?)
    }
}
