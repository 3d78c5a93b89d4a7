//! CSV-backed migration inventory.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use wikimig_shared::{DocumentUnit, MigrationError, Result, UnitStatus, write_atomic};

/// One inventory row. Column names match the tracking spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub source_path: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub target_wiki_page: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub assigned: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub word_count: Option<usize>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub images: Option<usize>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub links: Option<usize>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub links_verified: Option<usize>,
    #[serde(default)]
    pub difficulty: String,
    /// Comma-separated.
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub notes: String,
}

impl InventoryRecord {
    pub fn status(&self) -> UnitStatus {
        UnitStatus::from_inventory(&self.status)
    }

    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Read access to a migration inventory.
pub trait InventoryStore: Send + Sync {
    /// Record for a source path.
    fn get(&self, source_path: &str) -> Option<&InventoryRecord>;

    /// All records in file order.
    fn records(&self) -> &[InventoryRecord];

    /// Source path of the record targeting `target`.
    fn source_for_target(&self, target: &str) -> Option<&str>;
}

/// Inventory stored as a CSV file.
#[derive(Debug, Clone, Default)]
pub struct CsvInventory {
    records: Vec<InventoryRecord>,
    by_source: BTreeMap<String, usize>,
    by_target: BTreeMap<String, usize>,
}

fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/")
}

impl CsvInventory {
    pub fn from_records(records: Vec<InventoryRecord>) -> Self {
        let mut inventory = Self::default();
        for record in records {
            inventory.push(record);
        }
        inventory
    }

    fn push(&mut self, mut record: InventoryRecord) {
        record.source_path = normalize_path(&record.source_path);
        if self.by_source.contains_key(&record.source_path) {
            warn!(source = %record.source_path, "duplicate inventory row ignored");
            return;
        }
        let index = self.records.len();
        self.by_source.insert(record.source_path.clone(), index);
        if !record.target_wiki_page.is_empty() {
            self.by_target
                .entry(record.target_wiki_page.clone())
                .or_insert(index);
        }
        self.records.push(record);
    }

    /// Load an inventory. Any unreadable row is fatal.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(path)
            .map_err(|e| {
                MigrationError::Inventory(format!("cannot open {}: {e}", path.display()))
            })?;

        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<InventoryRecord>().enumerate() {
            let record = row.map_err(|e| {
                MigrationError::Inventory(format!(
                    "{} row {}: {e}",
                    path.display(),
                    line + 2
                ))
            })?;
            records.push(record);
        }

        info!(records = records.len(), "inventory loaded");
        Ok(Self::from_records(records))
    }

    /// Write the inventory atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &self.records {
            writer
                .serialize(record)
                .map_err(|e| MigrationError::Inventory(format!("serialize row: {e}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| MigrationError::Inventory(format!("flush csv: {e}")))?;
        write_atomic(path, &bytes)?;

        debug!(path = %path.display(), records = self.records.len(), "inventory saved");
        Ok(())
    }

    /// Fold a run's results back into the inventory.
    ///
    /// Existing rows get status, word count, link count and target updated;
    /// units without a row are appended.
    pub fn update_from_report(&mut self, units: &[DocumentUnit]) {
        for unit in units {
            let source = normalize_path(&unit.source_path);
            match self.index_of(&source) {
                Some(index) => {
                    let record = &mut self.records[index];
                    record.status = unit.status.as_str().to_string();
                    record.word_count = Some(unit.word_count);
                    record.links = Some(unit.related_links.len());
                    if record.target_wiki_page != unit.target_page_name {
                        record.target_wiki_page = unit.target_page_name.clone();
                        self.by_target
                            .entry(unit.target_page_name.clone())
                            .or_insert(index);
                    }
                }
                None => self.push(InventoryRecord {
                    source_path: source,
                    title: unit.frontmatter.title.clone().unwrap_or_default(),
                    target_wiki_page: unit.target_page_name.clone(),
                    priority: unit.priority.clone().unwrap_or_default(),
                    status: unit.status.as_str().to_string(),
                    word_count: Some(unit.word_count),
                    links: Some(unit.related_links.len()),
                    keywords: unit.frontmatter.keywords.join(", "),
                    ..Default::default()
                }),
            }
        }
    }

    /// Row index for a source path, also trying it under `docs/`.
    fn index_of(&self, source_path: &str) -> Option<usize> {
        let source = normalize_path(source_path);
        self.by_source
            .get(&source)
            .or_else(|| self.by_source.get(&format!("docs/{source}")))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl InventoryStore for CsvInventory {
    fn get(&self, source_path: &str) -> Option<&InventoryRecord> {
        self.index_of(source_path).map(|i| &self.records[i])
    }

    fn records(&self) -> &[InventoryRecord] {
        &self.records
    }

    fn source_for_target(&self, target: &str) -> Option<&str> {
        self.by_target
            .get(target)
            .map(|i| self.records[*i].source_path.as_str())
    }
}
