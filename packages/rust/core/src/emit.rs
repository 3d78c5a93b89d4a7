//! Run output: page files, metadata, reports and the run manifest.
//!
//! Every file is written atomically (temp file, then rename). Pages are only
//! written for a publishable run unless emission is forced; reports are
//! always written. No page file is ever written twice in one emission.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use wikimig_shared::{
    DocumentUnit, Frontmatter, LinkProposal, MigrationError, Result, Role, ScoreReport,
    UnitStatus, UnitWarning, write_atomic,
};

use crate::pipeline::RunOutcome;

pub const PAGES_DIR: &str = "pages";
pub const METADATA_FILE: &str = "metadata.json";
pub const REPORT_JSON_FILE: &str = "report.json";
pub const REPORT_CSV_FILE: &str = "report.csv";
pub const RUN_MANIFEST_FILE: &str = "run.json";
pub const INVENTORY_FILE: &str = "inventory.csv";
pub const PAGE_EXTENSION: &str = "wiki";

/// Per-unit metadata consumed by the upload step.
#[derive(Debug, Clone, Serialize)]
pub struct PageMetadata<'a> {
    pub source_path: &'a str,
    pub target_page_name: &'a str,
    pub status: UnitStatus,
    pub role: Role,
    pub word_count: usize,
    pub categories: &'a [String],
    pub related_links: &'a [String],
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub proposed_links: &'a [LinkProposal],
    pub frontmatter: &'a Frontmatter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<&'a ScoreReport>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub warnings: &'a [UnitWarning],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<&'a str>,
    /// Page file relative to the output directory, when written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_file: Option<String>,
    /// SHA-256 of the output markup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

/// `run.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    pub units: usize,
    pub blockers: usize,
    pub warnings: usize,
    pub publishable: bool,
    pub forced: bool,
    pub pages_written: usize,
}

#[derive(Debug, Clone, Serialize)]
struct CsvRow<'a> {
    source_path: &'a str,
    target_page_name: &'a str,
    status: &'a str,
    role: String,
    word_count: usize,
    score: String,
    notes: &'a str,
}

/// What [`emit_outputs`] wrote.
#[derive(Debug, Clone)]
pub struct EmitSummary {
    pub out_dir: PathBuf,
    pub pages_written: usize,
    pub markup_withheld: bool,
    pub manifest: RunManifest,
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| MigrationError::serialization(format!("{}: {e}", path.display())))?;
    write_atomic(path, json.as_bytes())?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Relative page file for a target: `Security/Jwt_Auth` → `pages/Security/Jwt_Auth.wiki`.
pub fn page_file_for(target: &str) -> PathBuf {
    let mut path = PathBuf::from(PAGES_DIR);
    let segments: Vec<String> = target
        .split('/')
        .filter(|s| !s.trim().is_empty())
        .map(|s| match s {
            "." | ".." => "_".to_string(),
            other => other.replace(['\\', ':'], "_"),
        })
        .collect();
    let Some((last, dirs)) = segments.split_last() else {
        return path.join(format!("_.{PAGE_EXTENSION}"));
    };
    for dir in dirs {
        path.push(dir);
    }
    path.push(format!("{last}.{PAGE_EXTENSION}"));
    path
}

fn render_csv(outcome: &RunOutcome) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &outcome.report.rows {
        writer
            .serialize(CsvRow {
                source_path: &row.source_path,
                target_page_name: &row.target_page_name,
                status: row.status.as_str(),
                role: row.role.to_string(),
                word_count: row.word_count,
                score: row.score.map(|s| s.to_string()).unwrap_or_default(),
                notes: &row.notes,
            })
            .map_err(|e| MigrationError::serialization(format!("report row: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| MigrationError::serialization(format!("flush report: {e}")))
}

fn emittable(unit: &DocumentUnit) -> Option<&str> {
    if unit.status.is_active() {
        unit.output_markup.as_deref()
    } else {
        None
    }
}

/// Page file for every unit with markup to emit, in unit order.
///
/// Two units claiming the same file (a target collision, or two targets
/// that sanitize alike) is an error and nothing is planned.
fn plan_pages(units: &[DocumentUnit]) -> Result<Vec<Option<PathBuf>>> {
    let mut claimed: BTreeMap<PathBuf, &str> = BTreeMap::new();
    let mut plan = Vec::with_capacity(units.len());
    for unit in units {
        if emittable(unit).is_none() {
            plan.push(None);
            continue;
        }
        let rel = page_file_for(&unit.target_page_name);
        if let Some(previous) = claimed.insert(rel.clone(), &unit.source_path) {
            return Err(MigrationError::validation(format!(
                "{} would be written for both {previous} and {}",
                rel.display(),
                unit.source_path
            )));
        }
        plan.push(Some(rel));
    }
    Ok(plan)
}

/// Write all run outputs under `out_dir`.
///
/// Forcing emission past blockers still refuses to write any page whose
/// file another unit also claims; that case fails before anything is
/// written.
#[instrument(skip_all, fields(out_dir = %out_dir.display(), force = force))]
pub fn emit_outputs(out_dir: &Path, outcome: &RunOutcome, force: bool) -> Result<EmitSummary> {
    let publishable = outcome.report.is_publishable();
    let write_pages = publishable || force;
    let pages = if write_pages {
        plan_pages(&outcome.units)?
    } else {
        warn!(
            blockers = outcome.report.blockers.len(),
            "blockers present, page markup withheld"
        );
        vec![None; outcome.units.len()]
    };

    std::fs::create_dir_all(out_dir).map_err(|e| MigrationError::io(out_dir, e))?;

    let mut metadata = Vec::with_capacity(outcome.units.len());
    let mut pages_written = 0;
    for (unit, rel) in outcome.units.iter().zip(pages) {
        let markup = emittable(unit);
        let mut page_file = None;
        if let (Some(markup), Some(rel)) = (markup, rel) {
            write_atomic(&out_dir.join(&rel), markup.as_bytes())?;
            debug!(source = %unit.source_path, page = %rel.display(), "wrote page");
            page_file = Some(rel.to_string_lossy().replace('\\', "/"));
            pages_written += 1;
        }

        metadata.push(PageMetadata {
            source_path: &unit.source_path,
            target_page_name: &unit.target_page_name,
            status: unit.status,
            role: unit.role,
            word_count: unit.word_count,
            categories: &unit.categories,
            related_links: &unit.related_links,
            proposed_links: &unit.proposed_links,
            frontmatter: &unit.frontmatter,
            score: unit.score.as_ref(),
            warnings: &unit.warnings,
            failure: unit.failure.as_deref(),
            priority: unit.priority.as_deref(),
            page_file,
            sha256: markup.map(sha256_hex),
        });
    }

    write_json(&out_dir.join(METADATA_FILE), &metadata)?;
    write_json(&out_dir.join(REPORT_JSON_FILE), &outcome.report)?;
    write_atomic(&out_dir.join(REPORT_CSV_FILE), &render_csv(outcome)?)?;
    if let Some(inventory) = &outcome.inventory {
        inventory.save(&out_dir.join(INVENTORY_FILE))?;
    }

    let manifest = RunManifest {
        run_id: uuid::Uuid::now_v7().to_string(),
        generated_at: Utc::now(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        units: outcome.units.len(),
        blockers: outcome.report.blockers.len(),
        warnings: outcome.report.warnings.len(),
        publishable,
        forced: force && !publishable,
        pages_written,
    };
    write_json(&out_dir.join(RUN_MANIFEST_FILE), &manifest)?;

    info!(pages_written, publishable, "outputs written");
    Ok(EmitSummary {
        out_dir: out_dir.to_path_buf(),
        pages_written,
        markup_withheld: !write_pages,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkGraph;
    use crate::validator::validate;
    use wikimig_shared::{PipelineConfig, Ruleset};

    #[test]
    fn page_files_map_slashes_to_directories() {
        assert_eq!(
            page_file_for("Security/Jwt_Auth"),
            PathBuf::from("pages").join("Security").join("Jwt_Auth.wiki")
        );
        assert_eq!(page_file_for("Faq"), PathBuf::from("pages").join("Faq.wiki"));
        assert_eq!(
            page_file_for("../Escape"),
            PathBuf::from("pages").join("_").join("Escape.wiki")
        );
    }

    fn outcome(units: Vec<DocumentUnit>) -> RunOutcome {
        let ruleset = Ruleset::compile(&PipelineConfig::default()).expect("ruleset");
        let report = validate(&units, &LinkGraph::default(), &ruleset);
        RunOutcome {
            units,
            graph: LinkGraph::default(),
            proposals: Vec::new(),
            report,
            inventory: None,
        }
    }

    fn page(source: &str, target: &str, body: &str) -> DocumentUnit {
        let mut unit = DocumentUnit::new(source, target, body);
        unit.status = UnitStatus::Converted;
        unit.word_count = 600;
        unit.output_markup = Some(body.to_string());
        unit
    }

    #[test]
    fn targets_sharing_a_page_file_are_refused() {
        let outcome = outcome(vec![
            page("a/guide.md", "Setup:Guide", "First.\n"),
            page("b/guide.md", "Setup_Guide", "Second.\n"),
        ]);
        assert!(outcome.report.is_publishable());

        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out");
        let err = emit_outputs(&out, &outcome, false).unwrap_err();
        assert!(matches!(err, MigrationError::Validation { .. }));
        assert!(err.to_string().contains("a/guide.md"));
        assert!(!out.exists());
    }

    #[test]
    fn each_unit_gets_its_own_page() {
        let outcome = outcome(vec![
            page("a.md", "Alpha", "Alpha body.\n"),
            page("b.md", "Beta", "Beta body.\n"),
        ]);
        let dir = tempfile::tempdir().expect("tempdir");
        let summary = emit_outputs(dir.path(), &outcome, false).expect("emit");
        assert_eq!(summary.pages_written, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pages/Alpha.wiki")).expect("alpha"),
            "Alpha body.\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pages/Beta.wiki")).expect("beta"),
            "Beta body.\n"
        );
    }

    #[test]
    fn sha256_is_hex() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
