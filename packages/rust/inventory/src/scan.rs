//! Inventory generation from a documentation tree.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use wikimig_markdown::{count_words, parse_frontmatter};
use wikimig_shared::{MigrationError, Result, Ruleset, UnitStatus};

use crate::naming::{derive_target_page_name, priority_for};
use crate::store::InventoryRecord;

/// Longest description kept in the `notes` column.
const NOTES_MAX_CHARS: usize = 200;

/// Source extensions picked up by the scan.
pub const SOURCE_EXTENSIONS: [&str; 2] = ["md", "mdx"];

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Relative, `/`-separated source paths under `root`, sorted.
pub fn list_sources(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(MigrationError::Inventory(format!(
            "source directory not found: {}",
            root.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            MigrationError::Inventory(format!("walk {}: {e}", root.display()))
        })?;
        if !entry.file_type().is_file() || !is_source_file(entry.path()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        paths.push(rel.to_string_lossy().replace('\\', "/"));
    }
    paths.sort();
    Ok(paths)
}

fn count_images(content: &str) -> usize {
    static MD_IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
    static HTML_IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<img\s+[^>]*src=").expect("valid regex"));

    MD_IMAGE_RE.find_iter(content).count() + HTML_IMAGE_RE.find_iter(content).count()
}

fn count_links(content: &str) -> usize {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?:^|[^!])\[[^\]]*\]\([^)]+\)").expect("valid regex"));

    LINK_RE.find_iter(content).count()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Build one inventory row per source file under `root`.
///
/// Unreadable files are skipped with a warning. Rows are ordered by
/// priority, then source path.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn scan_corpus(root: &Path, source_type: &str, ruleset: &Ruleset) -> Result<Vec<InventoryRecord>> {
    let mut records = Vec::new();

    for rel in list_sources(root)? {
        let path = root.join(&rel);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let parsed = parse_frontmatter(&content);
        let fm = &parsed.frontmatter;
        let stem = Path::new(&rel)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        records.push(InventoryRecord {
            source_path: rel.clone(),
            source_type: source_type.to_string(),
            title: fm.title.clone().unwrap_or(stem),
            target_wiki_page: derive_target_page_name(&rel, &ruleset.url_conventions),
            priority: priority_for(
                &rel,
                &ruleset.inventory.priority_rules,
                &ruleset.inventory.default_priority,
            ),
            status: UnitStatus::NotStarted.as_str().to_string(),
            word_count: Some(count_words(&parsed.body)),
            images: Some(count_images(&content)),
            links: Some(count_links(&content)),
            links_verified: Some(0),
            difficulty: fm.difficulty.clone().unwrap_or_default(),
            keywords: fm.keywords.join(", "),
            notes: fm
                .description
                .as_deref()
                .map(|d| truncate_chars(d, NOTES_MAX_CHARS))
                .unwrap_or_default(),
            ..Default::default()
        });
        debug!(source = %rel, "inventoried");
    }

    records.sort_by(|a, b| {
        (a.priority.as_str(), a.source_path.as_str()).cmp(&(b.priority.as_str(), b.source_path.as_str()))
    });
    info!(records = records.len(), "corpus scanned");
    Ok(records)
}
