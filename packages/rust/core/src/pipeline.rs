//! End-to-end migration run: plan → normalize → link → score → validate.
//!
//! Per-unit stages run on a bounded worker pool. Graph building and
//! validation run once over the whole corpus, between and after them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use wikimig_inventory::{
    CsvInventory, InventoryRecord, InventoryStore, derive_target_page_name, list_sources,
    priority_for,
};
use wikimig_markdown::{LinkResolver, NormalizeContext, count_words, normalize, parse_frontmatter};
use wikimig_shared::{
    DocumentUnit, LinkProposal, MigrationError, Result, Role, Ruleset, UnitStatus,
};

use crate::categories::assign_categories;
use crate::graph::{self, LinkGraph, build_graph, commit_links, propose_links};
use crate::render::{PageTitles, page_titles, render_output};
use crate::scoring::score_unit;
use crate::validator::{ValidationReport, validate};

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Where a run reads its corpus from.
#[derive(Debug, Clone)]
pub struct RunInputs {
    /// Source documentation tree (frontmatter and original markdown).
    pub source_dir: PathBuf,
    /// Converter output tree, mirroring `source_dir` with `.wiki` files.
    /// Without it the source body is used as the markup.
    pub converted_dir: Option<PathBuf>,
    /// Migration inventory CSV.
    pub inventory: Option<PathBuf>,
}

/// Shared, read-only run settings.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub ruleset: Arc<Ruleset>,
    /// Worker pool size; 0 means one per available core.
    pub workers: usize,
    pub accept_proposals: bool,
}

impl RunContext {
    /// Context with the run settings from the ruleset.
    pub fn new(ruleset: Ruleset) -> Self {
        Self {
            workers: ruleset.run.workers,
            accept_proposals: ruleset.run.accept_proposals,
            ruleset: Arc::new(ruleset),
        }
    }

    fn pool_size(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Sorted by source path.
    pub units: Vec<DocumentUnit>,
    pub graph: LinkGraph,
    pub proposals: Vec<LinkProposal>,
    pub report: ValidationReport,
    /// The loaded inventory, updated from this run.
    pub inventory: Option<CsvInventory>,
}

/// Run-level cancellation flag, checked between per-unit stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Trait for reporting pipeline progress to the caller.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a unit finishes a per-unit stage.
    fn unit_processed(&self, source_path: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn unit_processed(&self, _source_path: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// One source file to process, with its inventory decisions applied.
#[derive(Debug, Clone)]
pub struct UnitPlan {
    pub source_path: String,
    pub target_page_name: String,
    pub priority: String,
    pub skip: bool,
    pub source_file: PathBuf,
    pub converted_file: Option<PathBuf>,
}

impl UnitPlan {
    fn failed(&self, reason: impl Into<String>) -> DocumentUnit {
        let mut unit = DocumentUnit::new(&self.source_path, &self.target_page_name, "");
        unit.priority = Some(self.priority.clone());
        unit.fail(reason);
        unit
    }
}

fn inventory_row<'a>(inventory: Option<&'a CsvInventory>, rel: &str) -> Option<&'a InventoryRecord> {
    inventory?.get(rel)
}

fn converted_path(dir: &Path, rel: &str) -> PathBuf {
    let stem = rel.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(rel);
    dir.join(format!("{stem}.wiki"))
}

/// List the corpus and decide target, priority and skip state per file.
///
/// An unreadable inventory is fatal.
pub fn plan_corpus(inputs: &RunInputs, ruleset: &Ruleset) -> Result<(Vec<UnitPlan>, Option<CsvInventory>)> {
    let inventory = inputs
        .inventory
        .as_deref()
        .map(CsvInventory::load)
        .transpose()?;

    let mut plans = Vec::new();
    for rel in list_sources(&inputs.source_dir)? {
        let row = inventory_row(inventory.as_ref(), &rel);
        let target_page_name = row
            .map(|r| r.target_wiki_page.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| derive_target_page_name(&rel, &ruleset.url_conventions));
        let priority = row
            .map(|r| r.priority.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                priority_for(
                    &rel,
                    &ruleset.inventory.priority_rules,
                    &ruleset.inventory.default_priority,
                )
            });

        plans.push(UnitPlan {
            source_file: inputs.source_dir.join(&rel),
            converted_file: inputs
                .converted_dir
                .as_deref()
                .map(|dir| converted_path(dir, &rel)),
            skip: row.is_some_and(|r| r.status() == UnitStatus::SkipEmptyDraft),
            source_path: rel,
            target_page_name,
            priority,
        });
    }
    Ok((plans, inventory))
}

// ---------------------------------------------------------------------------
// Per-unit stages
// ---------------------------------------------------------------------------

/// Stage 1 for one unit: read, parse, normalize, categorize.
///
/// I/O failures mark the unit `Error`; they never fail the run.
pub fn prepare_unit(plan: &UnitPlan, ruleset: &Ruleset, resolver: &LinkResolver) -> DocumentUnit {
    let mut unit = DocumentUnit::new(&plan.source_path, &plan.target_page_name, "");
    unit.priority = Some(plan.priority.clone());
    if plan.skip {
        unit.status = UnitStatus::SkipEmptyDraft;
        return unit;
    }

    let source = match std::fs::read_to_string(&plan.source_file) {
        Ok(text) => text,
        Err(e) => {
            warn!(source = %plan.source_path, error = %e, "cannot read source");
            unit.fail(format!("cannot read source: {e}"));
            return unit;
        }
    };
    let parsed = parse_frontmatter(&source);
    unit.frontmatter = parsed.frontmatter;
    unit.warnings = parsed.warnings;
    unit.source_word_count = Some(count_words(&parsed.body));

    unit.raw_markup = match &plan.converted_file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(source = %plan.source_path, path = %path.display(), error = %e, "converter output missing");
                unit.fail(format!("converter output {}: {e}", path.display()));
                return unit;
            }
        },
        None => parsed.body,
    };

    finish_preparation(&mut unit, ruleset, resolver);
    unit
}

fn finish_preparation(unit: &mut DocumentUnit, ruleset: &Ruleset, resolver: &LinkResolver) {
    let ctx = NormalizeContext {
        ruleset,
        resolver,
        source_path: &unit.source_path,
    };
    let normalized = normalize(&unit.raw_markup, &ctx);
    unit.warnings.extend(normalized.warnings);
    unit.word_count = count_words(&normalized.text);
    unit.normalized_markup = Some(normalized.text);

    let assignment = assign_categories(&unit.source_path, &unit.frontmatter, ruleset);
    unit.categories = assignment.categories;
    unit.warnings.extend(assignment.warnings);

    unit.status = if unit.word_count < ruleset.validation.expansion_threshold {
        UnitStatus::NeedsExpansion
    } else {
        UnitStatus::Converted
    };
    debug!(
        source = %unit.source_path,
        words = unit.word_count,
        warnings = unit.warnings.len(),
        "unit prepared"
    );
}

/// Process a single document outside a corpus run.
///
/// Links are resolved against nothing but the document itself; related
/// links come from its own header and body.
pub fn score_document(source_path: &str, text: &str, ruleset: &Ruleset) -> DocumentUnit {
    let target = derive_target_page_name(source_path, &ruleset.url_conventions);
    let resolver = LinkResolver::new(&[(source_path, target.as_str())], &ruleset.run.strip_prefixes);

    let parsed = parse_frontmatter(text);
    let source_words = count_words(&parsed.body);
    let mut unit = DocumentUnit::new(source_path, &target, parsed.body);
    unit.source_word_count = Some(source_words);
    unit.frontmatter = parsed.frontmatter;
    unit.warnings = parsed.warnings;
    finish_preparation(&mut unit, ruleset, &resolver);

    unit.role = if graph::is_directory_index(source_path) {
        Role::Hub
    } else {
        Role::Leaf
    };
    let mut related = graph::declared_links(&unit, &resolver);
    related.truncate(ruleset.links.band(unit.role).max);
    unit.related_links = related;
    unit.output_markup = Some(render_output(&unit, &PageTitles::new(), ruleset));
    unit.score = Some(score_unit(&unit, ruleset));
    unit
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

fn join_failure(e: tokio::task::JoinError) -> String {
    if e.is_panic() {
        "worker panicked".to_string()
    } else {
        format!("worker aborted: {e}")
    }
}

/// Run `f` over `items` on at most `workers` blocking threads.
///
/// Results come back in input order. A panicking item yields `Err(reason)`
/// in its slot. Items not yet started when `cancel` fires are skipped and
/// the whole call returns `Cancelled`.
async fn run_pool<T, R, F>(
    items: Vec<(String, T)>,
    workers: usize,
    cancel: &CancelToken,
    progress: &dyn ProgressReporter,
    f: F,
) -> Result<Vec<std::result::Result<R, String>>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let f = Arc::new(f);
    let mut set = JoinSet::new();

    for (index, (label, item)) in items.into_iter().enumerate() {
        let sem = semaphore.clone();
        let cancel = cancel.clone();
        let f = f.clone();
        set.spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return (index, label, None);
            };
            if cancel.is_cancelled() {
                return (index, label, None);
            }
            let result = tokio::task::spawn_blocking(move || (*f)(item))
                .await
                .map_err(join_failure);
            (index, label, Some(result))
        });
    }

    let mut slots: Vec<Option<std::result::Result<R, String>>> = (0..total).map(|_| None).collect();
    let mut completed = 0;
    while let Some(joined) = set.join_next().await {
        let (index, label, result) = joined.map_err(|e| MigrationError::Worker(e.to_string()))?;
        let Some(result) = result else {
            continue;
        };
        if let Err(reason) = &result {
            warn!(source = %label, %reason, "unit failed in worker");
        }
        completed += 1;
        progress.unit_processed(&label, completed, total);
        slots[index] = Some(result);
    }

    if cancel.is_cancelled() {
        return Err(MigrationError::Cancelled { completed, total });
    }
    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| MigrationError::Worker("worker produced no result".into())))
        .collect()
}

fn check_cancelled(cancel: &CancelToken, completed: usize, total: usize) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(MigrationError::Cancelled { completed, total });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run the full migration pipeline over a corpus.
///
/// 1. Plan: list sources, apply the inventory
/// 2. Prepare each unit (parse, normalize, categorize) on the pool
/// 3. Build the link graph, propose and optionally commit links, render
/// 4. Score each unit on the pool
/// 5. Validate the corpus
///
/// Nothing is written to disk; see [`crate::emit::emit_outputs`].
#[instrument(skip_all, fields(source = %inputs.source_dir.display()))]
pub async fn run_pipeline(
    inputs: &RunInputs,
    ctx: &RunContext,
    cancel: &CancelToken,
    progress: &dyn ProgressReporter,
) -> Result<RunOutcome> {
    let ruleset = ctx.ruleset.clone();
    let workers = ctx.pool_size();

    // --- Phase 1: Planning ---
    progress.phase("Planning");
    let (plans, mut inventory) = plan_corpus(inputs, &ruleset)?;
    let total = plans.len();
    let entries: Vec<(&str, &str)> = plans
        .iter()
        .map(|p| (p.source_path.as_str(), p.target_page_name.as_str()))
        .collect();
    let resolver = Arc::new(LinkResolver::new(&entries, &ruleset.run.strip_prefixes));
    info!(units = total, workers, "corpus planned");
    check_cancelled(cancel, 0, total)?;

    // --- Phase 2: Prepare ---
    progress.phase("Normalizing");
    let items: Vec<(String, UnitPlan)> = plans
        .iter()
        .map(|p| (p.source_path.clone(), p.clone()))
        .collect();
    let prepared = {
        let ruleset = ruleset.clone();
        let resolver = resolver.clone();
        run_pool(items, workers, cancel, progress, move |plan: UnitPlan| {
            prepare_unit(&plan, &ruleset, &resolver)
        })
        .await?
    };
    let mut units: Vec<DocumentUnit> = prepared
        .into_iter()
        .zip(&plans)
        .map(|(result, plan)| result.unwrap_or_else(|reason| plan.failed(reason)))
        .collect();
    units.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    info!(
        failed = units.iter().filter(|u| u.status == UnitStatus::Error).count(),
        "stage complete: prepare"
    );
    check_cancelled(cancel, total, total)?;

    // --- Phase 3: Link ---
    progress.phase("Linking");
    let mut graph = build_graph(&units, &ruleset, &resolver).apply(&mut units);
    let proposals = propose_links(&units, &graph, &ruleset);
    for unit in units.iter_mut() {
        unit.proposed_links = proposals
            .iter()
            .filter(|p| p.source_path == unit.source_path)
            .cloned()
            .collect();
    }
    if ctx.accept_proposals && !proposals.is_empty() {
        units = commit_links(&units, &proposals, &ruleset);
        for unit in &units {
            for target in &unit.related_links {
                graph.insert_related(&unit.target_page_name, target);
            }
        }
        graph.refresh_orphans();
        info!(committed = proposals.len(), "link proposals committed");
    }
    let titles = page_titles(&units);
    for unit in units.iter_mut().filter(|u| u.status.is_active()) {
        unit.output_markup = Some(render_output(unit, &titles, &ruleset));
    }
    check_cancelled(cancel, total, total)?;

    // --- Phase 4: Score ---
    progress.phase("Scoring");
    let scored: Vec<usize> = (0..units.len())
        .filter(|i| units[*i].status.is_active())
        .collect();
    let shared = Arc::new(units);
    let items: Vec<(String, usize)> = scored
        .iter()
        .map(|i| (shared[*i].source_path.clone(), *i))
        .collect();
    let scores = {
        let ruleset = ruleset.clone();
        let shared = shared.clone();
        run_pool(items, workers, cancel, progress, move |i: usize| {
            score_unit(&shared[i], &ruleset)
        })
        .await?
    };
    let mut units = Arc::try_unwrap(shared).unwrap_or_else(|arc| (*arc).clone());
    for (index, result) in scored.into_iter().zip(scores) {
        match result {
            Ok(report) => units[index].score = Some(report),
            Err(reason) => units[index].fail(reason),
        }
    }
    info!(scored = units.iter().filter(|u| u.score.is_some()).count(), "stage complete: score");

    // --- Phase 5: Validate ---
    progress.phase("Validating");
    let report = validate(&units, &graph, &ruleset);
    if let Some(inventory) = inventory.as_mut() {
        inventory.update_from_report(&units);
    }

    let outcome = RunOutcome {
        units,
        graph,
        proposals,
        report,
        inventory,
    };
    progress.done(&outcome);
    info!(
        units = outcome.units.len(),
        blockers = outcome.report.blockers.len(),
        warnings = outcome.report.warnings.len(),
        "pipeline complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikimig_shared::{Criterion, PipelineConfig, Points};

    fn ruleset() -> Ruleset {
        Ruleset::compile(&PipelineConfig::default()).expect("ruleset")
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn converted_path_swaps_extension() {
        assert_eq!(
            converted_path(Path::new("/out"), "security/jwt.md"),
            PathBuf::from("/out/security/jwt.wiki")
        );
    }

    #[test]
    fn score_document_runs_all_unit_stages() {
        let text = "---\ntitle: Jwt\ndescription: Tokens.\nkeywords: [jwt, auth, tokens]\n---\nSee [[Security]] for more.\n```bash\nls\n```\n";
        let unit = score_document("docs/security/jwt.md", text, &ruleset());

        assert_eq!(unit.target_page_name, "Security/Jwt");
        assert_eq!(unit.related_links, vec!["Security"]);
        assert!(unit.categories.contains(&"Security".to_string()));
        assert!(unit.source_word_count.is_some_and(|n| n > 0));
        let output = unit.output_markup.as_deref().expect("output");
        assert!(output.starts_with("= Jwt =\n'''Tokens.'''\n\n"));
        assert!(output.contains("<syntaxhighlight lang=\"bash\">"));
        assert!(output.contains("[[Category:Security]]"));

        let score = unit.score.expect("score");
        assert_eq!(score.earned(Criterion::CodeExamples), Points::from_whole(15));
        assert_eq!(score.earned(Criterion::UrlStructure), Points::from_whole(10));
    }
}
