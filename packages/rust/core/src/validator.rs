//! Corpus-wide validation: blockers, warnings and the run summary.
//!
//! Validation only reads the units and the graph. A run may publish once its
//! blocker list is empty.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, instrument};

use wikimig_markdown::{escaped_brackets, table_markers};
use wikimig_shared::{DocumentUnit, Points, Role, Ruleset, UnitStatus, UnitWarning};

use crate::graph::LinkGraph;
use crate::scoring::legacy_hits;

/// What an [`Issue`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    // Blockers
    TargetCollision,
    DanglingLink,
    BelowWordFloor,
    // Warnings
    ScoreBelowThreshold,
    LinkBandViolation,
    LegacyVersionToken,
    MissingCategories,
    UnbalancedTable,
    EscapedBrackets,
    WordCountVariance,
    Orphan,
    UnitFailed,
    ProposedLinks,
    Local,
}

impl IssueKind {
    pub fn is_blocker(&self) -> bool {
        matches!(
            self,
            Self::TargetCollision | Self::DanglingLink | Self::BelowWordFloor
        )
    }
}

/// One blocker or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Source path or page name the issue is about.
    pub subject: String,
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// One line of the flat per-unit report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub source_path: String,
    pub target_page_name: String,
    pub status: UnitStatus,
    pub role: Role,
    pub word_count: usize,
    pub score: Option<Points>,
    pub categories: Vec<String>,
    pub notes: String,
}

/// Score statistics over scored units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreStats {
    pub min: Points,
    pub max: Points,
    /// Rounded down to a tenth.
    pub mean: Points,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub units: usize,
    pub by_status: BTreeMap<String, usize>,
    pub scores: Option<ScoreStats>,
    pub blockers: usize,
    pub warnings: usize,
}

/// Validator output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub blockers: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub rows: Vec<ReportRow>,
    pub summary: RunSummary,
}

impl ValidationReport {
    /// True when nothing stands in the way of publication.
    pub fn is_publishable(&self) -> bool {
        self.blockers.is_empty()
    }
}

fn row_for(unit: &DocumentUnit) -> ReportRow {
    let mut notes: Vec<String> = Vec::new();
    if let Some(reason) = &unit.failure {
        notes.push(reason.clone());
    }
    if let Some(score) = &unit.score {
        notes.extend(score.notes.iter().cloned());
    }
    ReportRow {
        source_path: unit.source_path.clone(),
        target_page_name: unit.target_page_name.clone(),
        status: unit.status,
        role: unit.role,
        word_count: unit.word_count,
        score: unit.score.as_ref().map(|s| s.total),
        categories: unit.categories.clone(),
        notes: notes.join("; "),
    }
}

fn score_stats(units: &[&DocumentUnit]) -> Option<ScoreStats> {
    let totals: Vec<Points> = units
        .iter()
        .filter_map(|u| u.score.as_ref().map(|s| s.total))
        .collect();
    let min = totals.iter().min().copied()?;
    let max = totals.iter().max().copied()?;
    let sum: u64 = totals.iter().map(|p| u64::from(p.tenths())).sum();
    let mean = Points((sum / totals.len() as u64) as u32);
    Some(ScoreStats { min, max, mean })
}

fn local_issue(unit: &DocumentUnit, warning: &UnitWarning) -> Issue {
    Issue::new(
        IssueKind::Local,
        &unit.source_path,
        format!("{:?}: {}", warning.kind, warning.message),
    )
}

/// Check the whole corpus.
///
/// `SkipEmptyDraft` units appear in the rows only. `Error` units appear in
/// the rows and as a `UnitFailed` warning, but are not otherwise checked.
#[instrument(skip_all, fields(units = units.len()))]
pub fn validate(units: &[DocumentUnit], graph: &LinkGraph, ruleset: &Ruleset) -> ValidationReport {
    let mut blockers = Vec::new();
    let mut warnings = Vec::new();

    let mut sorted: Vec<&DocumentUnit> = units.iter().collect();
    sorted.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    let active: Vec<&DocumentUnit> = sorted
        .iter()
        .copied()
        .filter(|u| u.status.is_active())
        .collect();

    // Collisions
    let mut by_target: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for unit in &active {
        by_target
            .entry(unit.target_page_name.as_str())
            .or_default()
            .push(unit.source_path.as_str());
    }
    for (target, sources) in &by_target {
        if sources.len() > 1 {
            blockers.push(Issue::new(
                IssueKind::TargetCollision,
                *target,
                format!("{target} is produced by {}", sources.join(", ")),
            ));
        }
    }

    for edge in &graph.dangling {
        blockers.push(Issue::new(
            IssueKind::DanglingLink,
            &edge.from,
            format!("{} links to missing page {}", edge.from, edge.to),
        ));
    }

    let floor = ruleset.validation.min_word_count;
    let threshold = ruleset.score_threshold();
    for unit in &active {
        let subject = unit.source_path.as_str();
        if unit.word_count <= floor {
            blockers.push(Issue::new(
                IssueKind::BelowWordFloor,
                subject,
                format!("{} words, floor is {floor}", unit.word_count),
            ));
        }

        if let Some(score) = &unit.score {
            if score.total < threshold {
                warnings.push(Issue::new(
                    IssueKind::ScoreBelowThreshold,
                    subject,
                    format!("score {} below {threshold}", score.total),
                ));
            }
        }

        let band = ruleset.links.band(unit.role);
        let links = unit.related_links.len();
        if !band.contains(links) {
            warnings.push(Issue::new(
                IssueKind::LinkBandViolation,
                subject,
                format!(
                    "{links} related links, {} pages need {}-{}",
                    unit.role, band.min, band.max
                ),
            ));
        }

        let markup = unit.current_markup();
        for hit in legacy_hits(markup, ruleset) {
            warnings.push(Issue::new(
                IssueKind::LegacyVersionToken,
                subject,
                format!("line {}: {} ({})", hit.line, hit.matched, hit.fix),
            ));
        }

        if unit.categories.is_empty() && !markup.contains("[[Category:") {
            warnings.push(Issue::new(
                IssueKind::MissingCategories,
                subject,
                "no categories assigned",
            ));
        }

        let (opens, closes) = table_markers(markup);
        if opens != closes {
            warnings.push(Issue::new(
                IssueKind::UnbalancedTable,
                subject,
                format!("{opens} table opening(s), {closes} closing(s)"),
            ));
        }

        let escaped = escaped_brackets(markup);
        if escaped > 0 {
            warnings.push(Issue::new(
                IssueKind::EscapedBrackets,
                subject,
                format!("{escaped} escaped bracket(s) left by the converter"),
            ));
        }

        if let Some(source_words) = unit.source_word_count.filter(|n| *n > 0) {
            let allowed = ruleset.validation.max_word_variance_percent;
            let diff = unit.word_count.abs_diff(source_words);
            if diff * 100 > source_words * allowed {
                warnings.push(Issue::new(
                    IssueKind::WordCountVariance,
                    subject,
                    format!(
                        "source has {source_words} words, page has {} ({}% apart, allowed {allowed}%)",
                        unit.word_count,
                        diff * 100 / source_words
                    ),
                ));
            }
        }

        if !unit.proposed_links.is_empty() {
            let targets: Vec<&str> = unit
                .proposed_links
                .iter()
                .map(|p| p.target.as_str())
                .collect();
            warnings.push(Issue::new(
                IssueKind::ProposedLinks,
                subject,
                format!("suggested links: {}", targets.join(", ")),
            ));
        }

        warnings.extend(unit.warnings.iter().map(|w| local_issue(unit, w)));
    }

    for orphan in &graph.orphans {
        warnings.push(Issue::new(
            IssueKind::Orphan,
            orphan,
            format!("{orphan} has no inbound or outbound links"),
        ));
    }

    for unit in sorted.iter().filter(|u| u.status == UnitStatus::Error) {
        warnings.push(Issue::new(
            IssueKind::UnitFailed,
            &unit.source_path,
            unit.failure.clone().unwrap_or_else(|| "unit failed".into()),
        ));
        warnings.extend(unit.warnings.iter().map(|w| local_issue(unit, w)));
    }

    let mut by_status: BTreeMap<String, usize> = UnitStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for unit in &sorted {
        *by_status.entry(unit.status.as_str().to_string()).or_default() += 1;
    }

    let summary = RunSummary {
        units: units.len(),
        by_status,
        scores: score_stats(&active),
        blockers: blockers.len(),
        warnings: warnings.len(),
    };
    info!(
        blockers = summary.blockers,
        warnings = summary.warnings,
        "validation complete"
    );

    ValidationReport {
        blockers,
        warnings,
        rows: sorted.into_iter().map(row_for).collect(),
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeKind};
    use wikimig_shared::{LinkProposal, PipelineConfig, ScoreReport, WarningKind};

    fn ruleset() -> Ruleset {
        Ruleset::compile(&PipelineConfig::default()).expect("ruleset")
    }

    fn unit(source: &str, target: &str, words: usize) -> DocumentUnit {
        let mut unit = DocumentUnit::new(source, target, "");
        unit.status = UnitStatus::Converted;
        unit.word_count = words;
        unit.related_links = vec!["X".into(), "Y".into(), "Z".into()];
        unit.categories = vec!["Security".into()];
        unit
    }

    fn kinds(issues: &[Issue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn collision_is_one_blocker_naming_both_paths() {
        let units = vec![
            unit("a/setup.md", "Setup", 600),
            unit("b/setup.md", "Setup", 600),
        ];
        let report = validate(&units, &LinkGraph::default(), &ruleset());

        assert_eq!(report.blockers.len(), 1);
        let blocker = &report.blockers[0];
        assert_eq!(blocker.kind, IssueKind::TargetCollision);
        assert!(blocker.message.contains("a/setup.md"));
        assert!(blocker.message.contains("b/setup.md"));
        assert!(!report.is_publishable());
    }

    #[test]
    fn dangling_edges_block() {
        let graph = LinkGraph {
            dangling: vec![Edge {
                from: "A".into(),
                to: "Gone".into(),
                kind: EdgeKind::Related,
            }],
            ..Default::default()
        };
        let report = validate(&[unit("a.md", "A", 600)], &graph, &ruleset());
        assert_eq!(kinds(&report.blockers), vec![IssueKind::DanglingLink]);
    }

    #[test]
    fn word_floor_is_inclusive() {
        let ruleset = ruleset();
        let report = validate(&[unit("empty.md", "Empty", 0)], &LinkGraph::default(), &ruleset);
        assert_eq!(kinds(&report.blockers), vec![IssueKind::BelowWordFloor]);

        let report = validate(&[unit("short.md", "Short", 2)], &LinkGraph::default(), &ruleset);
        assert!(report.blockers.is_empty());
    }

    #[test]
    fn warnings_cover_score_band_tokens_and_locals() {
        let mut page = unit("p.md", "P", 600);
        page.related_links.truncate(1);
        page.score = Some(ScoreReport::new(BTreeMap::new(), vec![]));
        page.output_markup = Some("Needs PHP 7.4.\n".into());
        page.warnings.push(UnitWarning::new(WarningKind::UnresolvedLink, "x.md"));
        page.proposed_links.push(LinkProposal {
            source_path: "p.md".into(),
            target: "Q".into(),
            keyword_overlap: 0,
            depth_distance: 0,
            same_directory: true,
        });

        let graph = LinkGraph {
            orphans: vec!["P".into()],
            ..Default::default()
        };
        let report = validate(&[page], &graph, &ruleset());
        assert!(report.is_publishable());
        assert_eq!(
            kinds(&report.warnings),
            vec![
                IssueKind::ScoreBelowThreshold,
                IssueKind::LinkBandViolation,
                IssueKind::LegacyVersionToken,
                IssueKind::ProposedLinks,
                IssueKind::Local,
                IssueKind::Orphan,
            ]
        );
    }

    fn warning_kinds(unit: DocumentUnit) -> Vec<IssueKind> {
        let report = validate(&[unit], &LinkGraph::default(), &ruleset());
        assert!(report.is_publishable());
        kinds(&report.warnings)
    }

    #[test]
    fn page_without_categories_is_flagged() {
        let mut page = unit("p.md", "P", 600);
        page.categories.clear();
        page.output_markup = Some("Body.\n".into());
        assert_eq!(warning_kinds(page.clone()), vec![IssueKind::MissingCategories]);

        page.output_markup = Some("Body.\n[[Category:Manual]]\n".into());
        assert!(warning_kinds(page).is_empty());
    }

    #[test]
    fn unbalanced_table_is_flagged() {
        let mut page = unit("p.md", "P", 600);
        page.output_markup = Some("{| class=\"wikitable\"\n| a\n{|\n| b\n|}\n".into());
        assert_eq!(warning_kinds(page.clone()), vec![IssueKind::UnbalancedTable]);

        page.output_markup = Some("{|\n| a\n|}\n".into());
        assert!(warning_kinds(page).is_empty());
    }

    #[test]
    fn escaped_bracket_residue_is_flagged() {
        let mut page = unit("p.md", "P", 600);
        page.output_markup = Some("See \\[1\\].\n".into());
        let report = validate(&[page], &LinkGraph::default(), &ruleset());
        assert_eq!(kinds(&report.warnings), vec![IssueKind::EscapedBrackets]);
        assert!(report.warnings[0].message.starts_with("2 escaped"));
    }

    #[test]
    fn word_count_variance_beyond_limit_is_flagged() {
        let mut page = unit("p.md", "P", 600);
        page.source_word_count = Some(500);
        assert!(warning_kinds(page.clone()).is_empty());

        page.word_count = 601;
        assert_eq!(warning_kinds(page.clone()), vec![IssueKind::WordCountVariance]);

        page.word_count = 399;
        assert_eq!(warning_kinds(page.clone()), vec![IssueKind::WordCountVariance]);

        page.source_word_count = Some(0);
        assert!(warning_kinds(page).is_empty());
    }

    #[test]
    fn skipped_and_failed_units_are_not_checked() {
        let mut draft = unit("draft.md", "Dup", 0);
        draft.status = UnitStatus::SkipEmptyDraft;
        let mut broken = unit("broken.md", "Dup", 0);
        broken.fail("converter output missing");
        let ok = unit("ok.md", "Dup", 600);

        let report = validate(&[draft, broken, ok], &LinkGraph::default(), &ruleset());
        assert!(report.blockers.is_empty());
        assert_eq!(kinds(&report.warnings), vec![IssueKind::UnitFailed]);
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0].source_path, "broken.md");
        assert_eq!(report.rows[0].notes, "converter output missing");
        assert_eq!(report.summary.by_status["Skip-EmptyDraft"], 1);
        assert_eq!(report.summary.by_status["Error"], 1);
        assert_eq!(report.summary.by_status["Converted"], 1);
    }

    #[test]
    fn summary_score_statistics() {
        let mut a = unit("a.md", "A", 600);
        let mut b = unit("b.md", "B", 600);
        a.score = Some(ScoreReport {
            criteria: BTreeMap::new(),
            total: Points(800),
            notes: vec![],
        });
        b.score = Some(ScoreReport {
            criteria: BTreeMap::new(),
            total: Points(855),
            notes: vec![],
        });
        let report = validate(&[a, b], &LinkGraph::default(), &ruleset());
        let stats = report.summary.scores.expect("stats");
        assert_eq!(stats.min, Points(800));
        assert_eq!(stats.max, Points(855));
        assert_eq!(stats.mean, Points(827));
    }
}
