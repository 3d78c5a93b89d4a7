//! Content quality rubric.
//!
//! Scores are computed in fixed-point tenths from the unit and the ruleset
//! alone, so the same page always gets the same report.

use std::collections::BTreeMap;

use serde::Serialize;

use wikimig_inventory::matching_convention;
use wikimig_markdown::code_block_summary;
use wikimig_shared::{
    CrossLinkCurve, Criterion, CriterionScore, DocumentUnit, Points, Ruleset, ScoreReport,
};

/// Keywords needed for full keyword credit.
const KEYWORD_TARGET: u64 = 3;

/// One legacy-version token found in a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyHit {
    /// 1-based line number.
    pub line: usize,
    pub matched: String,
    pub fix: String,
}

/// Legacy-version tokens in `text`, skipping lines that discuss upgrades.
pub fn legacy_hits(text: &str, ruleset: &Ruleset) -> Vec<LegacyHit> {
    let mut hits = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if ruleset.upgrade_context.iter().any(|re| re.is_match(line)) {
            continue;
        }
        for token in &ruleset.legacy_tokens {
            for found in token.regex.find_iter(line) {
                hits.push(LegacyHit {
                    line: i + 1,
                    matched: found.as_str().to_string(),
                    fix: token.fix.clone(),
                });
            }
        }
    }
    hits
}

struct Rubric<'a> {
    ruleset: &'a Ruleset,
    criteria: BTreeMap<Criterion, CriterionScore>,
    notes: Vec<String>,
}

impl<'a> Rubric<'a> {
    fn new(ruleset: &'a Ruleset) -> Self {
        Self {
            ruleset,
            criteria: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    fn award(&mut self, criterion: Criterion, earned: Points, note: impl FnOnce() -> String) {
        let possible = self.ruleset.possible(criterion);
        let earned = earned.min(possible);
        if earned < possible {
            self.notes.push(format!(
                "{criterion} {earned}/{possible}: {}",
                note()
            ));
        }
        self.criteria
            .insert(criterion, CriterionScore { earned, possible });
    }

    fn finish(self) -> ScoreReport {
        ScoreReport::new(self.criteria, self.notes)
    }
}

fn word_count_points(unit: &DocumentUnit, ruleset: &Ruleset) -> Points {
    let target = ruleset.scoring.word_target as u64;
    ruleset
        .possible(Criterion::WordCount)
        .scaled(unit.word_count as u64, target)
}

fn cross_link_points(unit: &DocumentUnit, ruleset: &Ruleset) -> Points {
    let possible = ruleset.possible(Criterion::CrossLinks);
    let min = ruleset.links.band(unit.role).min as u64;
    let n = unit.related_links.len() as u64;
    if n >= min {
        return possible;
    }
    match ruleset.scoring.crosslink_curve {
        CrossLinkCurve::Linear => possible.scaled(n, min),
        CrossLinkCurve::Quadratic => possible.scaled(n * n, min * min),
        CrossLinkCurve::None => Points::ZERO,
    }
}

fn url_structure_points(unit: &DocumentUnit, ruleset: &Ruleset) -> (Points, &'static str) {
    let possible = ruleset.possible(Criterion::UrlStructure);
    let target = unit.target_page_name.as_str();
    match matching_convention(&unit.source_path, &ruleset.url_conventions) {
        Some(convention) => {
            let prefix = convention.prefix.as_str();
            let follows = target == prefix
                || target
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'));
            if follows {
                (possible, "")
            } else {
                (possible.scaled(1, 2), "page name does not use the section prefix")
            }
        }
        None if target.contains('/') => (
            possible.scaled(7, 10),
            "hierarchical name outside the known sections",
        ),
        None => (Points::ZERO, "flat page name outside the known sections"),
    }
}

fn metadata_points(unit: &DocumentUnit, ruleset: &Ruleset) -> (Points, Vec<&'static str>) {
    let possible = ruleset.possible(Criterion::Metadata);
    let part = possible.scaled(1, 3);
    let last = possible.saturating_sub(part + part);
    let mut missing = Vec::new();

    let has_description = unit
        .frontmatter
        .description
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty());
    let description = if has_description {
        part
    } else {
        missing.push("no description");
        Points::ZERO
    };

    let keyword_count = unit.frontmatter.keywords.len() as u64;
    if keyword_count < KEYWORD_TARGET {
        missing.push("fewer than 3 keywords");
    }
    let keywords = part.scaled(keyword_count, KEYWORD_TARGET);

    let categories = if unit.categories.is_empty() {
        missing.push("no categories");
        Points::ZERO
    } else {
        last
    };

    (description + keywords + categories, missing)
}

/// Score one unit against the rubric.
///
/// Scores the most processed markup on the unit, normally the output markup
/// with its See also section and category tags.
pub fn score_unit(unit: &DocumentUnit, ruleset: &Ruleset) -> ScoreReport {
    let markup = unit.current_markup();
    let mut rubric = Rubric::new(ruleset);

    rubric.award(Criterion::WordCount, word_count_points(unit, ruleset), || {
        format!(
            "{} words, target {}",
            unit.word_count, ruleset.scoring.word_target
        )
    });

    let band = ruleset.links.band(unit.role);
    rubric.award(Criterion::CrossLinks, cross_link_points(unit, ruleset), || {
        format!(
            "{} related links, {} needs {}-{}",
            unit.related_links.len(),
            unit.role,
            band.min,
            band.max
        )
    });

    let (url_points, url_note) = url_structure_points(unit, ruleset);
    rubric.award(Criterion::UrlStructure, url_points, || url_note.to_string());

    let code = code_block_summary(markup);
    let code_points = if code.all_well_formed() {
        ruleset.possible(Criterion::CodeExamples)
    } else {
        Points::ZERO
    };
    rubric.award(Criterion::CodeExamples, code_points, || {
        if code.blocks == 0 {
            "no code examples".to_string()
        } else {
            format!("{} malformed code block(s)", code.malformed)
        }
    });

    rubric.award(Criterion::StructuredData, Points::ZERO, || {
        "structured data is added by the wiki after upload".to_string()
    });

    let hits = legacy_hits(markup, ruleset);
    let penalty = Points::from_whole(
        ruleset
            .scoring
            .token_penalty
            .saturating_mul(u32::try_from(hits.len()).unwrap_or(u32::MAX))
            .min(u32::MAX / 10),
    );
    rubric.award(
        Criterion::VersionCurrency,
        ruleset
            .possible(Criterion::VersionCurrency)
            .saturating_sub(penalty),
        || {
            let found: Vec<&str> = hits.iter().map(|h| h.matched.as_str()).collect();
            format!("legacy version tokens: {}", found.join(", "))
        },
    );

    let (metadata, missing) = metadata_points(unit, ruleset);
    rubric.award(Criterion::Metadata, metadata, || missing.join(", "));

    rubric.finish()
}
