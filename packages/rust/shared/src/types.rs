//! Core domain types for a migration run.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

/// Fixed-point score value in tenths of a point.
///
/// All scoring arithmetic is integer so a report is bit-identical across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Points(pub u32);

impl Points {
    pub const ZERO: Points = Points(0);

    /// Build a value from whole points.
    pub const fn from_whole(points: u32) -> Self {
        Self(points * 10)
    }

    /// Raw value in tenths.
    pub const fn tenths(self) -> u32 {
        self.0
    }

    /// `self * numerator / denominator`, rounded down, never above `self`.
    pub fn scaled(self, numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            return Self::ZERO;
        }
        let value = u64::from(self.0) * numerator.min(denominator) / denominator;
        Self(value as u32)
    }

    pub fn saturating_sub(self, other: Points) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl std::ops::Add for Points {
    type Output = Points;

    fn add(self, rhs: Points) -> Points {
        Points(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Points {
    fn sum<I: Iterator<Item = Points>>(iter: I) -> Points {
        iter.fold(Points::ZERO, |acc, p| acc + p)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// The fixed rubric criteria, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Criterion {
    WordCount,
    CrossLinks,
    UrlStructure,
    CodeExamples,
    StructuredData,
    VersionCurrency,
    /// Reserved composite: description, keywords, categories.
    Metadata,
}

impl Criterion {
    pub const ALL: [Criterion; 7] = [
        Criterion::WordCount,
        Criterion::CrossLinks,
        Criterion::UrlStructure,
        Criterion::CodeExamples,
        Criterion::StructuredData,
        Criterion::VersionCurrency,
        Criterion::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WordCount => "WordCount",
            Self::CrossLinks => "CrossLinks",
            Self::UrlStructure => "URLStructure",
            Self::CodeExamples => "CodeExamples",
            Self::StructuredData => "StructuredData",
            Self::VersionCurrency => "VersionCurrency",
            Self::Metadata => "Metadata",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Points earned against points possible for one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CriterionScore {
    pub earned: Points,
    pub possible: Points,
}

/// Per-unit rubric result. Always derived, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    pub criteria: BTreeMap<Criterion, CriterionScore>,
    pub total: Points,
    /// One entry per criterion that lost points.
    pub notes: Vec<String>,
}

impl ScoreReport {
    /// Build a report, deriving `total` from the criteria.
    pub fn new(criteria: BTreeMap<Criterion, CriterionScore>, notes: Vec<String>) -> Self {
        let total = criteria.values().map(|c| c.earned).sum();
        Self {
            criteria,
            total,
            notes,
        }
    }

    /// Earned points for a criterion (zero when absent).
    pub fn earned(&self, criterion: Criterion) -> Points {
        self.criteria
            .get(&criterion)
            .map(|c| c.earned)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Unit metadata
// ---------------------------------------------------------------------------

/// Structural role of a unit in the link graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Hub,
    #[default]
    Leaf,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hub => "Hub",
            Self::Leaf => "Leaf",
        })
    }
}

/// Migration status, spelled the way the inventory CSV spells it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "Converted")]
    Converted,
    #[serde(rename = "Needs Expansion")]
    NeedsExpansion,
    #[serde(rename = "Skip-EmptyDraft")]
    SkipEmptyDraft,
    #[serde(rename = "Error")]
    Error,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 5] = [
        UnitStatus::NotStarted,
        UnitStatus::Converted,
        UnitStatus::NeedsExpansion,
        UnitStatus::SkipEmptyDraft,
        UnitStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::Converted => "Converted",
            Self::NeedsExpansion => "Needs Expansion",
            Self::SkipEmptyDraft => "Skip-EmptyDraft",
            Self::Error => "Error",
        }
    }

    /// Parse an inventory status cell. Unknown values read as `NotStarted`.
    pub fn from_inventory(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
            .unwrap_or_default()
    }

    /// Whether the unit takes part in graph building and scoring.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::SkipEmptyDraft | Self::Error)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a recoverable, unit-local issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MalformedFrontmatter,
    UnmappedAdmonition,
    UnresolvedLink,
    StrippedCodeHint,
    UnterminatedCodeFence,
    CategoryOverflow,
    RelatedLinksTruncated,
}

/// A recoverable issue attached to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl UnitWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Metadata extracted from a document header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lowercase, deduplicated, in first-seen order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidebar_position: Option<i64>,
    /// Declared related pages (source paths or page names).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Any other header keys, kept verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Frontmatter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An advisory link suggestion for an under-linked leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkProposal {
    /// Unit that would receive the link.
    pub source_path: String,
    /// Proposed target page name.
    pub target: String,
    pub keyword_overlap: usize,
    pub depth_distance: usize,
    pub same_directory: bool,
}

// ---------------------------------------------------------------------------
// DocumentUnit
// ---------------------------------------------------------------------------

/// One source page as it flows through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentUnit {
    /// Stable identifier, unique per unit.
    pub source_path: String,
    /// Destination wiki title.
    pub target_page_name: String,
    /// Converter output, untouched.
    #[serde(skip)]
    pub raw_markup: String,
    /// Normalizer output; written once.
    #[serde(skip)]
    pub normalized_markup: Option<String>,
    /// Normalized markup plus See also section and category tags.
    #[serde(skip)]
    pub output_markup: Option<String>,
    pub frontmatter: Frontmatter,
    /// Match order is kept; compare as a set.
    pub categories: Vec<String>,
    pub related_links: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub proposed_links: Vec<LinkProposal>,
    pub role: Role,
    pub word_count: usize,
    /// Word count of the source body, before conversion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreReport>,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<UnitWarning>,
    /// Reason for `status = Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl DocumentUnit {
    pub fn new(
        source_path: impl Into<String>,
        target_page_name: impl Into<String>,
        raw_markup: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            target_page_name: target_page_name.into(),
            raw_markup: raw_markup.into(),
            normalized_markup: None,
            output_markup: None,
            frontmatter: Frontmatter::default(),
            categories: Vec::new(),
            related_links: Vec::new(),
            proposed_links: Vec::new(),
            role: Role::Leaf,
            word_count: 0,
            source_word_count: None,
            score: None,
            status: UnitStatus::NotStarted,
            warnings: Vec::new(),
            failure: None,
            priority: None,
        }
    }

    /// Mark the unit as failed for this run.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = UnitStatus::Error;
        self.failure = Some(reason.into());
        self.score = None;
    }

    /// The most processed markup available.
    pub fn current_markup(&self) -> &str {
        self.output_markup
            .as_deref()
            .or(self.normalized_markup.as_deref())
            .unwrap_or(&self.raw_markup)
    }
}
