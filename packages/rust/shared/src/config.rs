//! Pipeline configuration for wikimig.
//!
//! The config file is `wikimig.toml`. Lookup order: an explicit `--config`
//! path, then `./wikimig.toml`, then `~/.wikimig/wikimig.toml`, then built-in
//! defaults. Every table is defaulted, so an empty file is a valid config.
//!
//! [`PipelineConfig`] is the serde view of the file. [`Ruleset`] is the
//! compiled, immutable form handed to every stage.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::types::{Criterion, Points, Role};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "wikimig.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".wikimig";

/// Fallback highlight language; always accepted.
pub const PLAIN_TEXT_LANGUAGE: &str = "text";

// ---------------------------------------------------------------------------
// Config structs (matching wikimig.toml schema)
// ---------------------------------------------------------------------------

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: RunSettings,

    /// Call-out type → wiki template name.
    #[serde(default = "default_admonitions")]
    pub admonitions: BTreeMap<String, String>,

    /// Code-fence language alias → canonical syntaxhighlight language.
    #[serde(default = "default_code_languages")]
    pub code_languages: BTreeMap<String, String>,

    #[serde(default)]
    pub categories: CategoryConfig,

    /// Deprecated version strings to flag in body text.
    #[serde(default = "default_legacy_tokens")]
    pub legacy_tokens: Vec<LegacyTokenRule>,

    /// Lines matching any of these are discussing upgrades and are not flagged.
    #[serde(default = "default_upgrade_context")]
    pub upgrade_context: Vec<String>,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub links: LinkConfig,

    /// Source tree segment → wiki page prefix.
    #[serde(default = "default_url_conventions")]
    pub url_conventions: Vec<UrlConvention>,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub render: RenderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline: RunSettings::default(),
            admonitions: default_admonitions(),
            code_languages: default_code_languages(),
            categories: CategoryConfig::default(),
            legacy_tokens: default_legacy_tokens(),
            upgrade_context: default_upgrade_context(),
            scoring: ScoringConfig::default(),
            links: LinkConfig::default(),
            url_conventions: default_url_conventions(),
            validation: ValidationConfig::default(),
            inventory: InventoryConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSettings {
    /// Worker pool size; 0 means one per available core.
    #[serde(default)]
    pub workers: usize,

    /// Commit proposed links instead of only annotating units.
    #[serde(default)]
    pub accept_proposals: bool,

    /// Leading path prefixes removed before link resolution.
    #[serde(default)]
    pub strip_prefixes: Vec<String>,
}

/// `[categories]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,

    /// Evaluated first, in order.
    #[serde(default = "default_path_rules")]
    pub path_rules: Vec<PathRule>,

    /// Evaluated after path rules, in order.
    #[serde(default = "default_keyword_rules")]
    pub keyword_rules: Vec<KeywordRule>,

    /// Prefix for the category derived from frontmatter `difficulty`.
    #[serde(default = "default_difficulty_prefix")]
    pub difficulty_prefix: String,

    /// Keywords turned into categories when no rule matches.
    #[serde(default = "default_fallback_keywords")]
    pub fallback_keywords: usize,

    /// Title words turned into categories when no rule matches and there
    /// are no keywords.
    #[serde(default = "default_fallback_title_words")]
    pub fallback_title_words: usize,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            max_categories: default_max_categories(),
            path_rules: default_path_rules(),
            keyword_rules: default_keyword_rules(),
            difficulty_prefix: default_difficulty_prefix(),
            fallback_keywords: default_fallback_keywords(),
            fallback_title_words: default_fallback_title_words(),
        }
    }
}

/// `[[categories.path_rules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRule {
    /// Substring matched against the lowercased source path.
    pub pattern: String,
    /// Further substrings the path must also contain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    pub category: String,
}

impl PathRule {
    /// Whether a lowercased path satisfies the rule.
    pub fn matches(&self, path: &str) -> bool {
        !self.pattern.is_empty()
            && path.contains(&self.pattern)
            && self.requires.iter().all(|r| path.contains(r.as_str()))
    }
}

/// `[[categories.keyword_rules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub category: String,
}

/// `[[legacy_tokens]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyTokenRule {
    /// Regex; use `(?i)` for case-insensitive matches.
    pub pattern: String,
    /// Suggested replacement shown in notes.
    pub fix: String,
}

/// Partial-credit curve for under-linked units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossLinkCurve {
    /// `possible × n / min`
    #[default]
    Linear,
    /// `possible × (n / min)²`
    Quadratic,
    /// Nothing below the band minimum.
    None,
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: RubricWeights,

    /// Word count that earns full WordCount credit.
    #[serde(default = "default_word_target")]
    pub word_target: usize,

    /// Whole points deducted per legacy-version hit.
    #[serde(default = "default_token_penalty")]
    pub token_penalty: u32,

    #[serde(default)]
    pub crosslink_curve: CrossLinkCurve,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: RubricWeights::default(),
            word_target: default_word_target(),
            token_penalty: default_token_penalty(),
            crosslink_curve: CrossLinkCurve::default(),
        }
    }
}

/// `[scoring.weights]`: whole points per criterion, must sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricWeights {
    pub word_count: u32,
    pub cross_links: u32,
    pub url_structure: u32,
    pub code_examples: u32,
    pub structured_data: u32,
    pub version_currency: u32,
    pub metadata: u32,
}

impl Default for RubricWeights {
    fn default() -> Self {
        Self {
            word_count: 20,
            cross_links: 15,
            url_structure: 10,
            code_examples: 15,
            structured_data: 10,
            version_currency: 15,
            metadata: 15,
        }
    }
}

impl RubricWeights {
    pub fn get(&self, criterion: Criterion) -> u32 {
        match criterion {
            Criterion::WordCount => self.word_count,
            Criterion::CrossLinks => self.cross_links,
            Criterion::UrlStructure => self.url_structure,
            Criterion::CodeExamples => self.code_examples,
            Criterion::StructuredData => self.structured_data,
            Criterion::VersionCurrency => self.version_currency,
            Criterion::Metadata => self.metadata,
        }
    }

    pub fn total(&self) -> u32 {
        Criterion::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// Inclusive link-count band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub min: usize,
    pub max: usize,
}

impl Band {
    pub fn contains(&self, n: usize) -> bool {
        (self.min..=self.max).contains(&n)
    }
}

/// `[links]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_leaf_band")]
    pub leaf: Band,

    #[serde(default = "default_hub_band")]
    pub hub: Band,

    /// A unit referenced by more than this many others is a hub.
    #[serde(default = "default_hub_inbound_threshold")]
    pub hub_inbound_threshold: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            leaf: default_leaf_band(),
            hub: default_hub_band(),
            hub_inbound_threshold: default_hub_inbound_threshold(),
        }
    }
}

impl LinkConfig {
    pub fn band(&self, role: Role) -> Band {
        match role {
            Role::Hub => self.hub,
            Role::Leaf => self.leaf,
        }
    }
}

/// `[[url_conventions]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlConvention {
    /// Source path segment, matched case-insensitively.
    pub segment: String,
    /// Wiki page prefix, without the trailing `/`.
    pub prefix: String,
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Units with `word_count <= min_word_count` block the run.
    #[serde(default)]
    pub min_word_count: usize,

    /// Scores below this (whole points) produce a warning.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: u32,

    /// Units below this word count get status `Needs Expansion`.
    #[serde(default = "default_word_target")]
    pub expansion_threshold: usize,

    /// Allowed difference between source and page word counts, in percent
    /// of the source count.
    #[serde(default = "default_max_word_variance_percent")]
    pub max_word_variance_percent: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_word_count: 0,
            score_threshold: default_score_threshold(),
            expansion_threshold: default_word_target(),
            max_word_variance_percent: default_max_word_variance_percent(),
        }
    }
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Open each page with `= Title =` from the frontmatter title.
    #[serde(default = "default_true")]
    pub title_heading: bool,

    /// Follow the heading with the frontmatter description in bold.
    #[serde(default = "default_true")]
    pub description_lead: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title_heading: true,
            description_lead: true,
        }
    }
}

/// `[inventory]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// First match wins.
    #[serde(default = "default_priority_rules")]
    pub priority_rules: Vec<PriorityRule>,

    #[serde(default = "default_priority")]
    pub default_priority: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            priority_rules: default_priority_rules(),
            default_priority: default_priority(),
        }
    }
}

/// `[[inventory.priority_rules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityRule {
    pub pattern: String,
    pub priority: String,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_admonitions() -> BTreeMap<String, String> {
    pairs(&[
        ("note", "Note"),
        ("info", "Note"),
        ("warning", "Warning"),
        ("caution", "Warning"),
        ("danger", "Warning"),
        ("tip", "Tip"),
        ("success", "Tip"),
    ])
}

fn default_code_languages() -> BTreeMap<String, String> {
    pairs(&[
        ("bash", "bash"),
        ("sh", "bash"),
        ("shell", "bash"),
        ("zsh", "bash"),
        ("env", "bash"),
        ("console", "bash"),
        ("javascript", "javascript"),
        ("js", "javascript"),
        ("typescript", "typescript"),
        ("ts", "typescript"),
        ("python", "python"),
        ("py", "python"),
        ("php", "php"),
        ("json", "json"),
        ("yaml", "yaml"),
        ("yml", "yaml"),
        ("sql", "sql"),
        ("nginx", "nginx"),
        ("apache", "apache"),
        ("xml", "xml"),
        ("html", "html"),
        ("css", "css"),
        ("ini", "ini"),
        ("conf", "ini"),
        ("dockerfile", "docker"),
        ("docker", "docker"),
        ("plaintext", "text"),
        ("text", "text"),
        ("txt", "text"),
    ])
}

fn default_max_categories() -> usize {
    5
}

fn default_path_rules() -> Vec<PathRule> {
    [
        ("security/", "Security"),
        ("securing", "Security"),
        ("installation", "Installation"),
        ("installing", "Installation"),
        ("getting-started/", "Getting_Started"),
        ("api", "API"),
        ("database", "Database"),
        ("scripting", "Scripting"),
        ("upgrade", "Upgrades"),
        ("migration", "Upgrades"),
        ("salesforce", "Salesforce"),
        ("file", "File_Storage"),
        ("guide/", "Legacy_Guide"),
        ("dreamfactory-book", "Legacy_Guide"),
    ]
    .into_iter()
    .map(|(pattern, category)| PathRule {
        pattern: pattern.into(),
        requires: match pattern {
            "file" => vec!["storage".into()],
            _ => Vec::new(),
        },
        category: category.into(),
    })
    .collect()
}

fn default_difficulty_prefix() -> String {
    "Difficulty_".into()
}

fn default_fallback_keywords() -> usize {
    3
}

fn default_fallback_title_words() -> usize {
    2
}

fn default_max_word_variance_percent() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_keyword_rules() -> Vec<KeywordRule> {
    [
        ("jwt", "Authentication"),
        ("oauth", "Authentication"),
        ("ldap", "Authentication"),
        ("saml", "Authentication"),
        ("docker", "Installation"),
        ("kubernetes", "Installation"),
        ("mysql", "Database"),
        ("postgresql", "Database"),
        ("sql server", "Database"),
        ("rest api", "API"),
        ("scripting", "Scripting"),
        ("file storage", "File_Storage"),
    ]
    .into_iter()
    .map(|(keyword, category)| KeywordRule {
        keyword: keyword.into(),
        category: category.into(),
    })
    .collect()
}

fn default_legacy_tokens() -> Vec<LegacyTokenRule> {
    [
        (r"(?i)\bUbuntu\s+1[2-9]\.\d+", "Update to Ubuntu 24.04 LTS"),
        (r"(?i)\bUbuntu\s+2[0-2]\.\d+", "Update to Ubuntu 24.04 LTS"),
        (
            r"(?i)\bCentOS\s+[5-7]\b",
            "CentOS 5-7 are EOL; use AlmaLinux 9 or Ubuntu 24.04",
        ),
        (
            r"(?i)\bDebian\s+(jessie|stretch|buster)\b",
            "Update to Debian 12 (bookworm)",
        ),
        (r"(?i)\bmacOS\s+10\.\d+", "Update to macOS 14+ (Sonoma)"),
        (r"\bOS\s+X\b", "Replace \"OS X\" with \"macOS 14+\""),
        (r"(?i)\bPHP\s+[5-7]\.\d+", "Update to PHP 8.1+"),
        (r"(?i)\bPHP\s+8\.0\b", "Update to PHP 8.1+ (8.0 is EOL)"),
        (r"(?i)\bMySQL\s+5\.\d+", "Update to MySQL 8.0+"),
        (
            r"(?i)\bWindows\s+Server\s+20(08|12|16)\b",
            "Update to Windows Server 2022",
        ),
        (r"(?i)\bApache\s+2\.[0-2]\b", "Update to Apache 2.4+"),
        (r"(?i)\bnginx\s+1\.1?\d\b", "Update to nginx 1.24+"),
        (r"\bapi/v1\b", "Update to api/v2 endpoint"),
    ]
    .into_iter()
    .map(|(pattern, fix)| LegacyTokenRule {
        pattern: pattern.into(),
        fix: fix.into(),
    })
    .collect()
}

fn default_upgrade_context() -> Vec<String> {
    [
        r"(?i)upgrad(e|ing)\s+from",
        r"(?i)migrat(e|ing)\s+from",
        r"(?i)\blegacy\b",
        r"(?i)\bdeprecated\b",
        r"(?i)\bpreviously\b",
        r"(?i)\bold(er)?\s+version",
        r"(?i)\bno\s+longer\s+supported\b",
        r"(?i)\bend[\s-]of[\s-]life\b",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_word_target() -> usize {
    500
}
fn default_token_penalty() -> u32 {
    4
}
fn default_leaf_band() -> Band {
    Band { min: 3, max: 5 }
}
fn default_hub_band() -> Band {
    Band { min: 25, max: 35 }
}
fn default_hub_inbound_threshold() -> usize {
    8
}
fn default_score_threshold() -> u32 {
    70
}

fn default_url_conventions() -> Vec<UrlConvention> {
    [
        ("getting-started", "Getting_Started"),
        ("security", "Security"),
        ("api-generation", "API_Generation"),
        ("system-settings", "System_Settings"),
        ("admin-settings", "Admin_Settings"),
        ("ai", "AI_Services"),
        ("appendices", "Reference"),
    ]
    .into_iter()
    .map(|(segment, prefix)| UrlConvention {
        segment: segment.into(),
        prefix: prefix.into(),
    })
    .collect()
}

fn default_priority_rules() -> Vec<PriorityRule> {
    [
        ("introduction", "P0-Critical"),
        ("docker", "P0-Critical"),
        ("getting-started", "P1-High"),
        ("security", "P1-High"),
        ("api-generation", "P2-Medium"),
        ("system-settings", "P2-Medium"),
    ]
    .into_iter()
    .map(|(pattern, priority)| PriorityRule {
        pattern: pattern.into(),
        priority: priority.into(),
    })
    .collect()
}

fn default_priority() -> String {
    "P3-Low".into()
}

// ---------------------------------------------------------------------------
// Compiled ruleset
// ---------------------------------------------------------------------------

/// A compiled legacy-version rule.
#[derive(Debug, Clone)]
pub struct LegacyToken {
    pub regex: Regex,
    pub fix: String,
}

/// Immutable, validated configuration tables shared read-only by all stages.
#[derive(Debug, Clone)]
pub struct Ruleset {
    pub admonitions: BTreeMap<String, String>,
    pub code_languages: BTreeMap<String, String>,
    /// Canonical language names accepted by the destination.
    pub accepted_languages: BTreeSet<String>,
    pub path_rules: Vec<PathRule>,
    pub keyword_rules: Vec<KeywordRule>,
    pub max_categories: usize,
    pub difficulty_prefix: String,
    pub fallback_keywords: usize,
    pub fallback_title_words: usize,
    pub legacy_tokens: Vec<LegacyToken>,
    pub upgrade_context: Vec<Regex>,
    pub scoring: ScoringConfig,
    pub links: LinkConfig,
    pub url_conventions: Vec<UrlConvention>,
    pub validation: ValidationConfig,
    pub inventory: InventoryConfig,
    pub render: RenderConfig,
    pub run: RunSettings,
}

impl Ruleset {
    /// Validate and compile a config. Any failure is fatal for the run.
    pub fn compile(config: &PipelineConfig) -> Result<Self> {
        let weight_total = config.scoring.weights.total();
        if weight_total != 100 {
            return Err(MigrationError::config(format!(
                "scoring weights must sum to 100, got {weight_total}"
            )));
        }
        if config.scoring.word_target == 0 {
            return Err(MigrationError::config("scoring.word_target must be positive"));
        }
        for (name, band) in [("leaf", config.links.leaf), ("hub", config.links.hub)] {
            if band.min > band.max {
                return Err(MigrationError::config(format!(
                    "links.{name}: min {} exceeds max {}",
                    band.min, band.max
                )));
            }
        }
        if config.categories.max_categories == 0 {
            return Err(MigrationError::config(
                "categories.max_categories must be at least 1",
            ));
        }

        let legacy_tokens = config
            .legacy_tokens
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| LegacyToken {
                        regex,
                        fix: rule.fix.clone(),
                    })
                    .map_err(|e| {
                        MigrationError::config(format!(
                            "invalid legacy token pattern {:?}: {e}",
                            rule.pattern
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let upgrade_context = config
            .upgrade_context
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    MigrationError::config(format!(
                        "invalid upgrade context pattern {pattern:?}: {e}"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let code_languages: BTreeMap<String, String> = config
            .code_languages
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
            .collect();
        let mut accepted_languages: BTreeSet<String> = code_languages.values().cloned().collect();
        accepted_languages.insert(PLAIN_TEXT_LANGUAGE.to_string());

        Ok(Self {
            admonitions: config
                .admonitions
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
                .collect(),
            code_languages,
            accepted_languages,
            path_rules: config
                .categories
                .path_rules
                .iter()
                .map(|r| PathRule {
                    pattern: r.pattern.to_lowercase(),
                    requires: r.requires.iter().map(|p| p.to_lowercase()).collect(),
                    category: r.category.clone(),
                })
                .collect(),
            keyword_rules: config
                .categories
                .keyword_rules
                .iter()
                .map(|r| KeywordRule {
                    keyword: r.keyword.trim().to_lowercase(),
                    category: r.category.clone(),
                })
                .collect(),
            max_categories: config.categories.max_categories,
            difficulty_prefix: config.categories.difficulty_prefix.clone(),
            fallback_keywords: config.categories.fallback_keywords,
            fallback_title_words: config.categories.fallback_title_words,
            legacy_tokens,
            upgrade_context,
            scoring: config.scoring.clone(),
            links: config.links.clone(),
            url_conventions: config.url_conventions.clone(),
            validation: config.validation.clone(),
            inventory: config.inventory.clone(),
            render: config.render.clone(),
            run: config.pipeline.clone(),
        })
    }

    /// Template name for a call-out type, if mapped.
    pub fn admonition_template(&self, kind: &str) -> Option<&str> {
        self.admonitions
            .get(&kind.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Canonical language for a fence hint, if the destination accepts it.
    pub fn canonical_language(&self, hint: &str) -> Option<&str> {
        let hint = hint.trim().to_lowercase();
        if let Some(lang) = self.code_languages.get(&hint) {
            return Some(lang.as_str());
        }
        self.accepted_languages.get(&hint).map(String::as_str)
    }

    /// Possible points for a criterion.
    pub fn possible(&self, criterion: Criterion) -> Points {
        Points::from_whole(self.scoring.weights.get(criterion))
    }

    /// Score threshold as fixed-point.
    pub fn score_threshold(&self) -> Points {
        Points::from_whole(self.validation.score_threshold)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.wikimig/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MigrationError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the user config file (`~/.wikimig/wikimig.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the config following the lookup order.
///
/// An explicit path must exist. Without one, the first existing candidate is
/// used, falling back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(MigrationError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return load_config_from(path);
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return load_config_from(&local);
    }

    if let Ok(user) = config_file_path() {
        if user.exists() {
            return load_config_from(&user);
        }
    }

    tracing::debug!("no config file found, using defaults");
    Ok(PipelineConfig::default())
}

/// Load the config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))?;

    let config = toml::from_str(&content).map_err(|e| {
        MigrationError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Write a default config file to `path`, or to `~/.wikimig/wikimig.toml`.
/// Returns the path written.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| MigrationError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&PipelineConfig::default())
        .map_err(|e| MigrationError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MigrationError::io(&path, e))?;
    tracing::info!(path = %path.display(), "created default config file");

    Ok(path)
}
