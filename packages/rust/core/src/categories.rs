//! Category assignment from path and keyword rules.

use wikimig_shared::{Frontmatter, Ruleset, UnitWarning, WarningKind};

/// Categories for one unit, plus a warning per category dropped by the cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryAssignment {
    pub categories: Vec<String>,
    pub warnings: Vec<UnitWarning>,
}

/// `rest api` → `Rest_Api`.
fn category_name(words: &str) -> String {
    words
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("_")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Categories derived from the header when no rule matches: the first
/// keywords, or capitalized title words when there are no keywords.
fn fallback_categories(frontmatter: &Frontmatter, ruleset: &Ruleset) -> Vec<String> {
    if !frontmatter.keywords.is_empty() {
        return frontmatter
            .keywords
            .iter()
            .take(ruleset.fallback_keywords)
            .map(|k| category_name(k))
            .filter(|c| c.chars().count() > 2)
            .collect();
    }
    let Some(title) = frontmatter.title.as_deref() else {
        return Vec::new();
    };
    title
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() > 3 && w.chars().next().is_some_and(char::is_uppercase))
        .take(ruleset.fallback_title_words)
        .map(str::to_string)
        .collect()
}

/// Assign categories to a unit.
///
/// All path rules are tried in order, then all keyword rules. Every match
/// contributes; duplicates collapse onto their first occurrence. When no
/// rule matches, categories are derived from the keywords or the title.
/// A `difficulty` header adds one more. At most `max_categories` are kept,
/// in match order.
pub fn assign_categories(
    source_path: &str,
    frontmatter: &Frontmatter,
    ruleset: &Ruleset,
) -> CategoryAssignment {
    let path = source_path.replace('\\', "/").to_lowercase();
    let keywords: Vec<String> = frontmatter
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .collect();

    let path_matches = ruleset
        .path_rules
        .iter()
        .filter(|rule| rule.matches(&path))
        .map(|rule| rule.category.clone());
    let keyword_matches = ruleset
        .keyword_rules
        .iter()
        .filter(|rule| keywords.iter().any(|k| *k == rule.keyword))
        .map(|rule| rule.category.clone());

    let mut candidates: Vec<String> = path_matches.chain(keyword_matches).collect();
    if candidates.is_empty() {
        candidates = fallback_categories(frontmatter, ruleset);
    }
    if let Some(difficulty) = frontmatter
        .difficulty
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        candidates.push(format!("{}{}", ruleset.difficulty_prefix, capitalize(difficulty)));
    }

    let mut matched: Vec<String> = Vec::new();
    for category in candidates {
        if !matched.contains(&category) {
            matched.push(category);
        }
    }

    let mut assignment = CategoryAssignment::default();
    for (i, category) in matched.into_iter().enumerate() {
        if i < ruleset.max_categories {
            assignment.categories.push(category);
        } else {
            assignment.warnings.push(UnitWarning::new(
                WarningKind::CategoryOverflow,
                format!(
                    "category {category:?} dropped: limit of {} reached",
                    ruleset.max_categories
                ),
            ));
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikimig_shared::PipelineConfig;
    use wikimig_shared::config::KeywordRule;

    fn ruleset() -> Ruleset {
        Ruleset::compile(&PipelineConfig::default()).expect("ruleset")
    }

    fn kw(words: &[&str]) -> Frontmatter {
        Frontmatter {
            keywords: words.iter().map(|w| (*w).to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn path_rules_fire_before_keyword_rules() {
        let assignment = assign_categories(
            "docs/security/jwt-auth.md",
            &kw(&["jwt", "mysql"]),
            &ruleset(),
        );
        assert_eq!(
            assignment.categories,
            vec!["Security", "Authentication", "Database"]
        );
        assert!(assignment.warnings.is_empty());
    }

    #[test]
    fn duplicate_matches_collapse() {
        let assignment = assign_categories(
            "docs/getting-started/installing-docker.md",
            &kw(&["docker", "kubernetes"]),
            &ruleset(),
        );
        assert_eq!(assignment.categories, vec!["Installation", "Getting_Started"]);
    }

    #[test]
    fn overflow_is_capped_with_one_warning_per_drop() {
        let mut config = PipelineConfig::default();
        config.categories.max_categories = 2;
        let ruleset = Ruleset::compile(&config).expect("ruleset");

        let assignment = assign_categories(
            "docs/security/api-database.md",
            &kw(&["scripting"]),
            &ruleset,
        );
        assert_eq!(assignment.categories, vec!["Security", "API"]);
        assert_eq!(assignment.warnings.len(), 2);
        assert!(
            assignment
                .warnings
                .iter()
                .all(|w| w.kind == WarningKind::CategoryOverflow)
        );
        assert!(assignment.warnings[0].message.contains("Database"));
    }

    #[test]
    fn assignment_is_independent_of_keyword_order() {
        let ruleset = ruleset();
        let a = assign_categories("docs/misc/page.md", &kw(&["jwt", "docker"]), &ruleset);
        let b = assign_categories("docs/misc/page.md", &kw(&["docker", "jwt"]), &ruleset);
        assert_eq!(a, b);
        assert_eq!(a.categories, vec!["Authentication", "Installation"]);
    }

    #[test]
    fn difficulty_adds_a_category() {
        let mut frontmatter = kw(&["jwt"]);
        frontmatter.difficulty = Some("ADVANCED".into());
        let assignment = assign_categories("docs/security/jwt.md", &frontmatter, &ruleset());
        assert_eq!(
            assignment.categories,
            vec!["Security", "Authentication", "Difficulty_Advanced"]
        );
    }

    #[test]
    fn keywords_stand_in_when_no_rule_matches() {
        let assignment = assign_categories(
            "docs/misc/cache.md",
            &kw(&["redis cache", "ui", "eviction", "memory"]),
            &ruleset(),
        );
        assert_eq!(assignment.categories, vec!["Redis_Cache", "Eviction"]);
    }

    #[test]
    fn title_words_stand_in_without_keywords() {
        let frontmatter = Frontmatter {
            title: Some("Configuring Redis for the Edge".into()),
            ..Default::default()
        };
        let assignment = assign_categories("docs/misc/cache.md", &frontmatter, &ruleset());
        assert_eq!(assignment.categories, vec!["Configuring", "Redis"]);

        let bare = assign_categories("docs/misc/cache.md", &Frontmatter::default(), &ruleset());
        assert!(bare.categories.is_empty());
    }

    #[test]
    fn legacy_guide_and_file_storage_paths() {
        let assignment = assign_categories(
            "guide/file-storage/s3.md",
            &Frontmatter::default(),
            &ruleset(),
        );
        assert_eq!(assignment.categories, vec!["File_Storage", "Legacy_Guide"]);

        let assignment = assign_categories(
            "dreamfactory-book/chapter-1.md",
            &Frontmatter::default(),
            &ruleset(),
        );
        assert_eq!(assignment.categories, vec!["Legacy_Guide"]);
    }

    #[test]
    fn custom_keyword_table_is_used() {
        let mut config = PipelineConfig::default();
        config.categories.keyword_rules = vec![KeywordRule {
            keyword: "Redis".into(),
            category: "Caching".into(),
        }];
        let ruleset = Ruleset::compile(&config).expect("ruleset");
        let assignment = assign_categories("docs/misc/cache.md", &kw(&["redis"]), &ruleset);
        assert_eq!(assignment.categories, vec!["Caching"]);
    }
}
