//! Destination page naming and migration priority.

use wikimig_markdown::INDEX_STEMS;
use wikimig_shared::UrlConvention;
use wikimig_shared::config::PriorityRule;

/// Directory segments of a source path, lowercased.
fn directory_segments(source_path: &str) -> Vec<String> {
    let normalized = source_path.replace('\\', "/");
    let mut segments: Vec<String> = normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_lowercase)
        .collect();
    segments.pop();
    segments
}

/// First convention whose segment appears among the path's directories.
pub fn matching_convention<'a>(
    source_path: &str,
    conventions: &'a [UrlConvention],
) -> Option<&'a UrlConvention> {
    let segments = directory_segments(source_path);
    conventions
        .iter()
        .find(|c| segments.iter().any(|s| s.eq_ignore_ascii_case(c.segment.trim())))
}

/// `jwt-auth` → `Jwt_Auth`.
fn title_case(name: &str) -> String {
    name.replace(['-', ' '], "_")
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("_")
}

/// Derive the destination page name for a source file.
///
/// Index files take their directory's name. The first matching convention
/// supplies a `Prefix/` unless the page is the prefix itself.
pub fn derive_target_page_name(source_path: &str, conventions: &[UrlConvention]) -> String {
    let normalized = source_path.replace('\\', "/");
    let mut parts = normalized.rsplit('/').filter(|s| !s.is_empty());
    let file = parts.next().unwrap_or_default();
    let stem = file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file);

    let base = if INDEX_STEMS.contains(&stem.to_lowercase().as_str()) {
        parts.next().unwrap_or(stem)
    } else {
        stem
    };
    let name = title_case(base);

    match matching_convention(source_path, conventions) {
        Some(convention) if convention.prefix.eq_ignore_ascii_case(&name) => {
            convention.prefix.clone()
        }
        Some(convention) => format!("{}/{name}", convention.prefix),
        None => name,
    }
}

/// Priority label for a source path; first matching rule wins.
pub fn priority_for(source_path: &str, rules: &[PriorityRule], default: &str) -> String {
    let path = source_path.replace('\\', "/").to_lowercase();
    rules
        .iter()
        .find(|rule| path.contains(&rule.pattern.to_lowercase()))
        .map(|rule| rule.priority.clone())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikimig_shared::PipelineConfig;

    fn conventions() -> Vec<UrlConvention> {
        PipelineConfig::default().url_conventions
    }

    #[test]
    fn derives_prefixed_title_case_names() {
        let c = conventions();
        assert_eq!(
            derive_target_page_name("docs/security/jwt-auth.md", &c),
            "Security/Jwt_Auth"
        );
        assert_eq!(
            derive_target_page_name("docs/getting-started/installing-dreamfactory.md", &c),
            "Getting_Started/Installing_Dreamfactory"
        );
        assert_eq!(derive_target_page_name("docs/misc/FAQ.md", &c), "Faq");
    }

    #[test]
    fn index_files_use_their_directory() {
        let c = conventions();
        assert_eq!(derive_target_page_name("docs/security/index.md", &c), "Security");
        assert_eq!(
            derive_target_page_name("docs/security/oauth/_index.md", &c),
            "Security/Oauth"
        );
        assert_eq!(derive_target_page_name("docs/docker/introduction.md", &c), "Docker");
    }

    #[test]
    fn convention_matches_directories_only() {
        let c = conventions();
        assert!(matching_convention("docs/security.md", &c).is_none());
        assert_eq!(
            matching_convention("docs/Security/x.md", &c).map(|c| c.prefix.as_str()),
            Some("Security")
        );
    }

    #[test]
    fn priority_rules_apply_in_order() {
        let config = PipelineConfig::default();
        let rules = &config.inventory.priority_rules;
        let default = &config.inventory.default_priority;
        assert_eq!(priority_for("docs/docker/install.md", rules, default), "P0-Critical");
        assert_eq!(priority_for("docs/security/jwt.md", rules, default), "P1-High");
        assert_eq!(priority_for("docs/api-generation/x.md", rules, default), "P2-Medium");
        assert_eq!(priority_for("docs/misc/x.md", rules, default), "P3-Low");
    }
}
