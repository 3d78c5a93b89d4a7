//! Source-path to wiki-page resolution.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// File stems whose page stands for their directory.
pub const INDEX_STEMS: [&str; 3] = ["index", "_index", "introduction"];

/// Maps links written against the source tree to destination page names.
///
/// Built once per run from `(source_path, target_page_name)` pairs and shared
/// read-only across workers.
#[derive(Debug, Clone, Default)]
pub struct LinkResolver {
    keys: BTreeMap<String, String>,
    sources: BTreeMap<String, String>,
    strip_prefixes: Vec<String>,
}

impl LinkResolver {
    pub fn new<S, T>(entries: &[(S, T)], strip_prefixes: &[String]) -> Self
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut resolver = Self {
            keys: BTreeMap::new(),
            sources: BTreeMap::new(),
            strip_prefixes: strip_prefixes
                .iter()
                .map(|p| p.trim_start_matches('/').to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        };

        let mut sorted: Vec<(&str, &str)> = entries
            .iter()
            .map(|(s, t)| (s.as_ref(), t.as_ref()))
            .collect();
        sorted.sort();

        // Exact keys first so a slug never shadows a full path.
        let mut slugs = Vec::new();
        for (source, target) in &sorted {
            resolver
                .sources
                .entry((*target).to_string())
                .or_insert_with(|| (*source).to_string());

            let key = resolver.normalize(source);
            let mut exact = vec![key.clone(), format!("docs/{key}")];
            let slug = match key.rsplit_once('/') {
                Some((dir, stem)) if INDEX_STEMS.contains(&stem) => {
                    exact.push(dir.to_string());
                    exact.push(format!("docs/{dir}"));
                    dir.rsplit('/').next().unwrap_or(dir).to_string()
                }
                Some((_, stem)) => stem.to_string(),
                None => key.clone(),
            };
            for k in exact {
                resolver
                    .keys
                    .entry(k)
                    .or_insert_with(|| (*target).to_string());
            }
            slugs.push((slug, *target));
        }
        for (slug, target) in slugs {
            resolver
                .keys
                .entry(slug)
                .or_insert_with(|| target.to_string());
        }

        resolver
    }

    /// Resolve a link written in the document at `from` to a page name.
    pub fn resolve(&self, href: &str, from: Option<&str>) -> Option<&str> {
        let path = href
            .split(['#', '?'])
            .next()
            .unwrap_or_default()
            .trim();
        if path.is_empty() {
            return None;
        }
        if let Some((target, _)) = self.sources.get_key_value(path) {
            return Some(target.as_str());
        }

        let mut candidates = Vec::new();
        let is_relative = !path.starts_with('/');
        if is_relative {
            if let Some(dir) = from.and_then(|f| f.rsplit_once('/')).map(|(d, _)| d) {
                candidates.push(join_relative(dir, path));
            } else if from.is_some() {
                candidates.push(join_relative("", path));
            }
        }
        candidates.push(path.to_string());

        let keys: Vec<String> = candidates
            .iter()
            .map(|c| self.normalize(c))
            .filter(|k| !k.is_empty())
            .collect();
        for key in &keys {
            let hit = self
                .keys
                .get(key)
                .or_else(|| self.keys.get(&format!("docs/{key}")));
            if let Some(target) = hit {
                return Some(target.as_str());
            }
        }
        keys.iter()
            .filter_map(|key| self.keys.get(key.rsplit('/').next().unwrap_or(key)))
            .map(String::as_str)
            .next()
    }

    /// The source path that produced `target`, if any.
    pub fn source_for(&self, target: &str) -> Option<&str> {
        self.sources.get(target).map(String::as_str)
    }

    /// Whether `name` is a known destination page.
    pub fn is_target(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Lowercased lookup key: prefixes and extension stripped.
    fn normalize(&self, path: &str) -> String {
        let mut key = path.replace('\\', "/").to_lowercase();
        while let Some(rest) = key.strip_prefix("./") {
            key = rest.to_string();
        }
        key = key.trim_start_matches('/').to_string();
        for prefix in &self.strip_prefixes {
            if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                key = rest.trim_start_matches('/').to_string();
                break;
            }
        }
        let key = key.trim_end_matches('/');
        let key = key
            .strip_suffix(".mdx")
            .or_else(|| key.strip_suffix(".md"))
            .unwrap_or(key);
        key.to_string()
    }
}

/// Join `rel` onto `dir`, folding `.` and `..` segments.
fn join_relative(dir: &str, rel: &str) -> String {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Absolute URL with a scheme (`https://…`, `mailto:…`).
pub fn is_external(href: &str) -> bool {
    let href = href.trim();
    match Url::parse(href) {
        Ok(url) => url.scheme().len() > 1 && (href.contains("://") || url.scheme() == "mailto"),
        Err(_) => false,
    }
}

/// Wiki link targets that point into another namespace or are not pages.
pub fn is_special_wiki_target(target: &str) -> bool {
    static NAMESPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*:").expect("valid regex"));

    let target = target.trim();
    target.starts_with('#')
        || target.starts_with(':')
        || target.starts_with("http")
        || NAMESPACE_RE.is_match(target)
}

/// Anchor text in destination form (`-` becomes `_`).
pub fn wiki_anchor(anchor: &str) -> String {
    anchor.trim().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> LinkResolver {
        LinkResolver::new(
            &[
                ("docs/security/jwt-auth.md", "Security/Jwt_Auth"),
                ("docs/security/index.md", "Security"),
                ("docs/getting-started/installing.md", "Getting_Started/Installing"),
                ("docs/reference/installing.md", "Reference/Installing"),
            ],
            &["docs/".to_string()],
        )
    }

    #[test]
    fn resolves_relative_and_absolute_paths() {
        let r = resolver();
        assert_eq!(
            r.resolve("./jwt-auth.md", Some("docs/security/index.md")),
            Some("Security/Jwt_Auth")
        );
        assert_eq!(
            r.resolve("../security/jwt-auth", Some("docs/getting-started/installing.md")),
            Some("Security/Jwt_Auth")
        );
        assert_eq!(r.resolve("/security/jwt-auth/", None), Some("Security/Jwt_Auth"));
        assert_eq!(r.resolve("/docs/security", None), Some("Security"));
    }

    #[test]
    fn slug_lookup_prefers_first_sorted_entry() {
        let r = resolver();
        assert_eq!(r.resolve("installing", None), Some("Getting_Started/Installing"));
        assert_eq!(
            r.resolve("reference/installing.md#step-2", None),
            Some("Reference/Installing")
        );
    }

    #[test]
    fn round_trip_between_source_and_target() {
        let r = resolver();
        for (source, target) in [
            ("docs/security/jwt-auth.md", "Security/Jwt_Auth"),
            ("docs/reference/installing.md", "Reference/Installing"),
        ] {
            assert_eq!(r.resolve(source, None), Some(target));
            assert_eq!(r.source_for(target), Some(source));
        }
        assert!(r.is_target("Security"));
        assert!(!r.is_target("Nope"));
    }

    #[test]
    fn unknown_paths_do_not_resolve() {
        assert_eq!(resolver().resolve("nowhere/page.md", None), None);
        assert_eq!(resolver().resolve("#anchor-only", None), None);
    }

    #[test]
    fn classification_helpers() {
        assert!(is_external("https://example.com/a"));
        assert!(is_external("mailto:ops@example.com"));
        assert!(!is_external("security/jwt.md"));
        assert!(!is_external("C:/docs"));
        assert!(is_special_wiki_target("File:logo.png"));
        assert!(is_special_wiki_target("Category:Security"));
        assert!(is_special_wiki_target("V2:Old_Page"));
        assert!(!is_special_wiki_target("Security/Jwt_Auth"));
        assert_eq!(wiki_anchor("step-2"), "step_2");
    }
}
