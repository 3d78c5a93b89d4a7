//! Frontmatter parsing and wiki markup normalization.
//!
//! Takes converter output (MediaWiki text with Docusaurus/Hugo leftovers) and
//! produces clean destination markup. Nothing in this crate fails a document:
//! every problem is reported as a [`UnitWarning`](wikimig_shared::UnitWarning).

mod code;
pub mod frontmatter;
pub mod links;
pub mod normalize;

use std::sync::LazyLock;

use regex::Regex;

pub use code::{CodeBlockSummary, code_block_summary};
pub use frontmatter::{ParsedDocument, parse_frontmatter};
pub use links::{INDEX_STEMS, LinkResolver};
pub use normalize::{NormalizeContext, Normalized, Rewrite, normalize};

/// Count prose words, excluding code regions and file/category tags.
///
/// Link and template markup is stripped first; only display text and
/// template arguments count.
pub fn count_words(text: &str) -> usize {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\[\[(?:File|Image|Category):[^\]]*\]\]").expect("valid regex")
    });
    static HTML_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
    static WIKI_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]]*)\]\]").expect("valid regex")
    });
    static EXTERNAL_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\[(?:https?://|mailto:)[^\s\]]*\s*([^\]]*)\]").expect("valid regex")
    });
    static TEMPLATE_OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{\{\s*[^|{}]*").expect("valid regex"));
    static NAMED_ARG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\|\s*[\w-]+\s*=").expect("valid regex"));

    let prose = code::strip_code(text);
    let prose = TAG_RE.replace_all(&prose, " ");
    let prose = HTML_RE.replace_all(&prose, " ");
    let prose = WIKI_LINK_RE.replace_all(&prose, " $1 ");
    let prose = EXTERNAL_LINK_RE.replace_all(&prose, " $1 ");
    let prose = TEMPLATE_OPEN_RE.replace_all(&prose, " ");
    let prose = NAMED_ARG_RE.replace_all(&prose, " ");
    prose
        .replace("}}", " ")
        .replace('|', " ")
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

/// Wiki table openers (`{|`) and closers (`|}`) at line starts outside code.
pub fn table_markers(text: &str) -> (usize, usize) {
    let prose = code::strip_code(text);
    prose.lines().fold((0, 0), |(opens, closes), line| {
        let line = line.trim_start();
        if line.starts_with("{|") {
            (opens + 1, closes)
        } else if line.starts_with("|}") {
            (opens, closes + 1)
        } else {
            (opens, closes)
        }
    })
}

/// Converter-escaped brackets (`\[`, `\]`) left outside code.
pub fn escaped_brackets(text: &str) -> usize {
    let prose = code::strip_code(text);
    prose.matches("\\[").count() + prose.matches("\\]").count()
}

/// Internal wiki link targets in `text`, anchors removed, first-seen order.
///
/// Namespaced links (`File:`, `Category:`, …), anchors and links inside code
/// are skipped.
pub fn wiki_link_targets(text: &str) -> Vec<String> {
    let spans = code::code_spans(text);
    let mut targets: Vec<String> = Vec::new();
    for caps in normalize::WIKI_LINK_RE.captures_iter(text) {
        let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if code::in_code(&spans, whole.start()) || links::is_special_wiki_target(target.as_str()) {
            continue;
        }
        let target = target.as_str().split('#').next().unwrap_or_default().trim();
        if !target.is_empty() && !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_excludes_code_blocks() {
        let text = "Two words\n<syntaxhighlight lang=\"bash\">\nls -la /var/log\n</syntaxhighlight>\n";
        assert_eq!(count_words(text), 2);
    }

    #[test]
    fn word_count_ignores_markup_tokens() {
        let text = "== Heading ==\n* item one\n[[File:a.png|thumb|Alt text]]\n[[Category:Security]]\n";
        assert_eq!(count_words(text), 3);
    }

    #[test]
    fn word_count_strips_link_and_template_markup() {
        let text = "{{Note|title=Heads up|Careful now.}} <p>Hello</p> [[Security/Jwt|JWT docs]] [https://example.com site]\n";
        assert_eq!(count_words(text), 8);
    }

    #[test]
    fn table_markers_count_line_starts_outside_code() {
        let text = "{| class=\"wikitable\"\n| a\n|}\n{|\n| b\n<syntaxhighlight lang=\"text\">\n|}\n</syntaxhighlight>\n";
        assert_eq!(table_markers(text), (2, 1));
        assert_eq!(table_markers("{{Note|x|}}\n"), (0, 0));
    }

    #[test]
    fn escaped_brackets_outside_code() {
        assert_eq!(escaped_brackets("a \\[1\\] b"), 2);
        assert_eq!(escaped_brackets("```\n\\[x\\]\n```\n"), 0);
    }

    #[test]
    fn wiki_link_targets_skip_special_links() {
        let text = "[[Security/Jwt_Auth|JWT]] [[Security/Jwt_Auth#keys]] [[File:x.png]] [[#top|Top]] [[Category:A]] [[Security]]\n<syntaxhighlight lang=\"text\">\n[[Hidden]]\n</syntaxhighlight>\n";
        assert_eq!(wiki_link_targets(text), vec!["Security/Jwt_Auth", "Security"]);
    }
}
