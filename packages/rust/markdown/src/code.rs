//! Code region detection.
//!
//! Rewrites never touch text inside a code region. Regions are fenced
//! blocks (optionally opened inside `<pre>`) and closed
//! `<syntaxhighlight>` elements. An unterminated fence runs to the end of
//! the text.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use wikimig_shared::PLAIN_TEXT_LANGUAGE;

static FENCE_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:<pre>)?[ \t]*```[ \t]*([^\s`]*)[^`]*$").expect("valid regex")
});

static FENCE_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*```[ \t]*(?:</pre>)?[ \t]*$").expect("valid regex")
});

static HIGHLIGHT_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<syntaxhighlight\b[^>]*>").expect("valid regex"));

const HIGHLIGHT_CLOSE: &str = "</syntaxhighlight>";

/// One fenced block found by [`scan_fences`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fence {
    /// Whole block including opener and closer lines.
    pub span: Range<usize>,
    /// Language hint as written (may be empty).
    pub hint: String,
    /// Body between the opener and closer lines.
    pub body: Range<usize>,
    pub terminated: bool,
}

/// Byte offset just past the newline ending the line at `start`.
pub(crate) fn line_end(text: &str, start: usize) -> usize {
    text[start..]
        .find('\n')
        .map(|i| start + i + 1)
        .unwrap_or(text.len())
}

fn strip_newline(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

/// Fence opener on this line, returning the hint.
pub(crate) fn fence_opener(line: &str) -> Option<&str> {
    FENCE_OPEN_RE
        .captures(strip_newline(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub(crate) fn is_fence_closer(line: &str) -> bool {
    FENCE_CLOSE_RE.is_match(strip_newline(line))
}

/// Find fenced blocks outside `<syntaxhighlight>` elements.
pub(crate) fn scan_fences(text: &str) -> Vec<Fence> {
    let highlights = highlight_spans(text);
    let mut fences = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        if let Some(span) = highlights.iter().find(|s| s.contains(&pos)) {
            pos = line_end(text, span.end.saturating_sub(1).max(pos));
            continue;
        }
        let end = line_end(text, pos);
        let Some(hint) = fence_opener(&text[pos..end]) else {
            pos = end;
            continue;
        };

        let mut cursor = end;
        let mut closer = None;
        while cursor < text.len() {
            let next = line_end(text, cursor);
            if is_fence_closer(&text[cursor..next]) {
                closer = Some((cursor, next));
                break;
            }
            cursor = next;
        }

        let fence = match closer {
            Some((close_start, close_end)) => Fence {
                span: pos..close_end,
                hint: hint.to_string(),
                body: end..close_start,
                terminated: true,
            },
            None => Fence {
                span: pos..text.len(),
                hint: hint.to_string(),
                body: end..text.len(),
                terminated: false,
            },
        };
        pos = fence.span.end;
        fences.push(fence);
    }

    fences
}

/// Closed `<syntaxhighlight>…</syntaxhighlight>` elements.
fn highlight_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(open) = HIGHLIGHT_OPEN_RE.find_at(text, from) {
        match text[open.end()..].find(HIGHLIGHT_CLOSE) {
            Some(i) => {
                let end = open.end() + i + HIGHLIGHT_CLOSE.len();
                spans.push(open.start()..end);
                from = end;
            }
            None => break,
        }
    }
    spans
}

/// All code regions, sorted and non-overlapping.
pub(crate) fn code_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = highlight_spans(text);
    spans.extend(scan_fences(text).into_iter().map(|f| f.span));
    spans.sort_by_key(|s| s.start);
    spans
}

pub(crate) fn in_code(spans: &[Range<usize>], offset: usize) -> bool {
    spans.iter().any(|s| s.contains(&offset))
}

/// Apply `f` to every stretch of text outside code regions.
pub(crate) fn map_prose(text: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for span in code_spans(text) {
        if span.start > pos {
            out.push_str(&f(&text[pos..span.start]));
        }
        out.push_str(&text[span.start.max(pos)..span.end]);
        pos = span.end.max(pos);
    }
    if pos < text.len() {
        out.push_str(&f(&text[pos..]));
    }
    out
}

/// `text` with every code region replaced by a line break.
pub(crate) fn strip_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for span in code_spans(text) {
        if span.start > pos {
            out.push_str(&text[pos..span.start]);
        }
        out.push('\n');
        pos = span.end.max(pos);
    }
    if pos < text.len() {
        out.push_str(&text[pos..]);
    }
    out
}

/// Replace every match of `re` that starts outside code regions.
pub(crate) fn replace_outside_code(
    text: &str,
    re: &Regex,
    mut replace: impl FnMut(&regex::Captures<'_>) -> String,
) -> String {
    let spans = code_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if in_code(&spans, whole.start()) {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        out.push_str(&replace(&caps));
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

// ---------------------------------------------------------------------------
// Plain <pre> blocks
// ---------------------------------------------------------------------------

static CODE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:[$#>]|(?:import|from|use|require|include) |(?:docker|git|curl|npm|pip|apt|sudo|mkdir|php|python)\b|(?:cd|cp|mv|rm|ls|cat) |"\w+":\s|\w+=)|[{};=\[\]()]\s*$"#,
    )
    .expect("valid regex")
});

/// Whether a `<pre>` body reads as code: at least 30% of its lines look
/// like commands, assignments or statements.
pub(crate) fn looks_like_code(text: &str) -> bool {
    let lines: Vec<&str> = text.trim().lines().collect();
    if lines.is_empty() {
        return false;
    }
    let hits = lines
        .iter()
        .filter(|line| CODE_LINE_RE.is_match(line.trim()))
        .count();
    hits >= 1 && hits * 10 >= lines.len() * 3
}

/// Best guess at the language of an unlabelled code block.
pub(crate) fn guess_language(code: &str) -> &'static str {
    static PHP_VAR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\$\w+\s*=\s*\$").expect("valid regex"));
    static JSON_OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*[\[{]").expect("valid regex"));
    static JSON_KEY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"["']\w+["']\s*:"#).expect("valid regex"));
    static SQL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^\s*(?:SELECT|INSERT|UPDATE|DELETE|CREATE|ALTER|DROP|SET GLOBAL|mysql>)")
            .expect("valid regex")
    });
    static SHELL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(?:[$#>]|(?:docker|git|curl|npm|sudo|apt|pip)\b|(?:cd|ssh) )")
            .expect("valid regex")
    });
    static YAML_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\w+:\s").expect("valid regex"));
    static ENV_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Z_]+=").expect("valid regex"));

    let first = code.trim().lines().next().unwrap_or_default();
    if code.contains("<?php") || PHP_VAR_RE.is_match(code) {
        "php"
    } else if JSON_OPEN_RE.is_match(code) && JSON_KEY_RE.is_match(code) {
        "json"
    } else if SQL_RE.is_match(code) {
        "sql"
    } else if SHELL_RE.is_match(first) {
        "bash"
    } else if YAML_RE.is_match(first) {
        "yaml"
    } else if ENV_RE.is_match(first) {
        "bash"
    } else {
        PLAIN_TEXT_LANGUAGE
    }
}

/// Code block counts used by the CodeExamples criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeBlockSummary {
    /// Closed `<syntaxhighlight>` elements.
    pub blocks: usize,
    /// Unbalanced tags plus leftover fences.
    pub malformed: usize,
}

impl CodeBlockSummary {
    pub fn all_well_formed(&self) -> bool {
        self.blocks > 0 && self.malformed == 0
    }
}

/// Count highlight blocks and structural problems in destination markup.
pub fn code_block_summary(text: &str) -> CodeBlockSummary {
    let opens = HIGHLIGHT_OPEN_RE.find_iter(text).count();
    let closes = text.matches(HIGHLIGHT_CLOSE).count();
    let blocks = highlight_spans(text).len();
    let leftover_fences = scan_fences(text).len();
    CodeBlockSummary {
        blocks,
        malformed: opens.abs_diff(closes) + leftover_fences,
    }
}
