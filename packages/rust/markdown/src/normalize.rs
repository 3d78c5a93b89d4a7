//! Markup normalization passes.
//!
//! Each pass is a function `&str -> String` applied in sequence over the
//! converter output. Passes never fail: a construct that cannot be rewritten
//! passes through byte-for-byte and leaves a [`UnitWarning`] behind. Text
//! inside code regions is only ever touched by the code-fence pass.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, instrument};

use wikimig_shared::{PLAIN_TEXT_LANGUAGE, Ruleset, UnitWarning, WarningKind};

use crate::code::{
    code_spans, fence_opener, guess_language, in_code, line_end, looks_like_code, map_prose,
    replace_outside_code, scan_fences,
};
use crate::links::{LinkResolver, is_external, is_special_wiki_target, wiki_anchor};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Read-only inputs shared by every pass for one unit.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub ruleset: &'a Ruleset,
    pub resolver: &'a LinkResolver,
    /// Source path of the unit being normalized; relative links resolve against it.
    pub source_path: &'a str,
}

/// Normalizer output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub warnings: Vec<UnitWarning>,
}

/// Outcome of rewriting one block or inline construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Converted(String),
    /// Original text kept verbatim.
    PassedThrough { text: String, reason: String },
}

impl Rewrite {
    fn passed_through(text: &str, reason: impl Into<String>) -> Self {
        Self::PassedThrough {
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    /// Resulting text; a pass-through records one warning of `kind`.
    fn settle(self, kind: WarningKind, warnings: &mut Vec<UnitWarning>) -> String {
        match self {
            Self::Converted(text) => text,
            Self::PassedThrough { text, reason } => {
                warnings.push(UnitWarning::new(kind, reason));
                text
            }
        }
    }
}

/// Run every pass over `text`.
#[instrument(skip_all, fields(source = %ctx.source_path))]
pub fn normalize(text: &str, ctx: &NormalizeContext<'_>) -> Normalized {
    let mut warnings = Vec::new();

    let mut result = clean_artifacts(text);
    result = lift_pre_content(&result);
    result = rewrite_admonitions(&result, ctx.ruleset, &mut warnings);
    result = rewrite_images(&result);
    result = repair_code_blocks(&result, ctx.ruleset, &mut warnings);
    result = rewrite_links(&result, ctx, &mut warnings);
    result = normalize_whitespace(&result);

    debug!(
        len = result.len(),
        warnings = warnings.len(),
        "normalization complete"
    );

    Normalized {
        text: result,
        warnings,
    }
}

fn keep_newline(original: &str, mut rewritten: String) -> String {
    if original.ends_with('\n') && !rewritten.ends_with('\n') {
        rewritten.push('\n');
    }
    rewritten
}

// ---------------------------------------------------------------------------
// Pass 1: Converter artifacts
// ---------------------------------------------------------------------------

/// Undo escaping and wrappers the converter leaves behind.
fn clean_artifacts(text: &str) -> String {
    static DIV_OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<div\b[^>]*>[ \t]*\n?").expect("valid regex"));
    static DIV_CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n?[ \t]*</div>").expect("valid regex"));
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

    map_prose(text, |prose| {
        let cleaned = prose
            .replace("\\[", "[")
            .replace("\\]", "]")
            .replace("\\|", "|")
            .replace(['\u{201c}', '\u{201d}'], "\"")
            .replace(['\u{2018}', '\u{2019}'], "'")
            .replace("{|class=", "{| class=");
        let cleaned = DIV_OPEN_RE.replace_all(&cleaned, "");
        let cleaned = DIV_CLOSE_RE.replace_all(&cleaned, "");
        MULTI_BLANK_RE.replace_all(&cleaned, "\n\n").into_owned()
    })
}

// ---------------------------------------------------------------------------
// Pass 2: Content wrapped in <pre>
// ---------------------------------------------------------------------------

static PRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pre>(.*?)</pre>").expect("valid regex"));

static MD_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#).expect("valid regex")
});

/// Unwrap call-outs and lift images out of `<pre>` blocks the converter
/// produced from indented source text.
fn lift_pre_content(text: &str) -> String {
    replace_outside_code(text, &PRE_RE, |caps| {
        let inner = &caps[1];
        if inner.lines().any(|line| ADMONITION_OPEN_RE.is_match(line)) {
            return inner.to_string();
        }
        if !MD_IMAGE_RE.is_match(inner) {
            return caps[0].to_string();
        }

        let mut parts: Vec<String> = Vec::new();
        let mut last = 0;
        for image in MD_IMAGE_RE.find_iter(inner) {
            let before = &inner[last..image.start()];
            if !before.trim().is_empty() {
                parts.push(format!("<pre>{before}</pre>"));
            }
            parts.push(image.as_str().to_string());
            last = image.end();
        }
        let rest = &inner[last..];
        if !rest.trim().is_empty() {
            parts.push(format!("<pre>{rest}</pre>"));
        }
        parts.join("\n")
    })
}

// ---------------------------------------------------------------------------
// Pass 3: Call-out blocks
// ---------------------------------------------------------------------------

static ADMONITION_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:<pre>)?[ \t]*:::[ \t]*([A-Za-z][\w-]*)(?:\[([^\]]*)\]|[ \t]+(.*?))?[ \t]*$")
        .expect("valid regex")
});

static ADMONITION_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*::::?[ \t]*(?:</pre>)?[ \t]*$").expect("valid regex"));

static HUGO_ALERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\{\{(?:<|%|&lt;)\s*alert\b(.*?)\s*(?:>|%|&gt;)\}\}(.*?)\{\{(?:<|%|&lt;)\s*/alert\s*(?:>|%|&gt;)\}\}",
    )
    .expect("valid regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)\s*=\s*["\u{201c}\u{201d}']([^"\u{201c}\u{201d}']*)["\u{201c}\u{201d}']"#)
        .expect("valid regex")
});

/// Map one call-out to a template, or keep `original` verbatim.
pub fn rewrite_admonition(
    kind: &str,
    title: Option<&str>,
    body: &str,
    original: &str,
    ruleset: &Ruleset,
) -> Rewrite {
    let Some(template) = ruleset.admonition_template(kind) else {
        return Rewrite::passed_through(original, format!("unmapped call-out type `{kind}`"));
    };

    let body = body.trim();
    let mut out = format!("{{{{{template}");
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str("|title=");
        out.push_str(title);
    }
    out.push('|');
    // Fences must keep whole lines to stay recognizable.
    let fenced = body.lines().any(|l| fence_opener(l).is_some());
    if fenced {
        out.push('\n');
    }
    out.push_str(body);
    if fenced {
        out.push('\n');
    }
    out.push_str("}}");
    Rewrite::Converted(keep_newline(original, out))
}

fn rewrite_admonitions(text: &str, ruleset: &Ruleset, warnings: &mut Vec<UnitWarning>) -> String {
    let text = rewrite_docusaurus_admonitions(text, ruleset, warnings);

    replace_outside_code(&text, &HUGO_ALERT_RE, |caps| {
        let attrs: BTreeMap<String, String> = ATTR_RE
            .captures_iter(&caps[1])
            .map(|a| (a[1].to_lowercase(), a[2].to_string()))
            .collect();
        let kind = attrs
            .get("color")
            .or_else(|| attrs.get("type"))
            .map(String::as_str)
            .unwrap_or("note");
        rewrite_admonition(
            kind,
            attrs.get("title").map(String::as_str),
            &caps[2],
            &caps[0],
            ruleset,
        )
        .settle(WarningKind::UnmappedAdmonition, warnings)
    })
}

/// `:::type [Title]` … `:::` blocks, optionally wrapped in `<pre>`.
fn rewrite_docusaurus_admonitions(
    text: &str,
    ruleset: &Ruleset,
    warnings: &mut Vec<UnitWarning>,
) -> String {
    let spans = code_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while pos < text.len() {
        let end = line_end(text, pos);
        let line = &text[pos..end];
        let opener = (!in_code(&spans, pos))
            .then(|| ADMONITION_OPEN_RE.captures(line.trim_end_matches(['\n', '\r'])))
            .flatten();

        let Some(caps) = opener else {
            out.push_str(line);
            pos = end;
            continue;
        };

        let mut cursor = end;
        let mut closer = None;
        while cursor < text.len() {
            let next = line_end(text, cursor);
            if !in_code(&spans, cursor)
                && ADMONITION_CLOSE_RE.is_match(text[cursor..next].trim_end_matches(['\n', '\r']))
            {
                closer = Some((cursor, next));
                break;
            }
            cursor = next;
        }

        let kind = caps.get(1).map_or("", |m| m.as_str());
        let Some((close_start, close_end)) = closer else {
            warnings.push(UnitWarning::new(
                WarningKind::UnmappedAdmonition,
                format!("call-out `{kind}` is never closed"),
            ));
            out.push_str(line);
            pos = end;
            continue;
        };

        let title = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
        let rewrite = rewrite_admonition(
            kind,
            title,
            &text[end..close_start],
            &text[pos..close_end],
            ruleset,
        );
        out.push_str(&rewrite.settle(WarningKind::UnmappedAdmonition, warnings));
        pos = close_end;
    }

    out
}

// ---------------------------------------------------------------------------
// Pass 4: Images
// ---------------------------------------------------------------------------

fn file_name(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path).trim();
    path.rsplit('/').next().unwrap_or(path)
}

fn file_link(name: &str, alt: &str) -> String {
    let alt = alt.trim();
    if alt.is_empty() {
        format!("[[File:{name}|thumb]]")
    } else {
        format!("[[File:{name}|thumb|{alt}]]")
    }
}

/// Rewrite markdown, wiki and HTML images to `[[File:name|thumb|alt]]`.
fn rewrite_images(text: &str) -> String {
    static WIKI_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\[\[(?:File|Image):([^\]|]+)(?:\|([^\]]*))?\]\]").expect("valid regex")
    });
    static HTML_IMG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<img\s+([^>]*?)/?>").expect("valid regex"));
    static IMG_ATTR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\b(src|alt)\s*=\s*"([^"]*)""#).expect("valid regex"));
    static P_WRAPPED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<p>\s*(\[\[File:[^\]]*\]\])\s*</p>").expect("valid regex")
    });

    let result = replace_outside_code(text, &MD_IMAGE_RE, |caps| {
        let name = file_name(&caps[2]);
        if name.is_empty() {
            return caps[0].to_string();
        }
        file_link(name, &caps[1])
    });

    let result = replace_outside_code(&result, &WIKI_FILE_RE, |caps| {
        let name = file_name(&caps[1]);
        if name.is_empty() {
            return caps[0].to_string();
        }
        let mut parts: Vec<&str> = caps
            .get(2)
            .map(|m| m.as_str().split('|').map(str::trim).filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        let framed = parts
            .iter()
            .any(|p| matches!(*p, "thumb" | "thumbnail" | "frame" | "frameless"));
        if !framed {
            parts.insert(0, "thumb");
        }
        format!("[[File:{name}|{}]]", parts.join("|"))
    });

    let result = replace_outside_code(&result, &HTML_IMG_RE, |caps| {
        let attrs: BTreeMap<&str, &str> = IMG_ATTR_RE
            .captures_iter(caps.get(1).map_or("", |m| m.as_str()))
            .filter_map(|a| Some((a.get(1)?.as_str(), a.get(2)?.as_str())))
            .collect();
        match attrs.get("src").map(|src| file_name(src)) {
            Some(name) if !name.is_empty() => file_link(name, attrs.get("alt").unwrap_or(&"")),
            _ => caps[0].to_string(),
        }
    });

    replace_outside_code(&result, &P_WRAPPED_RE, |caps| caps[1].to_string())
}

// ---------------------------------------------------------------------------
// Pass 5: Code blocks
// ---------------------------------------------------------------------------

static HIGHLIGHT_LANG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<syntaxhighlight\s+lang\s*=\s*"([^"]*)"\s*>"#).expect("valid regex")
});

/// Canonical language for a hint; unknown hints fall back to plain text.
fn canonical_hint(hint: &str, ruleset: &Ruleset, warnings: &mut Vec<UnitWarning>) -> String {
    // Class-style hints: `language-js`, `lang-py`, `{.bash}`.
    let cleaned = hint
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim_start_matches('.');
    let cleaned = ["language-", "lang-", "highlight-"]
        .iter()
        .find_map(|p| cleaned.strip_prefix(p))
        .unwrap_or(cleaned);

    if cleaned.is_empty() {
        return PLAIN_TEXT_LANGUAGE.to_string();
    }
    match ruleset.canonical_language(cleaned) {
        Some(lang) => lang.to_string(),
        None => {
            warnings.push(UnitWarning::new(
                WarningKind::StrippedCodeHint,
                format!("unrecognized code hint `{hint}` replaced with `{PLAIN_TEXT_LANGUAGE}`"),
            ));
            PLAIN_TEXT_LANGUAGE.to_string()
        }
    }
}

/// Turn fences into `<syntaxhighlight>` blocks and normalize existing hints.
fn repair_code_blocks(text: &str, ruleset: &Ruleset, warnings: &mut Vec<UnitWarning>) -> String {
    // Existing tags first, skipping anything inside a fence body.
    let fence_spans: Vec<_> = scan_fences(text).into_iter().map(|f| f.span).collect();
    let mut retagged = String::with_capacity(text.len());
    let mut last = 0;
    for caps in HIGHLIGHT_LANG_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if in_code(&fence_spans, whole.start()) {
            continue;
        }
        let lang = canonical_hint(&caps[1], ruleset, warnings);
        retagged.push_str(&text[last..whole.start()]);
        retagged.push_str(&format!("<syntaxhighlight lang=\"{lang}\">"));
        last = whole.end();
    }
    retagged.push_str(&text[last..]);
    let text = retagged;

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for fence in scan_fences(&text) {
        out.push_str(&text[last..fence.span.start]);
        let original = &text[fence.span.clone()];
        let rewrite = if fence.terminated {
            let lang = canonical_hint(&fence.hint, ruleset, warnings);
            let block = format!(
                "<syntaxhighlight lang=\"{lang}\">\n{}</syntaxhighlight>",
                &text[fence.body.clone()]
            );
            Rewrite::Converted(keep_newline(original, block))
        } else {
            Rewrite::passed_through(
                original,
                format!("code fence `{}` is never closed", fence.hint),
            )
        };
        out.push_str(&rewrite.settle(WarningKind::UnterminatedCodeFence, warnings));
        last = fence.span.end;
    }
    out.push_str(&text[last..]);
    highlight_pre_blocks(&out, ruleset)
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Turn `<pre>` blocks that read as code into `<syntaxhighlight>` with a
/// guessed language. Prose and blocks holding wiki markup stay as they are.
fn highlight_pre_blocks(text: &str, ruleset: &Ruleset) -> String {
    replace_outside_code(text, &PRE_RE, |caps| {
        let inner = decode_entities(&caps[1]);
        let wiki_markup = ["[[File:", "{{", "!["].iter().any(|m| inner.contains(m));
        if wiki_markup || !looks_like_code(&inner) {
            return caps[0].to_string();
        }
        let lang = ruleset
            .canonical_language(guess_language(&inner))
            .unwrap_or(PLAIN_TEXT_LANGUAGE);
        format!(
            "<syntaxhighlight lang=\"{lang}\">\n{}\n</syntaxhighlight>",
            inner.trim_matches('\n')
        )
    })
}

// ---------------------------------------------------------------------------
// Pass 6: Links
// ---------------------------------------------------------------------------

static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([^\[\]]+)\]\(\s*<?([^()\s<>]+)>?(?:\s+"[^"]*")?\s*\)"#).expect("valid regex")
});

pub(crate) static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]|]+)(\|[^\[\]]*)?\]\]").expect("valid regex"));

fn split_anchor(href: &str) -> (&str, String) {
    match href.split_once('#') {
        Some((path, anchor)) => (path, format!("#{}", wiki_anchor(anchor))),
        None => (href, String::new()),
    }
}

/// Rewrite one markdown link `[text](href)`.
pub fn rewrite_markdown_link(
    text: &str,
    href: &str,
    original: &str,
    ctx: &NormalizeContext<'_>,
) -> Rewrite {
    if is_external(href) {
        return Rewrite::Converted(format!("[{href} {text}]"));
    }
    if let Some(anchor) = href.strip_prefix('#') {
        return Rewrite::Converted(format!("[[#{}|{text}]]", wiki_anchor(anchor)));
    }

    let (path, anchor) = split_anchor(href);
    match ctx.resolver.resolve(path, Some(ctx.source_path)) {
        Some(target) => Rewrite::Converted(format!("[[{target}{anchor}|{text}]]")),
        None => Rewrite::passed_through(original, format!("unresolved link `{href}`")),
    }
}

fn rewrite_wiki_link(caps: &Captures<'_>, ctx: &NormalizeContext<'_>) -> Rewrite {
    let original = &caps[0];
    let href = caps[1].trim();
    if is_special_wiki_target(href) {
        return Rewrite::Converted(original.to_string());
    }

    let (path, anchor) = split_anchor(href);
    let path = path.trim();
    if ctx.resolver.is_target(path) {
        return Rewrite::Converted(original.to_string());
    }

    let rest = caps.get(2).map_or("", |m| m.as_str());
    match ctx.resolver.resolve(path, Some(ctx.source_path)) {
        Some(target) => Rewrite::Converted(format!("[[{target}{anchor}{rest}]]")),
        None => Rewrite::passed_through(original, format!("unresolved link `{href}`")),
    }
}

fn rewrite_links(text: &str, ctx: &NormalizeContext<'_>, warnings: &mut Vec<UnitWarning>) -> String {
    let result = replace_outside_code(text, &MD_LINK_RE, |caps| {
        let original = &caps[0];
        let Some(whole) = caps.get(0) else {
            return original.to_string();
        };
        if text[..whole.start()].ends_with('!') {
            return original.to_string();
        }
        rewrite_markdown_link(&caps[1], &caps[2], original, ctx)
            .settle(WarningKind::UnresolvedLink, warnings)
    });

    replace_outside_code(&result, &WIKI_LINK_RE, |caps| {
        rewrite_wiki_link(caps, ctx).settle(WarningKind::UnresolvedLink, warnings)
    })
}

// ---------------------------------------------------------------------------
// Pass 7: Whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace outside code; end with exactly one newline.
fn normalize_whitespace(text: &str) -> String {
    static TRAILING_WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]+(\r?\n)").expect("valid regex"));

    let trimmed = map_prose(text, |prose| TRAILING_WS_RE.replace_all(prose, "$1").into_owned());
    let trimmed = trimmed.trim_end();
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
