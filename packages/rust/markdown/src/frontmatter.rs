//! Document header extraction.
//!
//! Accepts a YAML header between `---` lines or a Hugo TOML header between
//! `+++` lines. A broken header never fails the document: whatever can be
//! scanned line by line is kept and a `MalformedFrontmatter` warning is
//! attached.

use serde_json::{Map, Value};
use tracing::debug;

use wikimig_shared::{Frontmatter, UnitWarning, WarningKind};

/// A document split into header metadata and body.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub frontmatter: Frontmatter,
    pub body: String,
    pub warnings: Vec<UnitWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderFormat {
    Yaml,
    Toml,
}

impl HeaderFormat {
    fn delimiter(self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Split `text` into frontmatter and body.
pub fn parse_frontmatter(text: &str) -> ParsedDocument {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some((format, header_start)) = detect_header(text) else {
        return ParsedDocument {
            body: text.to_string(),
            ..Default::default()
        };
    };

    let delimiter = format.delimiter();
    let mut cursor = header_start;
    let mut closing = None;
    while cursor < text.len() {
        let line_end = next_line_end(text, cursor);
        if text[cursor..line_end].trim_end() == delimiter {
            closing = Some((cursor, line_end));
            break;
        }
        cursor = line_end;
    }

    let mut warnings = Vec::new();
    let Some((header_end, body_start)) = closing else {
        // Unterminated: keep the leading lines that still look like header.
        let (map, consumed) = scan_header_lines(&text[header_start..], format);
        warnings.push(UnitWarning::new(
            WarningKind::MalformedFrontmatter,
            format!("header opened with `{delimiter}` is never closed"),
        ));
        return ParsedDocument {
            frontmatter: frontmatter_from_map(map),
            body: text[header_start + consumed..].to_string(),
            warnings,
        };
    };

    let header = &text[header_start..header_end];
    let body = text[body_start..].to_string();

    let frontmatter = match parse_header(header, format) {
        Ok(map) => frontmatter_from_map(map),
        Err(reason) => {
            debug!(%reason, "frontmatter failed to parse, scanning lines");
            warnings.push(UnitWarning::new(
                WarningKind::MalformedFrontmatter,
                format!("header could not be parsed: {reason}"),
            ));
            frontmatter_from_map(scan_header_lines(header, format).0)
        }
    };

    ParsedDocument {
        frontmatter,
        body,
        warnings,
    }
}

/// Identify the header format from the first line; returns the offset after it.
fn detect_header(text: &str) -> Option<(HeaderFormat, usize)> {
    let first_end = next_line_end(text, 0);
    let first = text[..first_end].trim_end();
    let format = match first {
        "---" => HeaderFormat::Yaml,
        "+++" => HeaderFormat::Toml,
        _ => return None,
    };
    Some((format, first_end))
}

/// Byte offset just past the newline ending the line at `start`.
fn next_line_end(text: &str, start: usize) -> usize {
    text[start..]
        .find('\n')
        .map(|i| start + i + 1)
        .unwrap_or(text.len())
}

fn parse_header(header: &str, format: HeaderFormat) -> Result<Map<String, Value>, String> {
    match format {
        HeaderFormat::Yaml => {
            let value: serde_yaml::Value =
                serde_yaml::from_str(header).map_err(|e| e.to_string())?;
            match value {
                serde_yaml::Value::Null => Ok(Map::new()),
                serde_yaml::Value::Mapping(_) => match serde_json::to_value(&value) {
                    Ok(Value::Object(map)) => Ok(map),
                    Ok(_) => Err("header is not a mapping".into()),
                    Err(e) => Err(e.to_string()),
                },
                _ => Err("header is not a mapping".into()),
            }
        }
        HeaderFormat::Toml => {
            let table: toml::Table = toml::from_str(header).map_err(|e| e.to_string())?;
            Ok(table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect())
        }
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Best-effort scan of `key: value` / `key = value` / `- item` lines.
///
/// Stops at the first line that fits none of those shapes. Returns the
/// recovered keys and the number of bytes consumed.
fn scan_header_lines(header: &str, format: HeaderFormat) -> (Map<String, Value>, usize) {
    let separator = match format {
        HeaderFormat::Yaml => ':',
        HeaderFormat::Toml => '=',
    };

    let mut map = Map::new();
    let mut last_key: Option<String> = None;
    let mut consumed = 0;

    for line in header.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            consumed += line.len();
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            let Some(key) = &last_key else { break };
            let entry = map
                .entry(key.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(items) = entry {
                items.push(Value::String(unquote(item).to_string()));
            }
            consumed += line.len();
            continue;
        }

        let Some((key, value)) = trimmed.split_once(separator) else {
            break;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            break;
        }
        let value = value.trim();
        let value = if value.is_empty() {
            Value::Null
        } else {
            Value::String(unquote(value).to_string())
        };
        map.insert(key.to_string(), value);
        last_key = Some(key.to_string());
        consumed += line.len();
    }

    (map, consumed)
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

fn frontmatter_from_map(mut map: Map<String, Value>) -> Frontmatter {
    let mut fm = Frontmatter {
        title: map.remove("title").and_then(scalar_string),
        id: map.remove("id").and_then(scalar_string),
        description: map.remove("description").and_then(scalar_string),
        keywords: map.remove("keywords").map(normalize_keywords).unwrap_or_default(),
        sidebar_position: map.remove("sidebar_position").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }),
        related: Vec::new(),
        difficulty: map.remove("difficulty").and_then(scalar_string),
        extra: Default::default(),
    };

    for key in ["related", "related_pages"] {
        if let Some(value) = map.remove(key) {
            for entry in string_list(value) {
                if !fm.related.contains(&entry) {
                    fm.related.push(entry);
                }
            }
        }
    }

    fm.extra = map.into_iter().collect();
    fm
}

fn scalar_string(value: Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

/// Trimmed, lowercase, deduplicated in first-seen order.
fn normalize_keywords(value: Value) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in string_list(value) {
        let keyword = keyword.to_lowercase();
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_header_is_parsed() {
        let doc = "---\ntitle: JWT Auth\ndescription: Secure APIs\nkeywords: [JWT, Security, jwt]\nsidebar_position: 3\n---\n# Body\n";
        let parsed = parse_frontmatter(doc);
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.frontmatter.title.as_deref(), Some("JWT Auth"));
        assert_eq!(parsed.frontmatter.keywords, vec!["jwt", "security"]);
        assert_eq!(parsed.frontmatter.sidebar_position, Some(3));
        assert_eq!(parsed.body, "# Body\n");
    }

    #[test]
    fn toml_header_is_parsed() {
        let doc = "+++\ntitle = \"Salesforce\"\ndate = 2024-01-02\nkeywords = \"crm, salesforce\"\n+++\nText\n";
        let parsed = parse_frontmatter(doc);
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.frontmatter.title.as_deref(), Some("Salesforce"));
        assert_eq!(parsed.frontmatter.keywords, vec!["crm", "salesforce"]);
        assert_eq!(
            parsed.frontmatter.extra.get("date"),
            Some(&Value::String("2024-01-02".into()))
        );
        assert_eq!(parsed.body, "Text\n");
    }

    #[test]
    fn missing_header_keeps_full_text() {
        let parsed = parse_frontmatter("Just text.\n");
        assert!(parsed.frontmatter.is_empty());
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.body, "Just text.\n");
    }

    #[test]
    fn unterminated_header_is_recovered() {
        let doc = "---\ntitle: Half\nkeywords:\n  - docker\nThis is the body.\n";
        let parsed = parse_frontmatter(doc);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].kind, WarningKind::MalformedFrontmatter);
        assert_eq!(parsed.frontmatter.title.as_deref(), Some("Half"));
        assert_eq!(parsed.frontmatter.keywords, vec!["docker"]);
        assert_eq!(parsed.body, "This is the body.\n");
    }

    #[test]
    fn invalid_yaml_falls_back_to_line_scan() {
        let doc = "---\ntitle: Broken: [unclosed\ndescription: still here\n---\nBody\n";
        let parsed = parse_frontmatter(doc);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(
            parsed.frontmatter.description.as_deref(),
            Some("still here")
        );
        assert_eq!(parsed.body, "Body\n");
    }

    #[test]
    fn related_pages_alias_and_extra_keys() {
        let doc = "---\nrelated_pages:\n  - security/jwt.md\nslug: /jwt\n---\n";
        let parsed = parse_frontmatter(doc);
        assert_eq!(parsed.frontmatter.related, vec!["security/jwt.md"]);
        assert!(parsed.frontmatter.extra.contains_key("slug"));
    }
}
