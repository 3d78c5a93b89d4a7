//! Final page markup: title, lead, See also section and category tags.

use std::collections::BTreeMap;

use wikimig_markdown::wiki_link_targets;
use wikimig_shared::{DocumentUnit, Ruleset};

const SEE_ALSO_HEADING: &str = "== See also ==";

/// Target page name → display title, from each unit's header.
pub type PageTitles = BTreeMap<String, String>;

/// Collect the header titles of `units`, keyed by target page name.
pub fn page_titles(units: &[DocumentUnit]) -> PageTitles {
    units
        .iter()
        .filter_map(|u| {
            let title = u.frontmatter.title.as_deref()?.trim();
            (!title.is_empty()).then(|| (u.target_page_name.clone(), title.to_string()))
        })
        .collect()
}

fn header_lines(unit: &DocumentUnit, body: &str, ruleset: &Ruleset) -> Vec<String> {
    let mut lines = Vec::new();
    let frontmatter = &unit.frontmatter;
    if ruleset.render.title_heading {
        if let Some(title) = frontmatter.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let heading = format!("= {title} =");
            if !body.trim_start().starts_with(&heading) {
                lines.push(heading);
            }
        }
    }
    if ruleset.render.description_lead {
        if let Some(description) = frontmatter
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            lines.push(format!("'''{description}'''"));
            lines.push(String::new());
        }
    }
    lines
}

fn see_also_entry(target: &str, titles: &PageTitles) -> String {
    match titles.get(target) {
        Some(title) if title != target => format!("* [[{target}|{title}]]"),
        _ => format!("* [[{target}]]"),
    }
}

/// Render the output markup for a unit from its normalized markup.
///
/// The header title and description lead the page when enabled. Related
/// links the body does not already link to go into a See also section,
/// labelled with the linked page's title; category tags not already
/// present are appended last.
pub fn render_output(unit: &DocumentUnit, titles: &PageTitles, ruleset: &Ruleset) -> String {
    let body = unit
        .normalized_markup
        .as_deref()
        .unwrap_or(&unit.raw_markup);
    let linked = wiki_link_targets(body);

    let mut out = String::new();
    let header = header_lines(unit, body, ruleset);
    if !header.is_empty() {
        out.push_str(&header.join("\n"));
        out.push('\n');
    }
    out.push_str(body.trim_end());

    let see_also: Vec<String> = unit
        .related_links
        .iter()
        .filter(|t| !linked.contains(t))
        .map(|t| see_also_entry(t, titles))
        .collect();
    if !see_also.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(SEE_ALSO_HEADING);
        for entry in see_also {
            out.push('\n');
            out.push_str(&entry);
        }
    }

    let tags: Vec<String> = unit
        .categories
        .iter()
        .map(|c| format!("[[Category:{c}]]"))
        .filter(|tag| !body.contains(tag.as_str()))
        .collect();
    if !tags.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&tags.join("\n"));
    }

    out.push('\n');
    out
}
