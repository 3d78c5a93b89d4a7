//! Cross-link graph: roles, related links, orphans and link proposals.
//!
//! The graph is built once over the whole corpus after normalization, since
//! hub classification needs every unit's declarations. Proposal and commit
//! are separate pure steps; nothing here touches unit markup.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, instrument};

use wikimig_markdown::{INDEX_STEMS, LinkResolver, wiki_link_targets};
use wikimig_shared::{DocumentUnit, LinkProposal, Role, Ruleset, UnitWarning, WarningKind};

// ---------------------------------------------------------------------------
// Graph types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EdgeKind {
    /// Declared in frontmatter or linked from the body.
    Related,
    /// Directory index to a page in its directory.
    Hierarchy,
}

/// A directed edge between two page names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

impl Edge {
    fn new(from: &str, to: &str, kind: EdgeKind) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        }
    }
}

/// Page-level link graph over the active units of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkGraph {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<Edge>,
    /// Related edges whose target is not a node.
    pub dangling: Vec<Edge>,
    /// Nodes with no inbound and no outbound edges.
    pub orphans: Vec<String>,
}

impl LinkGraph {
    /// Add a related edge between two existing nodes.
    pub fn insert_related(&mut self, from: &str, to: &str) -> bool {
        if from == to || !self.nodes.contains(from) || !self.nodes.contains(to) {
            return false;
        }
        self.edges.insert(Edge::new(from, to, EdgeKind::Related))
    }

    /// Recompute the orphan list from the current edge set.
    pub fn refresh_orphans(&mut self) {
        let mut touched: BTreeSet<&str> = BTreeSet::new();
        for edge in &self.edges {
            touched.insert(edge.from.as_str());
            touched.insert(edge.to.as_str());
        }
        self.orphans = self
            .nodes
            .iter()
            .filter(|n| !touched.contains(n.as_str()))
            .cloned()
            .collect();
    }

    pub fn outbound(&self, node: &str) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from == node)
    }

    pub fn inbound(&self, node: &str) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.to == node)
    }
}

/// Result of [`build_graph`]. Per-unit maps are keyed by source path.
#[derive(Debug, Clone, Default)]
pub struct GraphBuild {
    pub graph: LinkGraph,
    pub roles: BTreeMap<String, Role>,
    pub related: BTreeMap<String, Vec<String>>,
    pub warnings: BTreeMap<String, Vec<UnitWarning>>,
}

impl GraphBuild {
    /// Write roles, related links and graph warnings onto the units.
    pub fn apply(self, units: &mut [DocumentUnit]) -> LinkGraph {
        let GraphBuild {
            graph,
            roles,
            mut related,
            mut warnings,
        } = self;
        for unit in units.iter_mut() {
            if let Some(role) = roles.get(&unit.source_path) {
                unit.role = *role;
            }
            if let Some(links) = related.remove(&unit.source_path) {
                unit.related_links = links;
            }
            if let Some(extra) = warnings.remove(&unit.source_path) {
                unit.warnings.extend(extra);
            }
        }
        graph
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Directory part of a source path (`""` at the root).
pub(crate) fn dir_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn stem_of(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file)
        .to_lowercase()
}

/// Whether the source path is a directory index page.
pub fn is_directory_index(path: &str) -> bool {
    INDEX_STEMS.contains(&stem_of(path).as_str())
}

fn segments(dir: &str) -> Vec<&str> {
    dir.split('/').filter(|s| !s.is_empty()).collect()
}

/// Steps up and down the directory tree between two source paths.
pub(crate) fn depth_distance(a: &str, b: &str) -> usize {
    let a = segments(dir_of(a));
    let b = segments(dir_of(b));
    let common = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    (a.len() - common) + (b.len() - common)
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Related targets a unit declares: frontmatter `related` entries, then body
/// wiki links. Self-links removed, first occurrence kept.
pub(crate) fn declared_links(unit: &DocumentUnit, resolver: &LinkResolver) -> Vec<String> {
    let mut declared: Vec<String> = Vec::new();
    let from_header = unit.frontmatter.related.iter().map(|entry| {
        resolver
            .resolve(entry, Some(&unit.source_path))
            .map(str::to_string)
            .unwrap_or_else(|| entry.trim().to_string())
    });
    let body = unit
        .normalized_markup
        .as_deref()
        .unwrap_or(&unit.raw_markup);
    for target in from_header.chain(wiki_link_targets(body)) {
        if target.is_empty() || target == unit.target_page_name || declared.contains(&target) {
            continue;
        }
        declared.push(target);
    }
    declared
}

/// Build the link graph over all active units.
///
/// A unit is a `Hub` when it is a directory index, or when more than
/// `hub_inbound_threshold` other units name it as parent or related target.
/// Related links are cut to the role's band maximum.
#[instrument(skip_all, fields(units = units.len()))]
pub fn build_graph(units: &[DocumentUnit], ruleset: &Ruleset, resolver: &LinkResolver) -> GraphBuild {
    let active: Vec<&DocumentUnit> = units.iter().filter(|u| u.status.is_active()).collect();

    let nodes: BTreeSet<String> = active.iter().map(|u| u.target_page_name.clone()).collect();

    let mut index_of: BTreeMap<&str, &DocumentUnit> = BTreeMap::new();
    for unit in &active {
        if is_directory_index(&unit.source_path) {
            index_of.entry(dir_of(&unit.source_path)).or_insert(*unit);
        }
    }

    let parent_of = |unit: &DocumentUnit| -> Option<String> {
        let dir = dir_of(&unit.source_path);
        let parent_dir = if is_directory_index(&unit.source_path) {
            if dir.is_empty() {
                return None;
            }
            dir_of(dir)
        } else {
            dir
        };
        index_of
            .get(parent_dir)
            .filter(|p| p.target_page_name != unit.target_page_name)
            .map(|p| p.target_page_name.clone())
    };

    let mut graph = LinkGraph {
        nodes,
        ..Default::default()
    };
    let mut declarers: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    let mut declared: Vec<(&DocumentUnit, Vec<String>)> = Vec::with_capacity(active.len());
    let mut dangling: BTreeSet<Edge> = BTreeSet::new();

    for unit in active.iter().copied() {
        let links = declared_links(unit, resolver);
        let from = unit.target_page_name.as_str();

        if let Some(parent) = parent_of(unit) {
            graph
                .edges
                .insert(Edge::new(&parent, from, EdgeKind::Hierarchy));
            declarers
                .entry(parent)
                .or_default()
                .insert(unit.source_path.as_str());
        }
        for target in &links {
            if graph.nodes.contains(target) {
                declarers
                    .entry(target.clone())
                    .or_default()
                    .insert(unit.source_path.as_str());
            } else {
                dangling.insert(Edge::new(from, target, EdgeKind::Related));
            }
        }
        declared.push((unit, links));
    }

    let mut build = GraphBuild::default();
    for (unit, mut links) in declared {
        let inbound = declarers
            .get(&unit.target_page_name)
            .map(|d| d.iter().filter(|s| **s != unit.source_path).count())
            .unwrap_or(0);
        let role = if is_directory_index(&unit.source_path)
            || inbound > ruleset.links.hub_inbound_threshold
        {
            Role::Hub
        } else {
            Role::Leaf
        };

        let max = ruleset.links.band(role).max;
        if links.len() > max {
            build
                .warnings
                .entry(unit.source_path.clone())
                .or_default()
                .push(UnitWarning::new(
                    WarningKind::RelatedLinksTruncated,
                    format!(
                        "{} related links cut to {max} for a {role} page",
                        links.len()
                    ),
                ));
            links.truncate(max);
        }

        for target in &links {
            graph.insert_related(&unit.target_page_name, target);
        }
        debug!(source = %unit.source_path, %role, inbound, related = links.len(), "classified");
        build.roles.insert(unit.source_path.clone(), role);
        build.related.insert(unit.source_path.clone(), links);
    }

    graph.dangling = dangling.into_iter().collect();
    graph.refresh_orphans();
    info!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        dangling = graph.dangling.len(),
        orphans = graph.orphans.len(),
        "link graph built"
    );
    build.graph = graph;
    build
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

/// Suggest links for leaves below the band minimum.
///
/// Candidates share the unit's directory or at least one keyword. Ranked by
/// keyword overlap (most first), then directory distance, then page name.
pub fn propose_links(units: &[DocumentUnit], graph: &LinkGraph, ruleset: &Ruleset) -> Vec<LinkProposal> {
    let active: Vec<&DocumentUnit> = units.iter().filter(|u| u.status.is_active()).collect();
    let min = ruleset.links.leaf.min;
    let mut proposals = Vec::new();

    for unit in &active {
        if unit.role != Role::Leaf || unit.related_links.len() >= min {
            continue;
        }
        let need = min - unit.related_links.len();
        let unit_dir = dir_of(&unit.source_path);

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut candidates: Vec<LinkProposal> = Vec::new();
        for other in &active {
            let target = other.target_page_name.as_str();
            if target == unit.target_page_name
                || !graph.nodes.contains(target)
                || unit.related_links.iter().any(|l| l == target)
                || seen.contains(target)
            {
                continue;
            }
            let same_directory = dir_of(&other.source_path) == unit_dir;
            let keyword_overlap = unit
                .frontmatter
                .keywords
                .iter()
                .filter(|k| other.frontmatter.keywords.contains(k))
                .count();
            if !same_directory && keyword_overlap == 0 {
                continue;
            }
            seen.insert(target);
            candidates.push(LinkProposal {
                source_path: unit.source_path.clone(),
                target: target.to_string(),
                keyword_overlap,
                depth_distance: depth_distance(&unit.source_path, &other.source_path),
                same_directory,
            });
        }

        candidates.sort_by(|a, b| {
            (Reverse(a.keyword_overlap), a.depth_distance, &a.target).cmp(&(
                Reverse(b.keyword_overlap),
                b.depth_distance,
                &b.target,
            ))
        });
        candidates.truncate(need);
        proposals.extend(candidates);
    }

    debug!(proposals = proposals.len(), "link proposals computed");
    proposals
}

/// Return copies of `units` with `accepted` proposals applied.
///
/// Accepted targets are appended to `related_links` without duplicates and
/// within the role's band maximum, and leave the unit's pending proposals.
pub fn commit_links(units: &[DocumentUnit], accepted: &[LinkProposal], ruleset: &Ruleset) -> Vec<DocumentUnit> {
    let mut by_source: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for proposal in accepted {
        by_source
            .entry(proposal.source_path.as_str())
            .or_default()
            .push(proposal.target.as_str());
    }

    units
        .iter()
        .map(|unit| {
            let mut unit = unit.clone();
            let Some(targets) = by_source.get(unit.source_path.as_str()) else {
                return unit;
            };
            let max = ruleset.links.band(unit.role).max;
            for target in targets {
                if unit.related_links.len() >= max {
                    break;
                }
                if *target != unit.target_page_name
                    && !unit.related_links.iter().any(|l| l == target)
                {
                    unit.related_links.push((*target).to_string());
                }
            }
            let committed = unit.related_links.clone();
            unit.proposed_links.retain(|p| !committed.contains(&p.target));
            unit
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikimig_shared::{PipelineConfig, UnitStatus};

    fn ruleset() -> Ruleset {
        Ruleset::compile(&PipelineConfig::default()).expect("ruleset")
    }

    fn unit(source: &str, target: &str, body: &str, keywords: &[&str]) -> DocumentUnit {
        let mut unit = DocumentUnit::new(source, target, body);
        unit.normalized_markup = Some(body.to_string());
        unit.frontmatter.keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        unit.status = UnitStatus::Converted;
        unit
    }

    fn resolver(units: &[DocumentUnit]) -> LinkResolver {
        let entries: Vec<(&str, &str)> = units
            .iter()
            .map(|u| (u.source_path.as_str(), u.target_page_name.as_str()))
            .collect();
        LinkResolver::new(&entries, &[])
    }

    fn build(units: &mut Vec<DocumentUnit>) -> LinkGraph {
        let resolver = resolver(units);
        build_graph(units, &ruleset(), &resolver).apply(units)
    }

    #[test]
    fn directory_index_is_hub_and_parents_its_pages() {
        let mut units = vec![
            unit("security/index.md", "Security", "Overview.", &[]),
            unit("security/jwt.md", "Security/Jwt", "See [[Security/Oauth]].", &[]),
            unit("security/oauth.md", "Security/Oauth", "Body.", &[]),
        ];
        let graph = build(&mut units);

        assert_eq!(units[0].role, Role::Hub);
        assert_eq!(units[1].role, Role::Leaf);
        assert_eq!(units[1].related_links, vec!["Security/Oauth"]);
        assert!(graph.edges.contains(&Edge::new(
            "Security",
            "Security/Jwt",
            EdgeKind::Hierarchy
        )));
        assert!(graph.edges.contains(&Edge::new(
            "Security/Jwt",
            "Security/Oauth",
            EdgeKind::Related
        )));
        assert!(graph.orphans.is_empty());
        assert!(graph.dangling.is_empty());
    }

    #[test]
    fn frontmatter_related_resolves_source_paths() {
        let mut units = vec![
            unit("guides/a.md", "A", "", &[]),
            unit("guides/b.md", "B", "", &[]),
        ];
        units[0].frontmatter.related = vec!["./b.md".into(), "A".into()];
        build(&mut units);
        assert_eq!(units[0].related_links, vec!["B"]);
    }

    #[test]
    fn many_inbound_declarers_make_a_hub() {
        let mut units = vec![unit("concepts/core.md", "Core", "", &[])];
        for i in 0..9 {
            units.push(unit(
                &format!("pages/p{i}.md"),
                &format!("P{i}"),
                "Uses [[Core]].",
                &[],
            ));
        }
        build(&mut units);
        assert_eq!(units[0].role, Role::Hub);

        units.truncate(9);
        build(&mut units);
        assert_eq!(units[0].role, Role::Leaf);
    }

    #[test]
    fn dangling_and_orphans_are_recorded() {
        let mut units = vec![
            unit("a.md", "A", "Link to [[Missing_Page]].", &[]),
            unit("b.md", "B", "Alone.", &[]),
        ];
        let graph = build(&mut units);

        assert_eq!(
            graph.dangling,
            vec![Edge::new("A", "Missing_Page", EdgeKind::Related)]
        );
        assert_eq!(graph.orphans, vec!["A", "B"]);
        assert_eq!(units[0].related_links, vec!["Missing_Page"]);
    }

    #[test]
    fn skipped_units_are_not_nodes() {
        let mut units = vec![
            unit("a.md", "A", "See [[Draft]].", &[]),
            unit("draft.md", "Draft", "", &[]),
        ];
        units[1].status = UnitStatus::SkipEmptyDraft;
        let graph = build(&mut units);
        assert!(!graph.nodes.contains("Draft"));
        assert_eq!(graph.dangling.len(), 1);
    }

    #[test]
    fn leaf_related_links_are_truncated_with_warning() {
        let body: String = (0..7).map(|i| format!("[[T{i}]] ")).collect();
        let mut units = vec![unit("x/leaf.md", "Leaf", &body, &[])];
        for i in 0..7 {
            units.push(unit(&format!("t/t{i}.md"), &format!("T{i}"), "", &[]));
        }
        build(&mut units);

        assert_eq!(units[0].related_links.len(), 5);
        assert!(
            units[0]
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::RelatedLinksTruncated)
        );
    }

    #[test]
    fn proposals_rank_by_overlap_then_distance_then_name() {
        let mut units = vec![
            unit("docs/security/jwt.md", "Jwt", "", &["jwt", "auth"]),
            unit("docs/security/saml.md", "Saml", "", &[]),
            unit("docs/security/ldap.md", "Ldap", "", &["auth"]),
            unit("docs/other/tokens.md", "Tokens", "", &["jwt", "auth"]),
            unit("docs/other/unrelated.md", "Unrelated", "", &["docker"]),
        ];
        let graph = build(&mut units);
        let proposals = propose_links(&units, &graph, &ruleset());

        let for_jwt: Vec<(&str, usize)> = proposals
            .iter()
            .filter(|p| p.source_path == "docs/security/jwt.md")
            .map(|p| (p.target.as_str(), p.keyword_overlap))
            .collect();
        assert_eq!(for_jwt, vec![("Tokens", 2), ("Ldap", 1), ("Saml", 0)]);
    }

    #[test]
    fn proposals_fill_only_the_shortfall() {
        let mut units = vec![
            unit("d/a.md", "A", "[[B]] [[C]]", &[]),
            unit("d/b.md", "B", "", &[]),
            unit("d/c.md", "C", "", &[]),
            unit("d/e.md", "E", "", &[]),
            unit("d/f.md", "F", "", &[]),
        ];
        let graph = build(&mut units);
        let proposals = propose_links(&units, &graph, &ruleset());
        let for_a: Vec<&str> = proposals
            .iter()
            .filter(|p| p.source_path == "d/a.md")
            .map(|p| p.target.as_str())
            .collect();
        assert_eq!(for_a, vec!["E"]);
    }

    #[test]
    fn commit_appends_without_mutating_input() {
        let mut units = vec![
            unit("d/a.md", "A", "", &[]),
            unit("d/b.md", "B", "", &[]),
        ];
        let graph = build(&mut units);
        let proposals = propose_links(&units, &graph, &ruleset());
        units[0].proposed_links = proposals
            .iter()
            .filter(|p| p.source_path == "d/a.md")
            .cloned()
            .collect();

        let committed = commit_links(&units, &proposals, &ruleset());
        assert!(units[0].related_links.is_empty());
        assert_eq!(committed[0].related_links, vec!["B"]);
        assert!(committed[0].proposed_links.is_empty());
        assert_eq!(committed[1].related_links, vec!["A"]);
    }

    #[test]
    fn depth_distance_counts_tree_steps() {
        assert_eq!(depth_distance("a/b/x.md", "a/b/y.md"), 0);
        assert_eq!(depth_distance("a/b/x.md", "a/c/y.md"), 2);
        assert_eq!(depth_distance("x.md", "a/b/y.md"), 2);
    }
}
