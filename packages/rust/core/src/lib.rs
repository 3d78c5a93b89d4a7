//! Core pipeline orchestration and domain logic for wikimig.
//!
//! This crate ties together normalization, category assignment, the
//! cross-link graph, scoring and validation into a migration run
//! (`run_pipeline`), and writes the run's outputs (`emit_outputs`).

pub mod categories;
pub mod emit;
pub mod graph;
pub mod pipeline;
pub mod render;
pub mod scoring;
pub mod validator;

pub use categories::{CategoryAssignment, assign_categories};
pub use emit::{EmitSummary, RunManifest, emit_outputs, page_file_for};
pub use graph::{Edge, EdgeKind, GraphBuild, LinkGraph, build_graph, commit_links, propose_links};
pub use pipeline::{
    CancelToken, ProgressReporter, RunContext, RunInputs, RunOutcome, SilentProgress, UnitPlan,
    plan_corpus, prepare_unit, run_pipeline, score_document,
};
pub use render::{PageTitles, page_titles, render_output};
pub use scoring::{LegacyHit, legacy_hits, score_unit};
pub use validator::{Issue, IssueKind, ReportRow, RunSummary, ScoreStats, ValidationReport, validate};
