//! Shared types, error model, and configuration for wikimig.
//!
//! This crate is the foundation depended on by all other wikimig crates.
//! It provides:
//! - [`MigrationError`], the unified error type
//! - Domain types ([`DocumentUnit`], [`ScoreReport`], [`Points`], [`UnitStatus`])
//! - Configuration ([`PipelineConfig`], the compiled [`Ruleset`], config loading)
//! - [`write_atomic`] for every file the tools write

pub mod config;
pub mod error;
pub mod fs;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    Band, CrossLinkCurve, LegacyToken, PLAIN_TEXT_LANGUAGE, PipelineConfig, Ruleset, UrlConvention,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{MigrationError, Result};
pub use fs::write_atomic;
pub use types::{
    Criterion, CriterionScore, DocumentUnit, Frontmatter, LinkProposal, Points, Role, ScoreReport,
    UnitStatus, UnitWarning, WarningKind,
};
