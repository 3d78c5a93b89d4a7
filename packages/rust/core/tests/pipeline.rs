//! End-to-end runs over small corpora written to temp directories.

use std::path::Path;

use wikimig_core::{
    CancelToken, IssueKind, RunContext, RunInputs, RunOutcome, SilentProgress, emit_outputs,
    run_pipeline,
};
use wikimig_inventory::InventoryStore;
use wikimig_shared::{
    Criterion, MigrationError, PipelineConfig, Points, Role, Ruleset, UnitStatus,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, content).expect("write");
}

fn filler(words: usize) -> String {
    (0..words)
        .map(|i| format!("lorem{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn context(config: &PipelineConfig, workers: usize) -> RunContext {
    let mut ctx = RunContext::new(Ruleset::compile(config).expect("ruleset"));
    ctx.workers = workers;
    ctx
}

fn inputs(root: &Path) -> RunInputs {
    RunInputs {
        source_dir: root.to_path_buf(),
        converted_dir: None,
        inventory: None,
    }
}

async fn run(root: &Path) -> RunOutcome {
    run_pipeline(
        &inputs(root),
        &context(&PipelineConfig::default(), 2),
        &CancelToken::new(),
        &SilentProgress,
    )
    .await
    .expect("run")
}

fn unit<'a>(outcome: &'a RunOutcome, source: &str) -> &'a wikimig_shared::DocumentUnit {
    outcome
        .units
        .iter()
        .find(|u| u.source_path == source)
        .expect("unit present")
}

#[tokio::test]
async fn two_word_page_needs_expansion_without_blocking() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "notes/short.md", "Two words\n");

    let outcome = run(dir.path()).await;
    let short = unit(&outcome, "notes/short.md");

    assert_eq!(short.status, UnitStatus::NeedsExpansion);
    assert_eq!(short.word_count, 2);
    let score = short.score.as_ref().expect("scored");
    assert_eq!(score.earned(Criterion::WordCount), Points::ZERO);

    assert!(outcome.report.is_publishable());
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|w| w.kind == IssueKind::ScoreBelowThreshold)
    );
}

#[tokio::test]
async fn raised_word_floor_blocks_short_pages() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "notes/short.md", "Two words\n");

    let mut config = PipelineConfig::default();
    config.validation.min_word_count = 10;
    let outcome = run_pipeline(
        &inputs(dir.path()),
        &context(&config, 1),
        &CancelToken::new(),
        &SilentProgress,
    )
    .await
    .expect("run");

    let kinds: Vec<IssueKind> = outcome.report.blockers.iter().map(|b| b.kind).collect();
    assert_eq!(kinds, vec![IssueKind::BelowWordFloor]);
}

#[tokio::test]
async fn target_collision_is_one_blocker_and_withholds_markup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("src");
    write(&root, "alpha/setup.md", "Set things up here.\n");
    write(&root, "beta/setup.md", "Set other things up.\n");

    let outcome = run(&root).await;
    assert_eq!(outcome.report.blockers.len(), 1);
    let blocker = &outcome.report.blockers[0];
    assert_eq!(blocker.kind, IssueKind::TargetCollision);
    assert_eq!(blocker.subject, "Setup");
    assert!(blocker.message.contains("alpha/setup.md"));
    assert!(blocker.message.contains("beta/setup.md"));

    let out = dir.path().join("out");
    let summary = emit_outputs(&out, &outcome, false).expect("emit");
    assert!(summary.markup_withheld);
    assert_eq!(summary.pages_written, 0);
    assert!(!out.join("pages").exists());
    assert!(out.join("report.json").exists());
    assert!(out.join("report.csv").exists());

    let err = emit_outputs(&out, &outcome, true).unwrap_err();
    assert!(matches!(err, MigrationError::Validation { .. }));
    assert!(err.to_string().contains("Setup.wiki"));
    assert!(!out.join("pages").exists());
}

#[tokio::test]
async fn forced_emit_writes_pages_past_other_blockers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("src");
    write(&root, "alpha/setup.md", "ALPHA body.\n");
    write(&root, "beta/install.md", "BETA body.\n");

    let mut config = PipelineConfig::default();
    config.validation.min_word_count = 10;
    let outcome = run_pipeline(
        &inputs(&root),
        &context(&config, 2),
        &CancelToken::new(),
        &SilentProgress,
    )
    .await
    .expect("run");
    assert!(!outcome.report.is_publishable());

    let out = dir.path().join("out");
    let forced = emit_outputs(&out, &outcome, true).expect("forced emit");
    assert_eq!(forced.pages_written, 2);
    assert!(forced.manifest.forced);
    let setup = std::fs::read_to_string(out.join("pages/Setup.wiki")).expect("setup");
    let install = std::fs::read_to_string(out.join("pages/Install.wiki")).expect("install");
    assert!(setup.contains("ALPHA body."));
    assert!(install.contains("BETA body."));
}

fn leaf_corpus(root: &Path) {
    write(
        root,
        "guides/leaf.md",
        &format!(
            "{}\n\nSee [Target](target.md).\n\n```bash\necho hello\n```\n",
            filler(520)
        ),
    );
    write(root, "guides/target.md", "The target page.\n");
}

#[tokio::test]
async fn under_linked_leaf_gets_partial_cross_link_credit() {
    let dir = tempfile::tempdir().expect("tempdir");
    leaf_corpus(dir.path());

    let outcome = run(dir.path()).await;
    let leaf = unit(&outcome, "guides/leaf.md");
    assert_eq!(leaf.role, Role::Leaf);
    assert_eq!(leaf.related_links, vec!["Target"]);
    assert!(leaf.word_count >= 500);

    let score = leaf.score.as_ref().expect("scored");
    assert_eq!(score.earned(Criterion::WordCount), Points::from_whole(20));
    assert_eq!(score.earned(Criterion::CrossLinks), Points::from_whole(5));
    assert_eq!(score.earned(Criterion::CodeExamples), Points::from_whole(15));
    assert_eq!(score.earned(Criterion::StructuredData), Points::ZERO);
    assert_eq!(score.earned(Criterion::VersionCurrency), Points::from_whole(15));
    assert_eq!(score.total, Points::from_whole(55));

    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|w| w.kind == IssueKind::LinkBandViolation && w.subject == "guides/leaf.md")
    );
}

#[tokio::test]
async fn repeated_runs_produce_identical_reports() {
    let dir = tempfile::tempdir().expect("tempdir");
    leaf_corpus(dir.path());
    write(
        dir.path(),
        "security/jwt.md",
        "---\nkeywords: [jwt, docker]\n---\nTokens.\n",
    );

    let config = PipelineConfig::default();
    let mut reports = Vec::new();
    for workers in [1, 4, 2] {
        let outcome = run_pipeline(
            &inputs(dir.path()),
            &context(&config, workers),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run");
        reports.push(serde_json::to_string(&outcome.report).expect("serialize"));
    }
    assert_eq!(reports[0], reports[1]);
    assert_eq!(reports[1], reports[2]);
}

fn complete_corpus(root: &Path) {
    write(root, "security/index.md", "---\ntitle: Security\n---\nSecurity overview.\n");
    write(root, "security/oauth.md", "OAuth setup.\n");
    write(root, "security/ldap.md", "LDAP setup.\n");
    write(
        root,
        "security/jwt-auth.md",
        &format!(
            "---\ntitle: JWT Auth\ndescription: Configure JWT authentication.\nkeywords: [jwt, auth, tokens]\nrelated:\n  - index.md\n  - oauth.md\n  - ldap.md\n---\n{}\n\n```bash\ncurl -H 'Authorization: Bearer x' localhost\n```\n",
            filler(600)
        ),
    );
}

#[tokio::test]
async fn complete_leaf_scores_ninety() {
    let dir = tempfile::tempdir().expect("tempdir");
    complete_corpus(dir.path());

    let outcome = run(dir.path()).await;
    let jwt = unit(&outcome, "security/jwt-auth.md");
    assert_eq!(jwt.target_page_name, "Security/Jwt_Auth");
    assert_eq!(jwt.role, Role::Leaf);
    assert_eq!(jwt.related_links, vec!["Security", "Security/Oauth", "Security/Ldap"]);
    assert_eq!(jwt.categories, vec!["Security", "Authentication"]);

    let score = jwt.score.as_ref().expect("scored");
    assert!(score.total >= Points::from_whole(85));
    assert_eq!(score.total, Points::from_whole(90));

    assert_eq!(unit(&outcome, "security/index.md").role, Role::Hub);

    let output = jwt.output_markup.as_deref().expect("output markup");
    assert!(output.contains("== See also ==\n* [[Security]]"));
    assert!(output.contains("[[Category:Authentication]]"));
}

#[tokio::test]
async fn publishable_run_writes_pages_and_metadata() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("src");
    complete_corpus(&root);

    let outcome = run(&root).await;
    assert!(outcome.report.is_publishable(), "{:?}", outcome.report.blockers);

    let out = dir.path().join("out");
    let summary = emit_outputs(&out, &outcome, false).expect("emit");
    assert_eq!(summary.pages_written, 4);
    assert!(!summary.manifest.forced);

    let page = std::fs::read_to_string(out.join("pages/Security/Jwt_Auth.wiki")).expect("page");
    assert!(page.contains("<syntaxhighlight lang=\"bash\">"));
    assert!(out.join("pages/Security.wiki").exists());

    let metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("metadata.json")).expect("read"))
            .expect("json");
    let records = metadata.as_array().expect("array");
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r["sha256"].as_str().is_some_and(|h| h.len() == 64)));

    let csv = std::fs::read_to_string(out.join("report.csv")).expect("csv");
    assert!(csv.starts_with("source_path,target_page_name,status,role,word_count,score,notes"));
    assert!(csv.contains("security/jwt-auth.md,Security/Jwt_Auth,Converted,Leaf,"));

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("run.json")).expect("read"))
            .expect("json");
    assert_eq!(manifest["publishable"], serde_json::Value::Bool(true));
}

#[tokio::test]
async fn proposals_stay_advisory_until_accepted() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "topics/a.md", "---\nkeywords: [cache]\n---\nAlpha.\n");
    write(dir.path(), "topics/b.md", "---\nkeywords: [cache]\n---\nBeta.\n");
    write(dir.path(), "other/c.md", "---\nkeywords: [cache]\n---\nGamma.\n");

    let outcome = run(dir.path()).await;
    let a = unit(&outcome, "topics/a.md");
    assert!(a.related_links.is_empty());
    let proposed: Vec<&str> = a.proposed_links.iter().map(|p| p.target.as_str()).collect();
    assert_eq!(proposed, vec!["B", "C"]);
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|w| w.kind == IssueKind::ProposedLinks && w.subject == "topics/a.md")
    );

    let mut ctx = context(&PipelineConfig::default(), 2);
    ctx.accept_proposals = true;
    let accepted = run_pipeline(&inputs(dir.path()), &ctx, &CancelToken::new(), &SilentProgress)
        .await
        .expect("run");
    let a = unit(&accepted, "topics/a.md");
    assert_eq!(a.related_links, vec!["B", "C"]);
    assert!(a.proposed_links.is_empty());
    assert!(accepted.graph.orphans.is_empty());
}

#[tokio::test]
async fn cancelled_run_returns_cancelled() {
    let dir = tempfile::tempdir().expect("tempdir");
    leaf_corpus(dir.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = run_pipeline(
        &inputs(dir.path()),
        &context(&PipelineConfig::default(), 2),
        &cancel,
        &SilentProgress,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MigrationError::Cancelled { total: 2, .. }));
}

#[tokio::test]
async fn missing_converter_output_fails_only_that_unit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("docs");
    let converted = dir.path().join("converted");
    write(&source, "guide/one.md", "---\ntitle: One\n---\nSource body.\n");
    write(&source, "guide/two.md", "Second.\n");
    write(&converted, "guide/one.wiki", "== One ==\nConverted body text.\n");

    let outcome = run_pipeline(
        &RunInputs {
            source_dir: source,
            converted_dir: Some(converted),
            inventory: None,
        },
        &context(&PipelineConfig::default(), 2),
        &CancelToken::new(),
        &SilentProgress,
    )
    .await
    .expect("run");

    let one = unit(&outcome, "guide/one.md");
    assert_eq!(one.raw_markup, "== One ==\nConverted body text.\n");
    assert_eq!(one.frontmatter.title.as_deref(), Some("One"));
    assert!(one.score.is_some());
    assert_eq!(one.source_word_count, Some(2));
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|w| w.kind == IssueKind::WordCountVariance && w.subject == "guide/one.md")
    );

    let two = unit(&outcome, "guide/two.md");
    assert_eq!(two.status, UnitStatus::Error);
    assert!(two.score.is_none());
    assert!(two.failure.as_deref().is_some_and(|f| f.contains("two.wiki")));
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|w| w.kind == IssueKind::UnitFailed && w.subject == "guide/two.md")
    );
}

#[tokio::test]
async fn inventory_supplies_targets_and_skips_drafts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("docs");
    write(&source, "guide/a.md", "Read [the other page](b.md) first.\n");
    write(&source, "guide/b.md", "The other page.\n");
    write(&source, "guide/draft.md", "\n");

    let inventory = dir.path().join("inventory.csv");
    std::fs::write(
        &inventory,
        "source_path,target_wiki_page,priority,status\n\
docs/guide/b.md,Guide/Other_Page,P1-High,Not Started\n\
docs/guide/draft.md,Guide/Draft,P3-Low,Skip-EmptyDraft\n",
    )
    .expect("write inventory");

    let outcome = run_pipeline(
        &RunInputs {
            source_dir: source,
            converted_dir: None,
            inventory: Some(inventory),
        },
        &context(&PipelineConfig::default(), 2),
        &CancelToken::new(),
        &SilentProgress,
    )
    .await
    .expect("run");

    let a = unit(&outcome, "guide/a.md");
    let normalized = a.normalized_markup.as_deref().expect("normalized");
    assert!(normalized.contains("[[Guide/Other_Page|the other page]]"));
    assert_eq!(a.related_links, vec!["Guide/Other_Page"]);

    let inventory = outcome.inventory.as_ref().expect("inventory");
    assert_eq!(
        inventory.source_for_target("Guide/Other_Page"),
        Some("docs/guide/b.md")
    );

    let b = unit(&outcome, "guide/b.md");
    assert_eq!(b.priority.as_deref(), Some("P1-High"));

    let draft = unit(&outcome, "guide/draft.md");
    assert_eq!(draft.status, UnitStatus::SkipEmptyDraft);
    assert!(draft.score.is_none());
    assert!(outcome.report.is_publishable());
}

#[tokio::test]
async fn unreadable_inventory_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    leaf_corpus(dir.path());

    let err = run_pipeline(
        &RunInputs {
            source_dir: dir.path().to_path_buf(),
            converted_dir: None,
            inventory: Some(dir.path().join("missing.csv")),
        },
        &context(&PipelineConfig::default(), 1),
        &CancelToken::new(),
        &SilentProgress,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MigrationError::Inventory(_)));
}
