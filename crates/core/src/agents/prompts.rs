//! Task prompt templates bundled at compile time.

/// Requirement Analyst - specification from the raw requirement
pub const ANALYZE: &str = include_str!("defaults/analyze.md");

/// Senior Developer - first implementation
pub const DEVELOP: &str = include_str!("defaults/develop.md");

/// Code Reviewer - verdict, score and fixes
pub const REVIEW: &str = include_str!("defaults/review.md");

/// Senior Developer - apply review feedback
pub const REVISE: &str = include_str!("defaults/revise.md");

/// QA Engineer - pytest suite
pub const TEST: &str = include_str!("defaults/test.md");

/// Tech Writer - documentation
pub const DOCUMENT: &str = include_str!("defaults/document.md");

/// DevOps Agent - deployment configuration
pub const DEVOPS: &str = include_str!("defaults/devops.md");

/// UI Designer - Streamlit front end
pub const UI: &str = include_str!("defaults/ui.md");

/// All templates with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("analyze", ANALYZE),
        ("develop", DEVELOP),
        ("review", REVIEW),
        ("revise", REVISE),
        ("test", TEST),
        ("document", DOCUMENT),
        ("devops", DEVOPS),
        ("ui", UI),
    ]
}
