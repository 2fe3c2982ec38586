//! File filtering, diff truncation and change classification for reviews.

use std::collections::BTreeMap;

use crate::pull_request::PullRequestFile;

const SKIP_FILE_NAMES: &[&str] = &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "cargo.lock"];

const SKIP_DIRECTORIES: &[&str] = &["dist", "build", "node_modules", "__pycache__"];

const SKIP_SUFFIXES: &[&str] = &[
    ".min.js", ".min.css", ".map", ".pyc", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico",
    ".pdf", ".zip", ".tar", ".gz",
];

const PATCH_TRUNCATION_MARKER: &str = "\n... (truncated)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    pub max_files: usize,
    pub max_changed_lines: usize,
    pub max_patch_chars: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_files: 20,
            max_changed_lines: 1_000,
            max_patch_chars: 5_000,
        }
    }
}

/// Diff material that fits the model's context budget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReviewDiff {
    pub files: Vec<PullRequestFile>,
    pub skipped_files: Vec<String>,
    pub omitted_files: usize,
    pub truncated: bool,
}

/// Lockfiles, build output directories and binary or minified assets.
/// Matches whole path segments so `src/rebuild/x.rs` is still reviewed.
pub fn should_skip_file(filename: &str) -> bool {
    let lowered = filename.to_ascii_lowercase();
    let mut segments = lowered.split('/').filter(|segment| !segment.is_empty());
    let Some(name) = segments.next_back() else {
        return false;
    };
    SKIP_FILE_NAMES.contains(&name)
        || SKIP_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        || segments.any(|directory| SKIP_DIRECTORIES.contains(&directory))
}

pub fn prepare_review_diff(files: &[PullRequestFile], limits: DiffLimits) -> ReviewDiff {
    let mut diff = ReviewDiff::default();
    let mut lines_used = 0_usize;
    let mut budget_exhausted = false;

    for file in files {
        if should_skip_file(&file.filename) {
            diff.skipped_files.push(file.filename.clone());
            continue;
        }
        if budget_exhausted || diff.files.len() >= limits.max_files {
            diff.omitted_files = diff.omitted_files.saturating_add(1);
            diff.truncated = true;
            continue;
        }

        let mut kept = file.clone();
        if let Some(patch) = kept.patch.take() {
            let remaining = limits.max_changed_lines.saturating_sub(lines_used);
            let line_count = patch.lines().count();
            let patch = if line_count > remaining {
                diff.truncated = true;
                budget_exhausted = true;
                if remaining == 0 {
                    diff.omitted_files = diff.omitted_files.saturating_add(1);
                    continue;
                }
                lines_used = limits.max_changed_lines;
                let mut cut = patch.lines().take(remaining).collect::<Vec<_>>().join("\n");
                cut.push_str(PATCH_TRUNCATION_MARKER);
                cut
            } else {
                lines_used = lines_used.saturating_add(line_count);
                patch
            };
            kept.patch = Some(cap_patch_chars(&patch, limits.max_patch_chars, &mut diff.truncated));
        }
        diff.files.push(kept);
    }
    diff
}

fn cap_patch_chars(patch: &str, max_chars: usize, truncated: &mut bool) -> String {
    if patch.chars().count() <= max_chars {
        return patch.to_string();
    }
    *truncated = true;
    let mut capped = patch.chars().take(max_chars).collect::<String>();
    capped.push_str(PATCH_TRUNCATION_MARKER);
    capped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    pub fn estimate(changed_files: u64, changed_lines: u64) -> Self {
        if changed_files > 20 || changed_lines > 1_000 {
            Self::VeryComplex
        } else if changed_files > 10 || changed_lines > 500 {
            Self::Complex
        } else if changed_files > 5 || changed_lines > 200 {
            Self::Moderate
        } else {
            Self::Simple
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Simple => "Simple",
            Self::Moderate => "Moderate",
            Self::Complex => "Complex",
            Self::VeryComplex => "Very Complex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeCategory {
    Backend,
    Frontend,
    Config,
    Tests,
    Docs,
    Other,
}

impl ChangeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Config => "config",
            Self::Tests => "tests",
            Self::Docs => "docs",
            Self::Other => "other",
        }
    }

    pub fn classify(filename: &str) -> Self {
        let lowered = filename.to_ascii_lowercase();
        let extension = lowered.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        let looks_like_test = lowered.contains("test") || lowered.contains("spec");
        match extension {
            "rs" | "py" | "java" | "go" | "rb" | "php" | "kt" | "cs" => {
                if looks_like_test {
                    Self::Tests
                } else {
                    Self::Backend
                }
            }
            "js" | "jsx" | "ts" | "tsx" | "vue" | "html" | "css" | "scss" | "svelte" => {
                if looks_like_test {
                    Self::Tests
                } else {
                    Self::Frontend
                }
            }
            "json" | "yaml" | "yml" | "toml" | "ini" | "env" | "lock" => Self::Config,
            "md" | "txt" | "rst" => Self::Docs,
            _ => Self::Other,
        }
    }
}

pub fn categorize_changes<'a>(
    filenames: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<ChangeCategory, Vec<String>> {
    let mut categories = BTreeMap::<ChangeCategory, Vec<String>>::new();
    for filename in filenames {
        categories
            .entry(ChangeCategory::classify(filename))
            .or_default()
            .push(filename.to_string());
    }
    categories
}
