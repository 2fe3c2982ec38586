use pmbot_core::truncate_chars;

use crate::review_parser::{ParsedReview, Severity};
use crate::summarizer::ReviewResult;

const MAX_FILE_COMMENTS: usize = 10;
const MAX_LISTED_FILES: usize = 10;
const MAX_SECTION_CHARS: usize = 1_024;

/// Renders a review as Discord markdown. Long output is chunked by the
/// transport.
pub fn render_review(result: &ReviewResult) -> String {
    let mut lines = Vec::new();
    let marker = match result.security.as_ref().and_then(|scan| scan.severity) {
        Some(Severity::Critical | Severity::High) => "🔴",
        Some(Severity::Medium) => "🟠",
        _ => "🟢",
    };
    lines.push(format!(
        "{marker} **Code Review: {}**",
        result.pull_request_id
    ));
    lines.push(format!("**{}**", result.title));
    if let Some(url) = result.html_url.as_deref() {
        lines.push(format!("<{url}>"));
    }
    lines.push(format!(
        "Author: `{}` | Files: {} | +{} / -{} | Commits: {}",
        result.author,
        result.file_list.len(),
        result.additions,
        result.deletions,
        result.commits
    ));
    let categories = result
        .categories
        .iter()
        .map(|(category, files)| format!("{} ({})", category.as_str(), files.len()))
        .collect::<Vec<_>>();
    if categories.is_empty() {
        lines.push(format!("Complexity: {}", result.complexity.label()));
    } else {
        lines.push(format!(
            "Complexity: {} | Areas: {}",
            result.complexity.label(),
            categories.join(", ")
        ));
    }
    if result.truncated {
        lines.push(format!(
            "⚠️ Partial review: the diff was too large, {} file(s) were left out and long patches were cut.",
            result.omitted_files
        ));
    }

    lines.push(String::new());
    match &result.review {
        ParsedReview::Structured {
            summary,
            file_comments,
            security_findings,
            assessment,
        } => {
            lines.push("**Summary**".to_string());
            lines.push(truncate_chars(summary, MAX_SECTION_CHARS));
            if !file_comments.is_empty() {
                lines.push(String::new());
                lines.push("**File Comments**".to_string());
                for comment in file_comments.iter().take(MAX_FILE_COMMENTS) {
                    match comment.file.as_deref() {
                        Some(file) => lines.push(format!("- `{file}`: {}", comment.comment)),
                        None => lines.push(format!("- {}", comment.comment)),
                    }
                }
                if file_comments.len() > MAX_FILE_COMMENTS {
                    lines.push(format!(
                        "- ... and {} more",
                        file_comments.len() - MAX_FILE_COMMENTS
                    ));
                }
            }
            if !security_findings.is_empty() {
                lines.push(String::new());
                lines.push("**Security Findings**".to_string());
                for finding in security_findings {
                    lines.push(format!("- {finding}"));
                }
            }
            if let Some(assessment) = assessment {
                lines.push(String::new());
                lines.push(format!("**Overall Assessment:** {assessment}"));
            }
        }
        ParsedReview::Freeform { text } => {
            lines.push("**AI Code Review**".to_string());
            if text.is_empty() {
                lines.push("(the model returned no review text)".to_string());
            } else {
                lines.push(truncate_chars(text, MAX_SECTION_CHARS * 2));
            }
        }
    }

    if let Some(scan) = &result.security {
        lines.push(String::new());
        let severity = scan
            .severity
            .map(Severity::as_str)
            .unwrap_or("UNRATED");
        lines.push(format!("**Security Analysis ({severity})**"));
        lines.push(truncate_chars(&scan.text, MAX_SECTION_CHARS));
    }

    if !result.file_list.is_empty() {
        lines.push(String::new());
        lines.push("**Changed Files**".to_string());
        for file in result.file_list.iter().take(MAX_LISTED_FILES) {
            lines.push(format!("- `{file}`"));
        }
        if result.file_list.len() > MAX_LISTED_FILES {
            lines.push(format!(
                "- ... and {} more",
                result.file_list.len() - MAX_LISTED_FILES
            ));
        }
    }
    lines.join("\n")
}
