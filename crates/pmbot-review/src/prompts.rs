use pmbot_ai::{ChatRequest, Message};
use pmbot_core::truncate_chars;
use pmbot_github::{PullRequestDescriptor, ReviewDiff};

pub const REVIEW_TEMPERATURE: f32 = 0.3;
pub const SECURITY_TEMPERATURE: f32 = 0.2;

const REVIEW_MAX_TOKENS: u32 = 1_024;
const SECURITY_MAX_TOKENS: u32 = 768;
const DESCRIPTION_MAX_CHARS: usize = 1_000;

const REVIEW_SYSTEM_PROMPT: &str = "You are an expert code reviewer. Give constructive, concise and actionable feedback on merged pull requests.";
const SECURITY_SYSTEM_PROMPT: &str =
    "You are a security expert analyzing code changes for vulnerabilities.";

const REVIEW_INSTRUCTIONS: &str = "Answer using exactly these sections:
## Summary
One short paragraph describing what the pull request does.
## File Comments
One bullet per file worth commenting on, formatted as `- path: comment`.
## Security
One bullet per security-relevant finding, or `- None`.
## Overall Assessment
Approve, needs changes, or reject, with one sentence of reasoning.";

const SECURITY_INSTRUCTIONS: &str = "Check for injection, XSS, CSRF, authentication and authorization flaws, secrets or sensitive data exposure, insecure storage, vulnerable dependencies and security misconfiguration.
List each finding as a bullet starting with its severity, for example `- HIGH: description (file:line)`.
Rate the overall severity on the last line as `Severity: CRITICAL`, `HIGH`, `MEDIUM`, `LOW` or `NONE`.";

pub fn build_review_request(
    model: &str,
    pull_request: &PullRequestDescriptor,
    diff: &ReviewDiff,
) -> ChatRequest {
    let mut prompt = String::new();
    prompt.push_str("Pull request information:\n");
    prompt.push_str(&format!("- Repository: {}\n", pull_request.repo));
    prompt.push_str(&format!("- Title: {}\n", pull_request.title));
    let description = pull_request
        .body
        .as_deref()
        .map(|body| truncate_chars(body.trim(), DESCRIPTION_MAX_CHARS))
        .unwrap_or_else(|| "N/A".to_string());
    prompt.push_str(&format!("- Description: {description}\n"));
    prompt.push_str(&format!("- Files changed: {}\n", pull_request.changed_files));
    prompt.push_str(&format!("- Lines added: +{}\n", pull_request.additions));
    prompt.push_str(&format!("- Lines removed: -{}\n", pull_request.deletions));
    if diff.truncated {
        prompt.push_str(
            "- Note: the diff below is partial; only the first files and lines are included.\n",
        );
    }
    prompt.push_str("\nCode changes:\n");
    push_diff(&mut prompt, diff);
    prompt.push('\n');
    prompt.push_str(REVIEW_INSTRUCTIONS);

    ChatRequest {
        model: model.to_string(),
        messages: vec![Message::system(REVIEW_SYSTEM_PROMPT), Message::user(prompt)],
        max_tokens: Some(REVIEW_MAX_TOKENS),
        temperature: Some(REVIEW_TEMPERATURE),
    }
}

pub fn build_security_request(
    model: &str,
    pull_request: &PullRequestDescriptor,
    diff: &ReviewDiff,
) -> ChatRequest {
    let mut prompt = format!("Pull request: {} ({})\n\nCode changes:\n", pull_request.title, pull_request.repo);
    push_diff(&mut prompt, diff);
    prompt.push('\n');
    prompt.push_str(SECURITY_INSTRUCTIONS);

    ChatRequest {
        model: model.to_string(),
        messages: vec![Message::system(SECURITY_SYSTEM_PROMPT), Message::user(prompt)],
        max_tokens: Some(SECURITY_MAX_TOKENS),
        temperature: Some(SECURITY_TEMPERATURE),
    }
}

fn push_diff(prompt: &mut String, diff: &ReviewDiff) {
    if diff.files.is_empty() {
        prompt.push_str("(no reviewable file changes)\n");
        return;
    }
    for file in &diff.files {
        prompt.push_str(&format!("\n--- File: {} ({}) ---\n", file.filename, file.status));
        prompt.push_str(file.patch.as_deref().unwrap_or("No diff available"));
        prompt.push('\n');
    }
}
