//! Tolerant parsing of model review text.
//!
//! Models follow the requested layout loosely: headings may be markdown,
//! bold, numbered, or end with a colon, and content may share the heading's
//! line. Anything that does not yield a summary section falls back to
//! [`ParsedReview::Freeform`].

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileComment {
    pub file: Option<String>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReview {
    Structured {
        summary: String,
        file_comments: Vec<FileComment>,
        security_findings: Vec<String>,
        assessment: Option<String>,
    },
    Freeform {
        text: String,
    },
}

impl ParsedReview {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured { .. })
    }

    pub fn summary_text(&self) -> &str {
        match self {
            Self::Structured { summary, .. } => summary,
            Self::Freeform { text } => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "NONE" => Some(Self::None),
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Result of the dedicated security pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityScan {
    pub severity: Option<Severity>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Summary,
    FileComments,
    Security,
    Assessment,
    Other,
}

pub fn parse_review(raw: &str) -> ParsedReview {
    let text = raw.trim();
    let mut summary = Vec::<String>::new();
    let mut file_lines = Vec::<String>::new();
    let mut security_lines = Vec::<String>::new();
    let mut assessment = Vec::<String>::new();
    let mut current = Section::Preamble;

    for line in text.lines() {
        if let Some((section, inline)) = classify_heading(line) {
            current = section;
            if let Some(inline) = inline {
                push_section_line(
                    current,
                    inline,
                    &mut summary,
                    &mut file_lines,
                    &mut security_lines,
                    &mut assessment,
                );
            }
            continue;
        }
        push_section_line(
            current,
            line,
            &mut summary,
            &mut file_lines,
            &mut security_lines,
            &mut assessment,
        );
    }

    let summary = join_paragraph(&summary);
    if summary.is_empty() {
        return ParsedReview::Freeform {
            text: text.to_string(),
        };
    }
    let assessment = join_paragraph(&assessment);
    ParsedReview::Structured {
        summary,
        file_comments: file_lines
            .iter()
            .filter_map(|line| parse_file_comment(line))
            .collect(),
        security_findings: security_lines
            .iter()
            .filter_map(|line| parse_bullet(line))
            .filter(|finding| !is_no_finding(finding))
            .collect(),
        assessment: (!assessment.is_empty()).then_some(assessment),
    }
}

/// Picks the highest severity keyword in the scan. An explicit
/// `Severity: X` line wins over keywords in the findings.
pub fn parse_security_scan(raw: &str) -> SecurityScan {
    let text = raw.trim().to_string();
    let mut explicit = None;
    let mut highest = None::<Severity>;
    for line in text.lines() {
        let cleaned = line.trim().trim_matches('*').trim();
        let lowered = cleaned.to_ascii_lowercase();
        if let Some(rest) = lowered.strip_prefix("severity:") {
            let token = rest.trim().trim_matches(|ch: char| !ch.is_ascii_alphabetic());
            if let Some(severity) = Severity::from_token(&token.to_ascii_uppercase()) {
                explicit = Some(severity);
            }
        }
        for token in cleaned.split(|ch: char| !ch.is_ascii_alphabetic()) {
            if let Some(severity) = Severity::from_token(token) {
                highest = Some(highest.map_or(severity, |current| current.max(severity)));
            }
        }
    }
    SecurityScan {
        severity: explicit.or(highest),
        text,
    }
}

fn classify_heading(line: &str) -> Option<(Section, Option<&str>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let is_markdown_heading = trimmed.starts_with('#');
    let is_bold = trimmed.starts_with("**");
    let is_numbered = trimmed
        .split_once('.')
        .map(|(prefix, _)| !prefix.is_empty() && prefix.chars().all(|ch| ch.is_ascii_digit()))
        .unwrap_or(false);

    let stripped = trimmed.trim_start_matches('#').trim_start();
    let stripped = if is_numbered {
        stripped
            .split_once('.')
            .map(|(_, rest)| rest.trim_start())
            .unwrap_or(stripped)
    } else {
        stripped
    };
    let stripped = stripped.trim_start_matches('*');

    let (label, inline) = match stripped.find(':') {
        Some(index) => (&stripped[..index], Some(&stripped[index + 1..])),
        None => (stripped, None),
    };
    let label = label.trim().trim_end_matches('*').trim();
    let inline = inline
        .map(|rest| rest.trim_start_matches('*').trim())
        .filter(|rest| !rest.is_empty());
    let has_colon = stripped.contains(':');

    if !(is_markdown_heading || is_bold || is_numbered || has_colon) {
        return None;
    }
    if !is_markdown_heading && !is_bold && !is_numbered && label.split_whitespace().count() > 3 {
        return None;
    }
    let section = match label.to_ascii_lowercase().as_str() {
        "summary" | "overview" => Section::Summary,
        "file comments" | "files" | "file notes" | "code quality" | "potential issues"
        | "suggestions" => Section::FileComments,
        "security" | "security findings" | "security notes" | "security concerns" => {
            Section::Security
        }
        "overall assessment" | "assessment" | "verdict" => Section::Assessment,
        _ if is_markdown_heading => Section::Other,
        _ => return None,
    };
    Some((section, inline))
}

fn push_section_line(
    section: Section,
    line: &str,
    summary: &mut Vec<String>,
    file_lines: &mut Vec<String>,
    security_lines: &mut Vec<String>,
    assessment: &mut Vec<String>,
) {
    let target = match section {
        Section::Summary => summary,
        Section::FileComments => file_lines,
        Section::Security => security_lines,
        Section::Assessment => assessment,
        Section::Preamble | Section::Other => return,
    };
    target.push(line.to_string());
}

fn join_paragraph(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_bullet(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let content = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
        .unwrap_or(trimmed)
        .trim();
    (!content.is_empty()).then(|| content.to_string())
}

fn parse_file_comment(line: &str) -> Option<FileComment> {
    let content = parse_bullet(line)?;
    let Some((head, comment)) = content.split_once(':') else {
        return Some(FileComment {
            file: None,
            comment: content,
        });
    };
    let file = head.trim().trim_matches('`').trim_matches('*').trim();
    let comment = comment.trim();
    let looks_like_path = !file.is_empty()
        && !file.contains(char::is_whitespace)
        && (file.contains('.') || file.contains('/'));
    if !looks_like_path || comment.is_empty() {
        return Some(FileComment {
            file: None,
            comment: content,
        });
    }
    Some(FileComment {
        file: Some(file.to_string()),
        comment: comment.to_string(),
    })
}

fn is_no_finding(finding: &str) -> bool {
    let lowered = finding
        .trim_end_matches('.')
        .trim()
        .to_ascii_lowercase();
    matches!(
        lowered.as_str(),
        "none" | "n/a" | "no issues" | "no issues found" | "no security issues"
            | "no security issues found" | "none found"
    )
}
