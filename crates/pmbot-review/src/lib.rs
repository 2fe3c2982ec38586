//! Review summarizer for merged pull requests.
//!
//! Shapes the diff to the model budget, asks the model for a review (and an
//! optional security pass), parses whatever comes back without failing, and
//! decides who receives the result.

mod prompts;
mod recipient;
mod render;
mod review_parser;
mod summarizer;

pub use prompts::{build_review_request, build_security_request, REVIEW_TEMPERATURE, SECURITY_TEMPERATURE};
pub use recipient::{resolve_recipient, Recipient, RecipientPolicy};
pub use render::render_review;
pub use review_parser::{
    parse_review, parse_security_scan, FileComment, ParsedReview, SecurityScan, Severity,
};
pub use summarizer::{ReviewResult, ReviewSummarizer, ReviewSummarizerConfig};
