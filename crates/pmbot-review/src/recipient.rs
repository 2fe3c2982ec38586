use std::fmt;
use std::str::FromStr;

use pmbot_github::PullRequestDescriptor;
use pmbot_state::IdentityMappingStore;

/// Who receives a review. Chosen by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientPolicy {
    Fixed(String),
    Author,
    RepoOwner,
}

impl FromStr for RecipientPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "author" => return Ok(Self::Author),
            "owner" | "repo-owner" => return Ok(Self::RepoOwner),
            _ => {}
        }
        let Some((kind, user_id)) = trimmed.split_once(':') else {
            return Err(format!(
                "invalid review recipient '{raw}': expected fixed:<discord-user-id>, author or owner"
            ));
        };
        let user_id = user_id.trim();
        if !kind.trim().eq_ignore_ascii_case("fixed")
            || user_id.is_empty()
            || !user_id.chars().all(|ch| ch.is_ascii_digit())
        {
            return Err(format!(
                "invalid review recipient '{raw}': expected fixed:<discord-user-id>, author or owner"
            ));
        }
        Ok(Self::Fixed(user_id.to_string()))
    }
}

impl fmt::Display for RecipientPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(user_id) => write!(f, "fixed:{user_id}"),
            Self::Author => f.write_str("author"),
            Self::RepoOwner => f.write_str("owner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    DirectMessage { user_id: String },
    Channel { channel_id: String },
}

/// Applies `policy` to a pull request. When the policy cannot name a user the
/// review goes to `fallback_channel`; `None` means nobody can receive it.
pub fn resolve_recipient(
    policy: &RecipientPolicy,
    pull_request: &PullRequestDescriptor,
    mappings: &IdentityMappingStore,
    fallback_channel: Option<&str>,
) -> Option<Recipient> {
    let mapped = match policy {
        RecipientPolicy::Fixed(user_id) => Some(user_id.clone()),
        RecipientPolicy::Author => mappings.lookup(&pull_request.author).map(str::to_string),
        RecipientPolicy::RepoOwner => mappings
            .lookup(&pull_request.repo.owner)
            .map(str::to_string),
    };
    if let Some(user_id) = mapped {
        return Some(Recipient::DirectMessage { user_id });
    }
    tracing::info!(
        pull_request = %pull_request.id(),
        policy = %policy,
        "no identity mapping for review recipient; using fallback channel"
    );
    fallback_channel
        .map(str::trim)
        .filter(|channel_id| !channel_id.is_empty())
        .map(|channel_id| Recipient::Channel {
            channel_id: channel_id.to_string(),
        })
}
