//! Parsing of free-text user input into a repository `owner/name` pair.
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

// The host must start the text or follow whitespace, a quote or a bracket, so
// subdomains and lookalike hosts never match.
static GITHUB_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|[\s(<"'])(?:https?://)?(?:www\.)?github\.com/([^/\s?#]+)/([^/\s?#>)"']+)"#)
        .expect("valid github url regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Resolve user input into a repository reference.
///
/// A GitHub URL anywhere in the text wins over the bare `owner/name` form.
/// For the bare form the text is split on the first `/` and any further
/// segments are dropped. Returns `None` when neither shape matches.
pub fn parse_repo_ref(input: &str) -> Option<RepoRef> {
    if let Some(caps) = GITHUB_URL.captures(input) {
        let owner = caps[1].to_string();
        let name = caps[2].trim_end_matches(".git").to_string();
        if !name.is_empty() {
            return Some(RepoRef { owner, name });
        }
    }

    let trimmed = input.trim();
    let (owner, rest) = trimmed.split_once('/')?;
    let name = rest.split('/').next().unwrap_or_default();
    if !is_segment(owner) || !is_segment(name) {
        return None;
    }
    Some(RepoRef {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}
