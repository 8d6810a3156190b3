use serde::{Deserialize, Serialize};

/// A single upstream release as observed at lookup time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub id: String,
    pub is_prerelease: bool,
}

/// Repository identity plus its most recent release, as returned by a lookup.
///
/// `release` is `None` when the repository exists but has never published a
/// release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoSnapshot {
    pub repo_id: String,
    pub owner: String,
    pub name: String,
    pub link: String,
    pub release: Option<Release>,
}

impl RepoSnapshot {
    pub fn has_releases(&self) -> bool {
        self.release.is_some()
    }

    pub fn release_id(&self) -> Option<&str> {
        self.release.as_ref().map(|r| r.id.as_str())
    }
}

/// One subscriber's tracking record for one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEntry {
    pub chat_id: String,
    pub repo_id: String,
    pub owner: String,
    pub name: String,
    pub link: String,
    /// Last release observed and already notified.
    pub current: Option<Release>,
    pub notify_prerelease: bool,
}

impl WatchEntry {
    /// Build a fresh entry for `chat_id` from a lookup result. Prerelease
    /// notifications start disabled.
    pub fn from_snapshot(chat_id: impl Into<String>, snapshot: &RepoSnapshot) -> Self {
        Self {
            chat_id: chat_id.into(),
            repo_id: snapshot.repo_id.clone(),
            owner: snapshot.owner.clone(),
            name: snapshot.name.clone(),
            link: snapshot.link.clone(),
            current: snapshot.release.clone(),
            notify_prerelease: false,
        }
    }

    pub fn current_release_id(&self) -> Option<&str> {
        self.current.as_ref().map(|r| r.id.as_str())
    }

    pub fn current_release_tag(&self) -> Option<&str> {
        self.current.as_ref().map(|r| r.tag.as_str())
    }

    /// `owner/name`, used in logs and failure records.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn releases_url(&self) -> String {
        format!("{}/releases", self.link)
    }

    pub fn release_url(&self, tag: &str) -> String {
        format!("{}/releases/tag/{}", self.link, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(release: Option<Release>) -> RepoSnapshot {
        RepoSnapshot {
            repo_id: "R_1".into(),
            owner: "rust-lang".into(),
            name: "rust".into(),
            link: "https://github.com/rust-lang/rust".into(),
            release,
        }
    }

    #[test]
    fn entry_from_snapshot_copies_release_and_disables_prerelease() {
        let snap = snapshot(Some(Release {
            tag: "1.80.0".into(),
            id: "RE_1".into(),
            is_prerelease: false,
        }));
        let entry = WatchEntry::from_snapshot("42", &snap);
        assert_eq!(entry.chat_id, "42");
        assert_eq!(entry.repo_id, "R_1");
        assert_eq!(entry.current_release_id(), Some("RE_1"));
        assert_eq!(entry.current_release_tag(), Some("1.80.0"));
        assert!(!entry.notify_prerelease);
        assert_eq!(
            entry.release_url("1.80.0"),
            "https://github.com/rust-lang/rust/releases/tag/1.80.0"
        );
    }

    #[test]
    fn entry_without_release_has_no_tag_or_id() {
        let entry = WatchEntry::from_snapshot("42", &snapshot(None));
        assert!(entry.current_release_id().is_none());
        assert!(entry.current_release_tag().is_none());
        assert_eq!(entry.full_name(), "rust-lang/rust");
    }
}
