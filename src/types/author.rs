use serde::{Deserialize, Serialize};

/// The author of one pull-request commit, as far as the provider could
/// resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub sha: String,
    pub id: Option<u64>,
    pub login: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl CommitAuthor {
    /// Best human-readable handle: login, then git author name, then email.
    pub fn display_name(&self) -> &str {
        self.login
            .as_deref()
            .or(self.name.as_deref())
            .or(self.email.as_deref())
            .unwrap_or("unknown")
    }
}
