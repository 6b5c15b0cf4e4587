//! Local participant profile.
//!
//! Stands in for sign-in: the first run creates a guest identity that is
//! reused afterwards. Messages copy the profile into their author snapshot at
//! send time, so renaming later does not rewrite history.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Author, Role};

/// The local participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable identity used for own/peer attribution
    pub identity: String,

    /// Name shown to the other role (role default if unset)
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub avatar_ref: Option<String>,
}

impl Profile {
    /// Create a fresh guest profile
    pub fn guest(display_name: Option<String>) -> Self {
        Self {
            identity: Uuid::new_v4().to_string(),
            display_name: display_name.filter(|n| !n.trim().is_empty()),
            avatar_ref: None,
        }
    }

    /// Load the profile at `path`, creating and saving a guest profile if absent
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read profile: {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse profile: {}", path.display()));
        }

        let profile = Self::guest(None);
        profile.save(path).await?;
        tracing::info!(identity = %profile.identity, "Created guest profile");
        Ok(profile)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize profile")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write profile: {}", path.display()))
    }

    /// Snapshot this profile as a message author for the given role
    pub fn author(&self, role: Role) -> Author {
        let display_name = self
            .display_name
            .clone()
            .unwrap_or_else(|| role.default_display_name().to_string());

        Author {
            identity: self.identity.clone(),
            display_name,
            avatar_ref: self.avatar_ref.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_or_create_is_stable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("profile.json");

        let first = Profile::load_or_create(&path).await.unwrap();
        let second = Profile::load_or_create(&path).await.unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_author_uses_role_default_name() {
        let profile = Profile::guest(None);
        assert_eq!(profile.author(Role::Sender).display_name, "Sender");
        assert_eq!(profile.author(Role::Receiver).display_name, "Receiver");

        let named = Profile::guest(Some("Sato".to_string()));
        let author = named.author(Role::Receiver);
        assert_eq!(author.display_name, "Sato");
        assert_eq!(author.identity, named.identity);
    }

    #[test]
    fn test_blank_name_is_ignored() {
        let profile = Profile::guest(Some("   ".to_string()));
        assert!(profile.display_name.is_none());
    }
}
