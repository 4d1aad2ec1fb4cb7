use crate::extensions::twitter::SocialPlatform;
use anyhow::{Result, anyhow};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;
use utils::errors::SOCIAL_PROFILE_NOT_FOUND_ERROR;

/// Social clients keyed by profile. Never mutated once built.
#[derive(Clone, Default)]
pub struct ClientSet {
    social: HashMap<String, Arc<dyn SocialPlatform>>,
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_social(mut self, profile: impl Into<String>, client: Arc<dyn SocialPlatform>) -> Self {
        self.social.insert(profile.into(), client);
        self
    }

    pub fn social(&self, profile: &str) -> Result<Arc<dyn SocialPlatform>> {
        self.social
            .get(profile)
            .cloned()
            .ok_or_else(|| anyhow!("{}: {}", SOCIAL_PROFILE_NOT_FOUND_ERROR, profile))
    }

    pub fn profiles(&self) -> Vec<&str> {
        let mut profiles: Vec<&str> = self.social.keys().map(String::as_str).collect();
        profiles.sort();
        profiles
    }
}

/// Owns the current client set. Jobs take one snapshot per tick; re-authorization swaps the
/// whole set.
pub struct ClientAuthority {
    current: RwLock<Arc<ClientSet>>,
}

impl ClientAuthority {
    pub fn new(initial: ClientSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub async fn snapshot(&self) -> Arc<ClientSet> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, next: ClientSet) {
        let profiles = next.profiles().len();
        *self.current.write().await = Arc::new(next);
        info!(profiles = profiles, "Client set replaced");
    }
}
