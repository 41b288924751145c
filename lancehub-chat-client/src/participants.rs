//! Participant Cache
//!
//! Memoized resolution of counterpart profiles for rendering names and
//! avatars. A missing profile (404) is cached as a placeholder so one absent
//! user cannot trigger a refetch per render; transient errors are not
//! cached and resolve again next time.

use crate::{ChatApi, Result};
use lancehub_chat_protocol::Conversation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Display metadata for a chat participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    /// User id
    pub id: i64,

    /// Display name; `None` until the user completes a profile
    #[serde(default)]
    pub display_name: Option<String>,

    /// Avatar image URL
    #[serde(default)]
    pub avatar_url: Option<String>,

    /// Short profile headline
    #[serde(default)]
    pub headline: Option<String>,
}

impl Participant {
    /// Placeholder for a user whose profile does not exist (yet)
    pub fn placeholder(id: i64) -> Self {
        Self {
            id,
            display_name: None,
            avatar_url: None,
            headline: None,
        }
    }

    /// Name to render, falling back to a generic label
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("User")
    }
}

/// Memoizing participant resolver
#[derive(Clone)]
pub struct ParticipantCache {
    api: Arc<dyn ChatApi>,
    cache: Arc<RwLock<HashMap<i64, Participant>>>,
}

impl ParticipantCache {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            api,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve a participant, consulting the cache first
    pub async fn resolve(&self, user_id: i64) -> Result<Participant> {
        if let Some(participant) = self.cache.read().await.get(&user_id) {
            return Ok(participant.clone());
        }

        let participant = match self.api.participant(user_id).await? {
            Some(participant) => participant,
            // Profile not created yet; the placeholder renders until it is
            None => Participant::placeholder(user_id),
        };

        self.cache
            .write()
            .await
            .insert(user_id, participant.clone());
        Ok(participant)
    }

    /// Cached record, without fetching
    pub async fn cached(&self, user_id: i64) -> Option<Participant> {
        self.cache.read().await.get(&user_id).cloned()
    }

    /// Resolve the counterpart of every conversation ahead of rendering
    ///
    /// Failures are logged and skipped; a missing name never blocks the
    /// conversation list.
    pub async fn preload(&self, conversations: &[Conversation], local_user: i64) {
        for conversation in conversations {
            let counterpart = conversation.counterpart_of(local_user);
            if let Err(e) = self.resolve(counterpart).await {
                debug!(counterpart, "participant preload failed: {e}");
            }
        }
    }
}
