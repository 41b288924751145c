//! Auth Collaborator Seam
//!
//! The chat client never manages credentials itself; it consumes them
//! through [`AuthProvider`]. A provider that cannot produce a token signals
//! `Unauthenticated`, which is fatal for the session.

use crate::{ClientError, Result};
use async_trait::async_trait;

/// External authentication collaborator
///
/// Supplies the local user id and the bearer credential used for both REST
/// requests and the live connection.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current bearer credential
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthenticated`] when there is no valid
    /// session.
    async fn bearer_token(&self) -> Result<String>;

    /// Id of the locally signed-in user
    fn user_id(&self) -> i64;
}

/// Fixed-credential provider
///
/// Suits CLI usage and tests, where a token is issued out of band.
pub struct StaticAuth {
    token: String,
    user_id: i64,
}

impl StaticAuth {
    pub fn new(token: impl Into<String>, user_id: i64) -> Self {
        Self {
            token: token.into(),
            user_id,
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn bearer_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(ClientError::Unauthenticated);
        }
        Ok(self.token.clone())
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_auth() {
        let auth = StaticAuth::new("secret", 7);
        assert_eq!(auth.user_id(), 7);
        assert_eq!(auth.bearer_token().await.unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_empty_token_is_unauthenticated() {
        let auth = StaticAuth::new("", 7);
        assert!(matches!(
            auth.bearer_token().await,
            Err(ClientError::Unauthenticated)
        ));
    }
}
