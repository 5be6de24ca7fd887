//! Authentication provider port interface

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// Authentication errors
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Not signed in")]
    SignedOut,

    #[error("Access token unavailable: {0}")]
    TokenUnavailable(String),
}

/// Port for the account the recordings are uploaded to
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current sign-in status
    fn is_signed_in(&self) -> bool;

    /// Receiver that observes every sign-in status change
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Bearer token for storage requests
    async fn access_token(&self) -> Result<String, AuthError>;
}

#[async_trait]
impl<T: AuthProvider + ?Sized> AuthProvider for std::sync::Arc<T> {
    fn is_signed_in(&self) -> bool {
        (**self).is_signed_in()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        (**self).subscribe()
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        (**self).access_token().await
    }
}
