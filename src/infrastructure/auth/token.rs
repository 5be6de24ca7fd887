//! Access-token backed authentication provider

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::application::ports::{AuthError, AuthProvider};

/// Environment variable holding an OAuth access token for Drive
pub const ACCESS_TOKEN_ENV: &str = "DRIVE_ACCESS_TOKEN";

/// Signs in with a pre-issued OAuth access token.
///
/// The account counts as signed in while a non-empty token is held.
pub struct TokenAuthProvider {
    token: Mutex<Option<String>>,
    status: watch::Sender<bool>,
}

impl TokenAuthProvider {
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        let status = watch::Sender::new(token.is_some());
        Self {
            token: Mutex::new(token),
            status,
        }
    }

    pub fn signed_out() -> Self {
        Self::new(None)
    }

    /// Install a token and report the account as signed in
    pub fn sign_in(&self, token: impl Into<String>) {
        let token = token.into();
        if token.trim().is_empty() {
            return self.sign_out();
        }
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        self.status.send_replace(true);
        info!("signed in");
    }

    pub fn sign_out(&self) {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.status.send_replace(false);
        info!("signed out");
    }
}

#[async_trait]
impl AuthProvider for TokenAuthProvider {
    fn is_signed_in(&self) -> bool {
        *self.status.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AuthError::SignedOut)
    }
}
