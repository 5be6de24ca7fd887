//! Auth command handler

use std::env;

use crate::application::ports::{AuthProvider, ConfigStore};
use crate::domain::error::ConfigError;
use crate::infrastructure::{TokenAuthProvider, ACCESS_TOKEN_ENV};

use super::args::AuthAction;
use super::config_cmd::mask_token;
use super::presenter::Presenter;

/// Handle auth subcommand.
///
/// Returns whether the account ends up in the state the action asked for.
/// Sign-in and sign-out persist the token through the config store.
pub async fn handle_auth_command<S: ConfigStore>(
    action: AuthAction,
    auth: &TokenAuthProvider,
    store: &S,
    presenter: &Presenter,
) -> Result<bool, ConfigError> {
    match action {
        AuthAction::Status => Ok(report_status(auth, presenter).await),
        AuthAction::SignIn { token } => sign_in(auth, store, &token, presenter).await,
        AuthAction::SignOut => sign_out(auth, store, presenter).await,
    }
}

async fn report_status<A: AuthProvider>(auth: &A, presenter: &Presenter) -> bool {
    match auth.access_token().await {
        Ok(token) if auth.is_signed_in() => {
            presenter.success(&format!("Signed in (token {})", mask_token(&token)));
            true
        }
        _ => {
            presenter.warn(&format!(
                "Not signed in. Set {} or run 'drive-recorder auth sign-in <token>'",
                ACCESS_TOKEN_ENV
            ));
            false
        }
    }
}

async fn sign_in<S: ConfigStore>(
    auth: &TokenAuthProvider,
    store: &S,
    token: &str,
    presenter: &Presenter,
) -> Result<bool, ConfigError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::ValidationError {
            key: "access_token".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    store_token(store, Some(token.to_string())).await?;
    auth.sign_in(token);
    Ok(report_status(auth, presenter).await)
}

async fn sign_out<S: ConfigStore>(
    auth: &TokenAuthProvider,
    store: &S,
    presenter: &Presenter,
) -> Result<bool, ConfigError> {
    if store.exists() {
        store_token(store, None).await?;
    }
    auth.sign_out();
    presenter.success("Signed out");

    if env::var(ACCESS_TOKEN_ENV).is_ok_and(|t| !t.trim().is_empty()) {
        presenter.warn(&format!(
            "{} is still set and will sign in again on the next run",
            ACCESS_TOKEN_ENV
        ));
    }
    Ok(true)
}

async fn store_token<S: ConfigStore>(store: &S, token: Option<String>) -> Result<(), ConfigError> {
    let mut config = store.load().await?;
    config.access_token = token;
    store.save(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::XdgConfigStore;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> XdgConfigStore {
        XdgConfigStore::with_path(dir.path().join("config.toml"))
    }

    #[tokio::test]
    async fn status_reports_signed_in() {
        let dir = TempDir::new().unwrap();
        let auth = TokenAuthProvider::new(Some("ya29.abcdefghijkl".to_string()));
        let signed_in = handle_auth_command(AuthAction::Status, &auth, &store(&dir), &Presenter::new())
            .await
            .unwrap();
        assert!(signed_in);
    }

    #[tokio::test]
    async fn status_reports_signed_out() {
        let dir = TempDir::new().unwrap();
        let auth = TokenAuthProvider::signed_out();
        let signed_in = handle_auth_command(AuthAction::Status, &auth, &store(&dir), &Presenter::new())
            .await
            .unwrap();
        assert!(!signed_in);
    }

    #[tokio::test]
    async fn sign_in_persists_token_and_notifies() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let auth = TokenAuthProvider::signed_out();
        let status = auth.subscribe();

        let action = AuthAction::SignIn {
            token: " ya29.abcdefghijkl ".to_string(),
        };
        assert!(handle_auth_command(action, &auth, &store, &Presenter::new())
            .await
            .unwrap());

        assert!(*status.borrow());
        assert_eq!(auth.access_token().await.unwrap(), "ya29.abcdefghijkl");
        assert_eq!(
            store.load().await.unwrap().access_token.as_deref(),
            Some("ya29.abcdefghijkl")
        );
    }

    #[tokio::test]
    async fn sign_in_rejects_blank_token() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let auth = TokenAuthProvider::signed_out();

        let action = AuthAction::SignIn {
            token: "   ".to_string(),
        };
        let err = handle_auth_command(action, &auth, &store, &Presenter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert!(!auth.is_signed_in());
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn sign_out_removes_token_and_keeps_other_settings() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let auth = TokenAuthProvider::signed_out();
        let presenter = Presenter::new();

        let action = AuthAction::SignIn {
            token: "ya29.abcdefghijkl".to_string(),
        };
        handle_auth_command(action, &auth, &store, &presenter)
            .await
            .unwrap();
        let mut config = store.load().await.unwrap();
        config.folder = Some("Voice memos".to_string());
        store.save(&config).await.unwrap();

        let mut status = auth.subscribe();
        assert!(handle_auth_command(AuthAction::SignOut, &auth, &store, &presenter)
            .await
            .unwrap());

        assert!(status.has_changed().unwrap());
        assert!(!*status.borrow_and_update());
        let config = store.load().await.unwrap();
        assert_eq!(config.access_token, None);
        assert_eq!(config.folder.as_deref(), Some("Voice memos"));
    }

    #[tokio::test]
    async fn sign_out_without_config_file_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let auth = TokenAuthProvider::signed_out();

        assert!(handle_auth_command(AuthAction::SignOut, &auth, &store, &Presenter::new())
            .await
            .unwrap());
        assert!(!store.exists());
    }
}
