//! Sessions against the backend's auth endpoint.
//!
//! The auth layer is the single writer of session state; everything else
//! (table requests, the CLI guard, embedders) observes it through
//! [`SessionEvents`], a watch channel holding the latest [`AuthState`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::StoreClient;
use crate::error::StoreError;

/// Seconds before the recorded expiry at which a token counts as expired.
const EXPIRY_LEEWAY_SECS: i64 = 30;

/// Lead time for the background refresh task.
const REFRESH_LEAD_SECS: i64 = 60;

/// Wait between refresh attempts once one has failed.
const REFRESH_RETRY: Duration = Duration::from_secs(30);

/// The signed-in account, as the auth endpoint reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session, including everything needed to persist and restore it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token is expired (with leeway, so a token about to
    /// lapse mid-operation already counts as expired).
    pub fn is_expired(&self) -> bool {
        Utc::now() + chrono::Duration::seconds(EXPIRY_LEEWAY_SECS) >= self.expires_at
    }
}

/// Session transitions published on the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Latest session state: the transition that produced it plus the session
/// itself, if any.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// Shared session state with change notifications.
///
/// Starts signed out. Clones observe the same underlying channel.
#[derive(Clone)]
pub struct SessionEvents {
    tx: Arc<watch::Sender<AuthState>>,
}

impl SessionEvents {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState {
            event: AuthEvent::SignedOut,
            session: None,
        });
        Self { tx: Arc::new(tx) }
    }

    /// The current session, if signed in.
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().session.clone()
    }

    /// Subscribe to session transitions. The receiver starts with the
    /// current state already marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, event: AuthEvent, session: Option<Session>) {
        debug!(?event, signed_in = session.is_some(), "session state changed");
        self.tx.send_replace(AuthState { event, session });
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

/// Token endpoint response. `expires_in` is relative; the absolute expiry is
/// pinned against the local clock at receipt.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

/// Auth endpoint operations. Obtained via [`StoreClient::auth`].
#[derive(Clone)]
pub struct AuthApi {
    store: StoreClient,
}

impl AuthApi {
    pub(crate) fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Sign in with email and password. Publishes [`AuthEvent::SignedIn`] on
    /// success, so table requests immediately carry the new token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let url = self.store.auth_url("token");
        let request = self
            .store
            .request(Method::POST, &url)
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password });
        let response = StoreClient::check(request.send().await?).await?;
        let session = response.json::<TokenResponse>().await?.into_session();

        info!(user = %session.user.id, "signed in");
        self.store
            .session()
            .publish(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Sign out. The server-side revoke is best effort; local state is
    /// always cleared, so a dead network cannot keep an operator signed in.
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        if self.store.session().current().is_some() {
            let url = self.store.auth_url("logout");
            let outcome = async {
                StoreClient::check(self.store.request(Method::POST, &url).send().await?).await
            }
            .await;
            if let Err(error) = outcome {
                warn!(%error, "sign-out revoke failed; clearing local session anyway");
            }
        }
        self.store.session().publish(AuthEvent::SignedOut, None);
        info!("signed out");
        Ok(())
    }

    /// Exchange the current refresh token for a new token pair. Publishes
    /// [`AuthEvent::TokenRefreshed`].
    pub async fn refresh(&self) -> Result<Session, StoreError> {
        let current = self
            .store
            .session()
            .current()
            .ok_or(StoreError::NotSignedIn)?;
        let url = self.store.auth_url("token");
        let request = self
            .store
            .request(Method::POST, &url)
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshGrant {
                refresh_token: &current.refresh_token,
            });
        let response = StoreClient::check(request.send().await?).await?;
        let session = response.json::<TokenResponse>().await?.into_session();

        debug!(user = %session.user.id, "session refreshed");
        self.store
            .session()
            .publish(AuthEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    /// Ask the auth endpoint who the current token belongs to.
    pub async fn user(&self) -> Result<AuthUser, StoreError> {
        if self.store.session().current().is_none() {
            return Err(StoreError::NotSignedIn);
        }
        let url = self.store.auth_url("user");
        let response = StoreClient::check(self.store.request(Method::GET, &url).send().await?)
            .await?;
        Ok(response.json().await?)
    }

    /// Seed the client with a previously persisted session (no network
    /// call). The session may be expired; pair with [`AuthApi::refresh`].
    pub fn restore(&self, session: Session) {
        self.store
            .session()
            .publish(AuthEvent::SignedIn, Some(session));
    }

    /// Current session, if signed in.
    pub fn current(&self) -> Option<Session> {
        self.store.session().current()
    }

    /// Spawn a task that renews the access token shortly before it expires.
    ///
    /// The task follows sign-in/sign-out transitions: it idles while signed
    /// out and reschedules whenever the session changes. It runs until the
    /// handle is aborted or the runtime shuts down.
    pub fn spawn_refresh_task(&self) -> JoinHandle<()> {
        let auth = self.clone();
        let mut rx = auth.store.session().subscribe();
        tokio::spawn(async move {
            loop {
                let refresh_at = {
                    let state = rx.borrow_and_update();
                    state
                        .session
                        .as_ref()
                        .map(|s| s.expires_at - chrono::Duration::seconds(REFRESH_LEAD_SECS))
                };
                match refresh_at {
                    Some(at) => {
                        let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {
                                if let Err(error) = auth.refresh().await {
                                    warn!(%error, "background session refresh failed");
                                    tokio::time::sleep(REFRESH_RETRY).await;
                                }
                            }
                            changed = rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    None => {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
