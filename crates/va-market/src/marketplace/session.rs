//! The process-wide session context.
//!
//! One [`SessionContext`] exists per client process. It is created before the first
//! request is served, holds the only local copy of the session, and publishes every
//! change on a watch channel that the view router (and anything else) subscribes to.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::domain::{AuthUser, Session};
use super::forms::{Credentials, Registration};
use super::repository::{AuthProvider, ProviderError, SignUpOutcome};

/// Shortest pause between two automatic refreshes.
pub const MIN_REFRESH_WAIT: Duration = Duration::from_secs(1);

/// How long to sleep before refreshing a session that expires in `remaining`.
///
/// Aims for `margin` before expiry, but never earlier than halfway through the
/// remaining lifetime, so short-lived tokens do not trigger back-to-back refreshes.
pub fn refresh_wait(remaining: Duration, margin: Duration) -> Duration {
    remaining
        .saturating_sub(margin)
        .max(remaining / 2)
        .max(MIN_REFRESH_WAIT)
}

/// Why the session changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Value carried on the session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSnapshot {
    /// No session check has completed yet.
    Unknown,
    Resolved {
        event: AuthEvent,
        session: Option<Session>,
    },
}

impl SessionSnapshot {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionSnapshot::Unknown => None,
            SessionSnapshot::Resolved { session, .. } => session.as_ref(),
        }
    }
}

#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    provider: Arc<dyn AuthProvider>,
    state: watch::Sender<SessionSnapshot>,
    persistence: Option<SessionFile>,
}

impl SessionContext {
    pub fn new(provider: Arc<dyn AuthProvider>, persistence: Option<SessionFile>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::Unknown);
        Self {
            inner: Arc::new(ContextInner {
                provider,
                state,
                persistence,
            }),
        }
    }

    /// Restore and re-check any persisted session, then publish the initial state.
    ///
    /// Failures degrade to an anonymous start; nothing here is fatal.
    pub async fn initialize(&self) -> Option<Session> {
        let restored = match &self.inner.persistence {
            Some(file) => file.load().await.unwrap_or_else(|err| {
                warn!(path = %file.path().display(), error = %err, "ignoring unreadable session file");
                None
            }),
            None => None,
        };

        let session = match restored {
            Some(session) => self.revalidate(session).await,
            None => None,
        };

        self.publish(AuthEvent::InitialSession, session.clone()).await;
        session
    }

    async fn revalidate(&self, session: Session) -> Option<Session> {
        if session.is_expired(Utc::now()) {
            debug!("persisted session expired; attempting refresh");
            let refresh_token = session.refresh_token.as_ref()?;
            return match self.inner.provider.refresh_session(refresh_token).await {
                Ok(refreshed) => Some(refreshed),
                Err(err) => {
                    warn!(error = %err, "could not refresh persisted session");
                    None
                }
            };
        }

        match self.inner.provider.get_user(&session.access_token).await {
            Ok(user) => Some(Session { user, ..session }),
            Err(ProviderError::Unauthorized(reason)) => {
                info!(%reason, "persisted session rejected by provider");
                None
            }
            Err(err) => {
                warn!(error = %err, "could not verify persisted session; keeping local copy");
                Some(session)
            }
        }
    }

    /// Current unexpired session, if any.
    pub fn get_session(&self) -> Option<Session> {
        let snapshot = self.inner.state.borrow();
        snapshot
            .session()
            .filter(|session| !session.is_expired(Utc::now()))
            .cloned()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to session changes. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> SessionSubscription {
        trace!("session subscription acquired");
        SessionSubscription {
            receiver: self.inner.state.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.receiver_count()
    }

    pub async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, ProviderError> {
        let session = self.inner.provider.sign_in_with_password(credentials).await?;
        self.publish(AuthEvent::SignedIn, Some(session.clone())).await;
        Ok(session)
    }

    pub async fn sign_up(&self, registration: &Registration) -> Result<SignUpOutcome, ProviderError> {
        let outcome = self
            .inner
            .provider
            .sign_up(&registration.credentials, &registration.seed)
            .await?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            self.publish(AuthEvent::SignedIn, Some(session.clone())).await;
        }
        Ok(outcome)
    }

    /// Tear the session down locally, revoking it remotely on a best-effort basis.
    pub async fn sign_out(&self) {
        let current = self.inner.state.borrow().session().cloned();
        if let Some(session) = current {
            if let Err(err) = self.inner.provider.sign_out(&session).await {
                warn!(error = %err, "remote sign-out failed; clearing local session anyway");
            }
        }
        self.publish(AuthEvent::SignedOut, None).await;
    }

    /// Fetch the signed-in user from the provider.
    pub async fn current_user(&self) -> Result<Option<AuthUser>, ProviderError> {
        match self.get_session() {
            Some(session) => self
                .inner
                .provider
                .get_user(&session.access_token)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Exchange the refresh token for a new session. Clears the session when that fails.
    pub async fn refresh(&self) -> Result<Option<Session>, ProviderError> {
        let current = self.inner.state.borrow().session().cloned();
        let Some(refresh_token) = current.and_then(|session| session.refresh_token) else {
            self.publish(AuthEvent::SignedOut, None).await;
            return Ok(None);
        };

        match self.inner.provider.refresh_session(&refresh_token).await {
            Ok(session) => {
                self.publish(AuthEvent::TokenRefreshed, Some(session.clone()))
                    .await;
                Ok(Some(session))
            }
            Err(err) => {
                self.publish(AuthEvent::SignedOut, None).await;
                Err(err)
            }
        }
    }

    /// Refresh the session `margin` before it expires, for as long as the task lives.
    pub fn spawn_auto_refresh(&self, margin: Duration) -> JoinHandle<()> {
        let context = self.clone();
        let mut subscription = self.subscribe();

        tokio::spawn(async move {
            loop {
                let deadline = subscription
                    .snapshot()
                    .session()
                    .and_then(|session| session.expires_at);

                let Some(expires_at) = deadline else {
                    if subscription.changed().await.is_none() {
                        break;
                    }
                    continue;
                };

                let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                let wait = refresh_wait(remaining, margin);
                trace!(?wait, "next session refresh scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if let Err(err) = context.refresh().await {
                            warn!(error = %err, "session refresh failed; signed out");
                        }
                    }
                    changed = subscription.changed() => {
                        if changed.is_none() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn publish(&self, event: AuthEvent, session: Option<Session>) {
        if let Some(file) = &self.inner.persistence {
            let result = match &session {
                Some(session) => file.store(session).await,
                None => file.clear().await,
            };
            if let Err(err) = result {
                warn!(path = %file.path().display(), error = %err, "session file not updated");
            }
        }

        info!(
            ?event,
            user = session.as_ref().map(|s| s.user.id.0.as_str()),
            "session changed"
        );
        self.inner
            .state
            .send_replace(SessionSnapshot::Resolved { event, session });
    }
}

/// Scoped subscription to session changes.
pub struct SessionSubscription {
    receiver: watch::Receiver<SessionSnapshot>,
}

impl SessionSubscription {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.receiver.borrow().clone()
    }

    /// The latest snapshot if it changed since the last time it was taken.
    pub fn take_update(&mut self) -> Option<SessionSnapshot> {
        match self.receiver.has_changed() {
            Ok(true) => Some(self.receiver.borrow_and_update().clone()),
            _ => None,
        }
    }

    /// Wait for the next change. `None` once the context is gone.
    pub async fn changed(&mut self) -> Option<SessionSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        trace!("session subscription released");
    }
}

/// JSON file holding the persisted session between runs.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionFileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed session file: {0}")]
    Format(#[from] serde_json::Error),
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<Session>, SessionFileError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn store(&self, session: &Session) -> Result<(), SessionFileError> {
        let bytes = serde_json::to_vec(session)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), SessionFileError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
