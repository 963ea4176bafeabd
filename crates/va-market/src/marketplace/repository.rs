use async_trait::async_trait;
use serde::Serialize;

use super::domain::{AccessToken, AuthUser, Listing, NewListing, Profile, ProfileSeed, Session, UserId};
use super::forms::Credentials;
use super::visibility::ListingScope;

/// Remote half of the session provider: credential exchange and token lifecycle.
///
/// The locally held session lives in [`SessionContext`](super::session::SessionContext).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, credentials: &Credentials)
        -> Result<Session, ProviderError>;
    async fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> Result<SignUpOutcome, ProviderError>;
    async fn sign_out(&self, session: &Session) -> Result<(), ProviderError>;
    async fn get_user(&self, token: &AccessToken) -> Result<AuthUser, ProviderError>;
    async fn refresh_session(&self, refresh_token: &AccessToken) -> Result<Session, ProviderError>;
}

/// Result of registering a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The provider signed the user straight in.
    SignedIn(Session),
    /// The provider wants the email address confirmed first.
    ConfirmationRequired(AuthUser),
}

/// One profile row per user, readable and writable by its owner.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn read_profile(
        &self,
        session: &Session,
        user: &UserId,
    ) -> Result<Option<Profile>, ProviderError>;
    /// Insert-if-absent, overwrite-if-present, keyed by `profile.id`.
    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> Result<(), ProviderError>;
}

/// Job listings, returned newest first.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn query_listings(
        &self,
        session: &Session,
        scope: &ListingScope,
    ) -> Result<Vec<Listing>, ProviderError>;
    async fn create_listing(
        &self,
        session: &Session,
        listing: &NewListing,
    ) -> Result<Listing, ProviderError>;
}

/// Failure reported by the backend-as-a-service. The message is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

/// Outbound hook fired after a listing is published (e.g. an automation webhook).
#[async_trait]
pub trait ListingNotifier: Send + Sync {
    async fn notify(&self, event: &ListingNotification) -> Result<(), NotificationError>;
}

/// Body posted to the notification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingNotification {
    pub listing: Listing,
    pub creator: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification endpoint responded with status {0}")]
    Status(u16),
}
