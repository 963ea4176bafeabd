//! Process-local backend with hashed credentials and owner-only write rules.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::marketplace::domain::{
    AccessToken, AuthUser, Listing, ListingId, NewListing, Profile, ProfileSeed, Role, Session,
    UserId,
};
use crate::marketplace::forms::{Credentials, MIN_PASSWORD_LEN};
use crate::marketplace::repository::{
    AuthProvider, ListingStore, ProfileStore, ProviderError, SignUpOutcome,
};
use crate::marketplace::visibility::ListingScope;

const INVALID_CREDENTIALS: &str = "Invalid login credentials";
const ALREADY_REGISTERED: &str = "User already registered";
const EMAIL_NOT_CONFIRMED: &str = "Email not confirmed";
const INVALID_TOKEN: &str = "invalid JWT: unable to parse or verify signature";
const EXPIRED_TOKEN: &str = "JWT expired";
const UNKNOWN_REFRESH_TOKEN: &str = "Invalid Refresh Token: Refresh Token Not Found";

fn rls_violation(table: &str) -> ProviderError {
    ProviderError::Rejected(format!(
        "new row violates row-level security policy for table \"{table}\""
    ))
}

/// Auth provider, profile store and listing store held in memory.
///
/// Writes follow the same row rules as the hosted tables: a profile row can only be
/// written by its owner, and a listing can only be inserted by a hirer for themselves.
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    hasher: Argon2<'static>,
    session_ttl: Duration,
    confirm_email: bool,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    access: HashMap<String, Grant>,
    refresh: HashMap<String, RefreshGrant>,
    profiles: HashMap<UserId, Profile>,
    listings: Vec<Listing>,
    next_listing: u64,
}

struct Account {
    user: AuthUser,
    password_hash: String,
    confirmed: bool,
}

struct Grant {
    user: UserId,
    expires_at: DateTime<Utc>,
}

/// A refresh token and the access token it was issued alongside.
struct RefreshGrant {
    user: UserId,
    access_token: String,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        // Interactive-login strength is not needed for a local store.
        let params = Params::new(4096, 1, 1, None).unwrap_or_default();
        Self {
            state: Mutex::new(MemoryState::default()),
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            session_ttl: Duration::hours(1),
            confirm_email: false,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// New accounts must be confirmed with [`confirm`](Self::confirm) before signing in.
    pub fn with_email_confirmation(mut self) -> Self {
        self.confirm_email = true;
        self
    }

    /// Mark the account for `email` as confirmed. Returns false when there is no such account.
    pub fn confirm(&self, email: &str) -> bool {
        let mut state = self.lock();
        match state.accounts.get_mut(&normalize_email(email)) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    pub fn listing_count(&self) -> usize {
        self.lock().listings.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn hash(&self, password: &str) -> Result<String, ProviderError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .await
        .map_err(|err| ProviderError::Unavailable(format!("password hashing failed: {err}")))?
        .map_err(|err| ProviderError::Unavailable(format!("password hashing failed: {err}")))
    }

    async fn verify(&self, password: &str, stored: String) -> bool {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            PasswordHash::new(&stored)
                .map(|parsed| hasher.verify_password(password.as_bytes(), &parsed).is_ok())
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    fn issue(&self, state: &mut MemoryState, user: AuthUser) -> Session {
        let access_token = Uuid::new_v4().to_string();
        let refresh_token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        state.access.retain(|_, grant| grant.expires_at > now);
        state.access.insert(
            access_token.clone(),
            Grant {
                user: user.id.clone(),
                expires_at,
            },
        );
        state.refresh.insert(
            refresh_token.clone(),
            RefreshGrant {
                user: user.id.clone(),
                access_token: access_token.clone(),
            },
        );

        Session {
            access_token: AccessToken::new(access_token),
            refresh_token: Some(AccessToken::new(refresh_token)),
            expires_at: Some(expires_at),
            user,
        }
    }

    fn authorize(state: &MemoryState, token: &AccessToken) -> Result<UserId, ProviderError> {
        let grant = state
            .access
            .get(token.expose())
            .ok_or_else(|| ProviderError::Unauthorized(INVALID_TOKEN.to_string()))?;
        if grant.expires_at <= Utc::now() {
            return Err(ProviderError::Unauthorized(EXPIRED_TOKEN.to_string()));
        }
        Ok(grant.user.clone())
    }

    fn user_by_id(state: &MemoryState, id: &UserId) -> Option<AuthUser> {
        state
            .accounts
            .values()
            .find(|account| &account.user.id == id)
            .map(|account| account.user.clone())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, ProviderError> {
        let (user, password_hash, confirmed) = {
            let state = self.lock();
            let account = state
                .accounts
                .get(&normalize_email(&credentials.email))
                .ok_or_else(|| ProviderError::Rejected(INVALID_CREDENTIALS.to_string()))?;
            (
                account.user.clone(),
                account.password_hash.clone(),
                account.confirmed,
            )
        };

        if !self.verify(&credentials.password, password_hash).await {
            return Err(ProviderError::Rejected(INVALID_CREDENTIALS.to_string()));
        }
        if !confirmed {
            return Err(ProviderError::Rejected(EMAIL_NOT_CONFIRMED.to_string()));
        }

        let mut state = self.lock();
        Ok(self.issue(&mut state, user))
    }

    async fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> Result<SignUpOutcome, ProviderError> {
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::Rejected(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let email = normalize_email(&credentials.email);
        let password_hash = self.hash(&credentials.password).await?;

        let mut state = self.lock();
        if state.accounts.contains_key(&email) {
            return Err(ProviderError::Rejected(ALREADY_REGISTERED.to_string()));
        }

        let user = AuthUser {
            id: UserId(Uuid::new_v4().to_string()),
            email: Some(email.clone()),
            seed: Some(seed.clone()),
        };
        state.accounts.insert(
            email,
            Account {
                user: user.clone(),
                password_hash,
                confirmed: !self.confirm_email,
            },
        );
        debug!(user = %user.id, "account registered");

        if self.confirm_email {
            Ok(SignUpOutcome::ConfirmationRequired(user))
        } else {
            Ok(SignUpOutcome::SignedIn(self.issue(&mut state, user)))
        }
    }

    async fn sign_out(&self, session: &Session) -> Result<(), ProviderError> {
        let mut state = self.lock();
        let user = Self::authorize(&state, &session.access_token)?;
        state.access.retain(|_, grant| grant.user != user);
        state.refresh.retain(|_, grant| grant.user != user);
        Ok(())
    }

    async fn get_user(&self, token: &AccessToken) -> Result<AuthUser, ProviderError> {
        let state = self.lock();
        let id = Self::authorize(&state, token)?;
        Self::user_by_id(&state, &id)
            .ok_or_else(|| ProviderError::Unauthorized(INVALID_TOKEN.to_string()))
    }

    async fn refresh_session(&self, refresh_token: &AccessToken) -> Result<Session, ProviderError> {
        let mut state = self.lock();
        let previous = state
            .refresh
            .remove(refresh_token.expose())
            .ok_or_else(|| ProviderError::Rejected(UNKNOWN_REFRESH_TOKEN.to_string()))?;
        state.access.remove(&previous.access_token);
        let user = Self::user_by_id(&state, &previous.user)
            .ok_or_else(|| ProviderError::Rejected(UNKNOWN_REFRESH_TOKEN.to_string()))?;
        Ok(self.issue(&mut state, user))
    }
}

#[async_trait]
impl ProfileStore for InMemoryBackend {
    async fn read_profile(
        &self,
        session: &Session,
        user: &UserId,
    ) -> Result<Option<Profile>, ProviderError> {
        let state = self.lock();
        Self::authorize(&state, &session.access_token)?;
        Ok(state.profiles.get(user).cloned())
    }

    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> Result<(), ProviderError> {
        let mut state = self.lock();
        let caller = Self::authorize(&state, &session.access_token)?;
        if caller != profile.id {
            return Err(rls_violation("profiles"));
        }
        state.profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl ListingStore for InMemoryBackend {
    async fn query_listings(
        &self,
        session: &Session,
        scope: &ListingScope,
    ) -> Result<Vec<Listing>, ProviderError> {
        let state = self.lock();
        Self::authorize(&state, &session.access_token)?;

        // Later inserts win ties on created_at.
        let mut listings: Vec<Listing> = state
            .listings
            .iter()
            .rev()
            .filter(|listing| scope.admits(listing))
            .cloned()
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings)
    }

    async fn create_listing(
        &self,
        session: &Session,
        listing: &NewListing,
    ) -> Result<Listing, ProviderError> {
        let mut state = self.lock();
        let caller = Self::authorize(&state, &session.access_token)?;

        let is_hirer = state
            .profiles
            .get(&caller)
            .map(|profile| profile.role == Role::Hirer)
            .unwrap_or(false);
        if listing.owner() != &caller || !is_hirer {
            return Err(rls_violation("jobs"));
        }

        state.next_listing += 1;
        let id = ListingId(state.next_listing.to_string());
        let stored = listing.clone().into_listing(id);
        state.listings.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::domain::{AssistantType, ListingDraft};

    fn credentials(email: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: "hunter22".to_string(),
        }
    }

    fn seed(role: Role) -> ProfileSeed {
        ProfileSeed {
            full_name: "Pat Doe".to_string(),
            user_type: role,
        }
    }

    async fn registered(backend: &InMemoryBackend, email: &str, role: Role) -> Session {
        match backend
            .sign_up(&credentials(email), &seed(role))
            .await
            .expect("sign up succeeds")
        {
            SignUpOutcome::SignedIn(session) => session,
            other => panic!("expected a session, got {other:?}"),
        }
    }

    fn profile_for(session: &Session, role: Role) -> Profile {
        Profile {
            id: session.user_id().clone(),
            display_name: "Pat Doe".to_string(),
            role,
            time_zone: "EST".to_string(),
            hourly_rate: None,
            bio: String::new(),
            updated_at: None,
        }
    }

    fn draft(title: &str) -> ListingDraft {
        ListingDraft {
            title: title.to_string(),
            description: "Ongoing help".to_string(),
            assistant_type: AssistantType::General,
            hourly_rate: 12.0,
            time_zone: "EST".to_string(),
        }
    }

    #[tokio::test]
    async fn sign_in_checks_the_stored_hash() {
        let backend = InMemoryBackend::new();
        registered(&backend, "Pat@Example.com", Role::Hirer).await;

        let session = backend
            .sign_in_with_password(&credentials("pat@example.com"))
            .await
            .expect("case-insensitive email");
        assert_eq!(session.user.email.as_deref(), Some("pat@example.com"));

        let wrong = Credentials {
            email: "pat@example.com".to_string(),
            password: "not-it".to_string(),
        };
        let err = backend
            .sign_in_with_password(&wrong)
            .await
            .expect_err("bad password");
        assert_eq!(err, ProviderError::Rejected(INVALID_CREDENTIALS.to_string()));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let backend = InMemoryBackend::new();
        registered(&backend, "pat@example.com", Role::Hirer).await;
        let err = backend
            .sign_up(&credentials("pat@example.com"), &seed(Role::Hirer))
            .await
            .expect_err("already registered");
        assert_eq!(err, ProviderError::Rejected(ALREADY_REGISTERED.to_string()));
    }

    #[tokio::test]
    async fn confirmation_gate_blocks_sign_in_until_confirmed() {
        let backend = InMemoryBackend::new().with_email_confirmation();
        let outcome = backend
            .sign_up(&credentials("va@example.com"), &seed(Role::VirtualAssistant))
            .await
            .expect("sign up");
        assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired(_)));

        let err = backend
            .sign_in_with_password(&credentials("va@example.com"))
            .await
            .expect_err("unconfirmed");
        assert_eq!(err, ProviderError::Rejected(EMAIL_NOT_CONFIRMED.to_string()));

        assert!(backend.confirm("va@example.com"));
        backend
            .sign_in_with_password(&credentials("va@example.com"))
            .await
            .expect("confirmed account signs in");
    }

    #[tokio::test]
    async fn profile_rows_are_owner_writable_only() {
        let backend = InMemoryBackend::new();
        let owner = registered(&backend, "owner@example.com", Role::Hirer).await;
        let other = registered(&backend, "other@example.com", Role::Hirer).await;

        let profile = profile_for(&owner, Role::Hirer);
        let err = backend
            .upsert_profile(&other, &profile)
            .await
            .expect_err("foreign write");
        assert_eq!(err, rls_violation("profiles"));

        backend
            .upsert_profile(&owner, &profile)
            .await
            .expect("own write");
        let read = backend
            .read_profile(&other, owner.user_id())
            .await
            .expect("read");
        assert_eq!(read, Some(profile));
    }

    #[tokio::test]
    async fn only_hirers_insert_listings() {
        let backend = InMemoryBackend::new();
        let va = registered(&backend, "va@example.com", Role::VirtualAssistant).await;
        backend
            .upsert_profile(&va, &profile_for(&va, Role::VirtualAssistant))
            .await
            .expect("profile");

        let listing = NewListing::for_session(&va, draft("Inbox triage"), Utc::now());
        let err = backend
            .create_listing(&va, &listing)
            .await
            .expect_err("assistants cannot post");
        assert_eq!(err, rls_violation("jobs"));
        assert_eq!(backend.listing_count(), 0);
    }

    #[tokio::test]
    async fn listings_come_back_newest_first_with_insertion_tiebreak() {
        let backend = InMemoryBackend::new();
        let hirer = registered(&backend, "hirer@example.com", Role::Hirer).await;
        backend
            .upsert_profile(&hirer, &profile_for(&hirer, Role::Hirer))
            .await
            .expect("profile");

        let at = Utc::now();
        for title in ["first", "second"] {
            let listing = NewListing::for_session(&hirer, draft(title), at);
            backend
                .create_listing(&hirer, &listing)
                .await
                .expect("created");
        }
        let older = NewListing::for_session(&hirer, draft("older"), at - Duration::minutes(5));
        backend
            .create_listing(&hirer, &older)
            .await
            .expect("created");

        let titles: Vec<String> = backend
            .query_listings(&hirer, &ListingScope::Everyone)
            .await
            .expect("query")
            .into_iter()
            .map(|listing| listing.title)
            .collect();
        assert_eq!(titles, ["second", "first", "older"]);
    }

    #[tokio::test]
    async fn expired_and_revoked_tokens_are_unauthorized() {
        let backend = InMemoryBackend::new().with_session_ttl(Duration::seconds(-1));
        let session = registered(&backend, "pat@example.com", Role::Hirer).await;
        let err = backend
            .get_user(&session.access_token)
            .await
            .expect_err("expired");
        assert_eq!(err, ProviderError::Unauthorized(EXPIRED_TOKEN.to_string()));

        let refresh = session.refresh_token.clone().expect("refresh token");
        let renewed = backend
            .refresh_session(&refresh)
            .await
            .expect("refresh still valid");
        assert_ne!(renewed.access_token, session.access_token);
        let err = backend
            .refresh_session(&refresh)
            .await
            .expect_err("refresh tokens rotate");
        assert!(matches!(err, ProviderError::Rejected(_)));
    }

    #[tokio::test]
    async fn rotation_retires_the_previous_access_token() {
        let backend = InMemoryBackend::new();
        let mut session = registered(&backend, "pat@example.com", Role::Hirer).await;
        let first = session.access_token.clone();

        for _ in 0..5 {
            let refresh = session.refresh_token.clone().expect("refresh token");
            session = backend.refresh_session(&refresh).await.expect("refreshed");
        }

        assert_eq!(backend.lock().access.len(), 1);
        assert_eq!(backend.lock().refresh.len(), 1);
        let err = backend.get_user(&first).await.expect_err("retired token");
        assert_eq!(err, ProviderError::Unauthorized(INVALID_TOKEN.to_string()));
        backend
            .get_user(&session.access_token)
            .await
            .expect("current token valid");
    }

    #[tokio::test]
    async fn expired_grants_are_pruned_on_issue() {
        let backend = InMemoryBackend::new().with_session_ttl(Duration::seconds(-1));
        registered(&backend, "a@example.com", Role::Hirer).await;
        registered(&backend, "b@example.com", Role::Hirer).await;
        assert_eq!(backend.lock().access.len(), 1);
    }
}
