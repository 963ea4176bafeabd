//! Reqwest adapter for a Supabase project: GoTrue under `auth/v1`, PostgREST under `rest/v1`.
//!
//! The adapter owns transport details only. Row rules, ordering and the shape of the
//! `profiles` and `jobs` tables live in the hosted project.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::SupabaseConfig;
use crate::marketplace::domain::{
    AccessToken, AuthUser, Listing, NewListing, Profile, ProfileSeed, Session, UserId,
};
use crate::marketplace::forms::Credentials;
use crate::marketplace::repository::{
    AuthProvider, ListingStore, ProfileStore, ProviderError, SignUpOutcome,
};
use crate::marketplace::visibility::ListingScope;

const PROFILES: &str = "rest/v1/profiles";
const JOBS: &str = "rest/v1/jobs";

pub struct SupabaseBackend {
    client: Client,
    base: Url,
    anon_key: String,
}

impl SupabaseBackend {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            anon_key: config.anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|err| ProviderError::Unavailable(format!("invalid endpoint {path}: {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Request carrying the project key, authorised as `bearer` (the anon key when signed out).
    fn request(&self, method: Method, url: Url, bearer: Option<&AccessToken>) -> RequestBuilder {
        let bearer = bearer.map(AccessToken::expose).unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", self.anon_key.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .header(header::ACCEPT, "application/json")
    }

    async fn token_grant<B: Serialize + ?Sized>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<Session, ProviderError> {
        let url = self.endpoint("auth/v1/token", &[("grant_type", grant_type)])?;
        let response = send(self.request(Method::POST, url, None).json(body)).await?;
        let token: TokenDto = decode(response).await?;
        Ok(token.into_session(Utc::now()))
    }
}

#[async_trait]
impl AuthProvider for SupabaseBackend {
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, ProviderError> {
        #[derive(Serialize)]
        struct PasswordGrant<'a> {
            email: &'a str,
            password: &'a str,
        }

        self.token_grant(
            "password",
            &PasswordGrant {
                email: &credentials.email,
                password: &credentials.password,
            },
        )
        .await
    }

    async fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> Result<SignUpOutcome, ProviderError> {
        #[derive(Serialize)]
        struct SignUpBody<'a> {
            email: &'a str,
            password: &'a str,
            data: &'a ProfileSeed,
        }

        let url = self.endpoint("auth/v1/signup", &[])?;
        let body = SignUpBody {
            email: &credentials.email,
            password: &credentials.password,
            data: seed,
        };
        let response = send(self.request(Method::POST, url, None).json(&body)).await?;

        match decode::<SignUpDto>(response).await? {
            SignUpDto::Session(token) => Ok(SignUpOutcome::SignedIn(token.into_session(Utc::now()))),
            SignUpDto::User(user) => Ok(SignUpOutcome::ConfirmationRequired(user.into())),
        }
    }

    async fn sign_out(&self, session: &Session) -> Result<(), ProviderError> {
        let url = self.endpoint("auth/v1/logout", &[])?;
        send(self.request(Method::POST, url, Some(&session.access_token))).await?;
        Ok(())
    }

    async fn get_user(&self, token: &AccessToken) -> Result<AuthUser, ProviderError> {
        let url = self.endpoint("auth/v1/user", &[])?;
        let response = send(self.request(Method::GET, url, Some(token))).await?;
        let user: UserDto = decode(response).await?;
        Ok(user.into())
    }

    async fn refresh_session(&self, refresh_token: &AccessToken) -> Result<Session, ProviderError> {
        #[derive(Serialize)]
        struct RefreshGrant<'a> {
            refresh_token: &'a str,
        }

        self.token_grant(
            "refresh_token",
            &RefreshGrant {
                refresh_token: refresh_token.expose(),
            },
        )
        .await
    }
}

#[async_trait]
impl ProfileStore for SupabaseBackend {
    async fn read_profile(
        &self,
        session: &Session,
        user: &UserId,
    ) -> Result<Option<Profile>, ProviderError> {
        let filter = format!("eq.{user}");
        let url = self.endpoint(PROFILES, &[("id", filter.as_str()), ("select", "*")])?;
        let response = send(self.request(Method::GET, url, Some(&session.access_token))).await?;
        let rows: Vec<Profile> = decode(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> Result<(), ProviderError> {
        let url = self.endpoint(PROFILES, &[])?;
        send(
            self.request(Method::POST, url, Some(&session.access_token))
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(profile),
        )
        .await?;
        debug!(user = %profile.id, "profile row upserted");
        Ok(())
    }
}

#[async_trait]
impl ListingStore for SupabaseBackend {
    async fn query_listings(
        &self,
        session: &Session,
        scope: &ListingScope,
    ) -> Result<Vec<Listing>, ProviderError> {
        let owner_filter = scope.owner().map(|owner| format!("eq.{owner}"));
        let mut query = vec![("select", "*"), ("order", "created_at.desc")];
        if let Some(filter) = owner_filter.as_deref() {
            query.push(("user_id", filter));
        }

        let url = self.endpoint(JOBS, &query)?;
        let response = send(self.request(Method::GET, url, Some(&session.access_token))).await?;
        decode(response).await
    }

    async fn create_listing(
        &self,
        session: &Session,
        listing: &NewListing,
    ) -> Result<Listing, ProviderError> {
        let url = self.endpoint(JOBS, &[])?;
        let response = send(
            self.request(Method::POST, url, Some(&session.access_token))
                .header("Prefer", "return=representation")
                .json(listing),
        )
        .await?;

        let rows: Vec<Listing> = decode(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("insert returned no rows".to_string()))
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.map_err(map_transport_error)?;
    Err(map_status_error(status, body.as_ref()))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let body = response.bytes().await.map_err(map_transport_error)?;
    serde_json::from_slice(&body).map_err(|err| ProviderError::Decode(err.to_string()))
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unavailable("request timed out".to_string())
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> ProviderError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized(message),
        status if status.is_client_error() => ProviderError::Rejected(message),
        _ => ProviderError::Unavailable(message),
    }
}

/// GoTrue and PostgREST disagree on where the human-readable text goes.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TokenDto {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserDto,
}

impl TokenDto {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });

        Session {
            access_token: AccessToken::new(self.access_token),
            refresh_token: self.refresh_token.map(AccessToken::new),
            expires_at,
            user: self.user.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<serde_json::Value>,
}

impl From<UserDto> for AuthUser {
    fn from(dto: UserDto) -> Self {
        let seed = dto
            .user_metadata
            .and_then(|meta| serde_json::from_value::<ProfileSeed>(meta).ok());
        AuthUser {
            id: UserId(dto.id),
            email: dto.email,
            seed,
        }
    }
}

/// Sign-up answers with a session when auto-confirm is on, otherwise with the bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpDto {
    Session(TokenDto),
    User(UserDto),
}
