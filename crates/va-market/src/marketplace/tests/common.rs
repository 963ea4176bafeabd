use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use serde_json::Value;

use crate::backend::InMemoryBackend;
use crate::marketplace::domain::{Listing, NewListing, Profile, Role, Session, UserId};
use crate::marketplace::forms::{ListingForm, ProfileForm, RateInput, SignUpForm};
use crate::marketplace::repository::{
    ListingNotification, ListingNotifier, ListingStore, NotificationError, ProfileStore,
    ProviderError, SignUpOutcome,
};
use crate::marketplace::visibility::ListingScope;
use crate::marketplace::{marketplace_router, Marketplace, MarketplaceService, SessionContext};

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<ListingNotification>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<ListingNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl ListingNotifier for RecordingNotifier {
    async fn notify(&self, event: &ListingNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) struct FailingNotifier;

#[async_trait]
impl ListingNotifier for FailingNotifier {
    async fn notify(&self, _event: &ListingNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Status(500))
    }
}

/// Listing store wrapper that counts calls and can be told to fail queries.
pub(super) struct CountingListings {
    inner: Arc<InMemoryBackend>,
    calls: AtomicUsize,
    fail_queries: AtomicBool,
}

impl CountingListings {
    pub(super) fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_queries: AtomicBool::new(false),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingStore for CountingListings {
    async fn query_listings(
        &self,
        session: &Session,
        scope: &ListingScope,
    ) -> Result<Vec<Listing>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("connection reset".to_string()));
        }
        self.inner.query_listings(session, scope).await
    }

    async fn create_listing(
        &self,
        session: &Session,
        listing: &NewListing,
    ) -> Result<Listing, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_listing(session, listing).await
    }
}

/// Profile store wrapper that counts reads and writes.
pub(super) struct CountingProfiles {
    inner: Arc<InMemoryBackend>,
    calls: AtomicUsize,
}

impl CountingProfiles {
    pub(super) fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for CountingProfiles {
    async fn read_profile(
        &self,
        session: &Session,
        user: &UserId,
    ) -> Result<Option<Profile>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.read_profile(session, user).await
    }

    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_profile(session, profile).await
    }
}

pub(super) type MemoryService = MarketplaceService<InMemoryBackend, InMemoryBackend, RecordingNotifier>;

pub(super) fn memory_service(
    backend: &Arc<InMemoryBackend>,
    notifier: &Arc<RecordingNotifier>,
) -> MemoryService {
    MarketplaceService::new(backend.clone(), backend.clone(), notifier.clone())
}

pub(super) fn sign_up_form(email: &str, role: Role) -> SignUpForm {
    SignUpForm {
        full_name: Some("Pat Doe".to_string()),
        email: Some(email.to_string()),
        password: Some("hunter22".to_string()),
        user_type: Some(role.as_str().to_string()),
    }
}

/// Register straight against the backend, bypassing the session context.
pub(super) async fn registered(backend: &InMemoryBackend, email: &str, role: Role) -> Session {
    use crate::marketplace::repository::AuthProvider;

    let registration = sign_up_form(email, role)
        .validate()
        .expect("valid registration");
    match backend
        .sign_up(&registration.credentials, &registration.seed)
        .await
        .expect("sign up succeeds")
    {
        SignUpOutcome::SignedIn(session) => session,
        other => panic!("expected a session, got {other:?}"),
    }
}

pub(super) fn profile_form(name: &str, role: Role) -> ProfileForm {
    ProfileForm {
        full_name: Some(name.to_string()),
        user_type: Some(role.as_str().to_string()),
        time_zone: Some("EST".to_string()),
        hourly_rate: Some(RateInput::Amount(25.0)),
        bio: Some("Remote since 2019".to_string()),
    }
}

pub(super) fn listing_form(title: &str, hourly_rate: f64, time_zone: &str) -> ListingForm {
    ListingForm {
        title: Some(title.to_string()),
        description: Some("Plan and schedule posts across channels".to_string()),
        assistant_type: Some("social-media".to_string()),
        hourly_rate: Some(RateInput::Amount(hourly_rate)),
        time_zone: Some(time_zone.to_string()),
    }
}

/// A hirer with a saved profile, signed in directly against the backend.
pub(super) async fn hirer(service: &MemoryService, backend: &InMemoryBackend, email: &str) -> Session {
    let session = registered(backend, email, Role::Hirer).await;
    service
        .save_profile(&session, &profile_form("Hana Hirer", Role::Hirer))
        .await
        .expect("hirer profile saved");
    session
}

pub(super) struct Harness {
    pub(super) backend: Arc<InMemoryBackend>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) context: SessionContext,
    pub(super) router: axum::Router,
}

/// Full HTTP surface over the in-memory backend. The context is not initialized yet.
pub(super) fn harness() -> Harness {
    let backend = Arc::new(InMemoryBackend::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let context = SessionContext::new(backend.clone(), None);
    let service = memory_service(&backend, &notifier);
    let app = Arc::new(Marketplace::new(context.clone(), service));

    Harness {
        backend,
        notifier,
        context,
        router: marketplace_router(app),
    }
}

pub(super) fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
        .expect("request builds")
}

pub(super) fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
