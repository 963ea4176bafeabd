use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::domain::Session;
use super::forms::{FieldErrors, ListingForm, ProfileForm, SignInForm, SignUpForm};
use super::navigation::{Navigation, View, ViewRouter};
use super::repository::{ListingNotifier, ListingStore, ProfileStore, ProviderError, SignUpOutcome};
use super::service::{MarketplaceError, MarketplaceService, LISTING_POSTED, PROFILE_SAVED};
use super::session::SessionContext;
use super::views::{LandingView, LoginView};

pub const SIGNED_IN: &str = "Logged in successfully!";
pub const CONFIRM_EMAIL: &str = "Check your email for the confirmation link!";

/// Everything the HTTP surface needs: the session context, the view router
/// subscribed to it, and the profile/listing controllers.
pub struct Marketplace<P, L, N> {
    session: SessionContext,
    navigator: Mutex<ViewRouter>,
    service: MarketplaceService<P, L, N>,
}

impl<P, L, N> Marketplace<P, L, N>
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    pub fn new(session: SessionContext, service: MarketplaceService<P, L, N>) -> Self {
        let navigator = Mutex::new(ViewRouter::new(session.subscribe()));
        Self {
            session,
            navigator,
            service,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn service(&self) -> &MarketplaceService<P, L, N> {
        &self.service
    }

    /// Resolve `view` and hand back the session to render it with, or the response
    /// that replaces it.
    fn enter(&self, view: View) -> Result<Option<Session>, Response> {
        let mut navigator = self
            .navigator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match navigator.resolve(view) {
            Navigation::Render(_) => Ok(navigator.session().cloned()),
            Navigation::Redirect(target) => Err(Redirect::to(target.path()).into_response()),
            Navigation::Loading => Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "initializing" })),
            )
                .into_response()),
            Navigation::NotFound => Err(StatusCode::NOT_FOUND.into_response()),
        }
    }

    fn enter_signed_in(&self, view: View) -> Result<Session, Response> {
        match self.enter(view)? {
            Some(session) => Ok(session),
            None => Err(Redirect::to(View::Login.path()).into_response()),
        }
    }
}

/// Router exposing the four views and their form submissions.
pub fn marketplace_router<P, L, N>(app: Arc<Marketplace<P, L, N>>) -> Router
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    Router::new()
        .route("/", get(landing_handler::<P, L, N>))
        .route(
            "/login",
            get(login_page_handler::<P, L, N>).post(sign_in_handler::<P, L, N>),
        )
        .route("/signup", post(sign_up_handler::<P, L, N>))
        .route("/logout", post(sign_out_handler::<P, L, N>))
        .route(
            "/account",
            get(account_handler::<P, L, N>).post(save_profile_handler::<P, L, N>),
        )
        .route(
            "/jobs",
            get(jobs_handler::<P, L, N>).post(post_listing_handler::<P, L, N>),
        )
        .with_state(app)
}

pub(crate) async fn landing_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    match app.enter(View::Landing) {
        Ok(session) => Json(LandingView {
            view: View::Landing,
            signed_in: session.is_some(),
        })
        .into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn login_page_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    match app.enter(View::Login) {
        Ok(_) => Json(LoginView::new()).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn sign_in_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
    Json(form): Json<SignInForm>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    if let Err(response) = app.enter(View::Login) {
        return response;
    }
    let credentials = match form.validate() {
        Ok(credentials) => credentials,
        Err(errors) => return invalid_response(errors),
    };

    match app.session().sign_in_with_password(&credentials).await {
        Ok(_) => signed_in_response(),
        Err(err) => provider_response(&err),
    }
}

pub(crate) async fn sign_up_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
    Json(form): Json<SignUpForm>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    if let Err(response) = app.enter(View::Login) {
        return response;
    }
    let registration = match form.validate() {
        Ok(registration) => registration,
        Err(errors) => return invalid_response(errors),
    };

    match app.session().sign_up(&registration).await {
        Ok(SignUpOutcome::SignedIn(_)) => signed_in_response(),
        Ok(SignUpOutcome::ConfirmationRequired(_)) => {
            (StatusCode::OK, Json(json!({ "message": CONFIRM_EMAIL }))).into_response()
        }
        Err(err) => provider_response(&err),
    }
}

pub(crate) async fn sign_out_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    app.session().sign_out().await;
    Redirect::to(View::Landing.path()).into_response()
}

pub(crate) async fn account_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    let session = match app.enter_signed_in(View::Account) {
        Ok(session) => session,
        Err(response) => return response,
    };

    match app.service().account_view(&session).await {
        Ok(view) => Json(view).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn save_profile_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
    Json(form): Json<ProfileForm>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    let session = match app.enter_signed_in(View::Account) {
        Ok(session) => session,
        Err(response) => return response,
    };

    match app.service().save_profile(&session, &form).await {
        Ok(profile) => (
            StatusCode::OK,
            Json(json!({ "message": PROFILE_SAVED, "profile": profile })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn jobs_handler<P, L, N>(State(app): State<Arc<Marketplace<P, L, N>>>) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    let session = match app.enter_signed_in(View::Jobs) {
        Ok(session) => session,
        Err(response) => return response,
    };

    match app.service().job_board(&session).await {
        Ok(board) => Json(board).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn post_listing_handler<P, L, N>(
    State(app): State<Arc<Marketplace<P, L, N>>>,
    Json(form): Json<ListingForm>,
) -> Response
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    let session = match app.enter_signed_in(View::Jobs) {
        Ok(session) => session,
        Err(response) => return response,
    };

    // The notification handle is dropped here; delivery continues in the background.
    match app.service().post_listing(&session, &form).await {
        Ok(posted) => (
            StatusCode::CREATED,
            Json(json!({
                "message": LISTING_POSTED,
                "listing": posted.listing,
                "board": posted.board,
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

fn signed_in_response() -> Response {
    (
        StatusCode::OK,
        Json(json!({ "message": SIGNED_IN, "redirect": View::Jobs.path() })),
    )
        .into_response()
}

fn invalid_response(errors: FieldErrors) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "errors": errors })),
    )
        .into_response()
}

fn provider_response(err: &ProviderError) -> Response {
    let status = match err {
        ProviderError::Rejected(_) => StatusCode::BAD_REQUEST,
        ProviderError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ProviderError::Unavailable(_) | ProviderError::Decode(_) => {
            error!(error = %err, "backend call failed");
            StatusCode::BAD_GATEWAY
        }
    };
    (status, Json(json!({ "message": err.to_string() }))).into_response()
}

fn error_response(err: MarketplaceError) -> Response {
    match err {
        MarketplaceError::Invalid(errors) => invalid_response(errors),
        MarketplaceError::Denied(denied) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": denied.to_string() })),
        )
            .into_response(),
        MarketplaceError::Provider(err) => provider_response(&err),
    }
}
