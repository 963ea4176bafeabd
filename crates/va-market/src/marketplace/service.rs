use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::domain::{Listing, NewListing, Profile, Session};
use super::forms::{FieldErrors, ListingForm, ProfileForm};
use super::notify::{dispatch, NotificationHandle};
use super::repository::{
    ListingNotification, ListingNotifier, ListingStore, ProfileStore, ProviderError,
};
use super::views::{AccountView, JobBoard};
use super::visibility::{ensure_can_post, listing_scope, ListingCapability, PostingDenied};

pub const PROFILE_SAVED: &str = "Profile updated successfully!";
pub const LISTING_POSTED: &str = "Job posted successfully!";

/// Profile and listing controllers over the profile store, listing store, and notifier.
pub struct MarketplaceService<P, L, N> {
    profiles: Arc<P>,
    listings: Arc<L>,
    notifier: Arc<N>,
}

/// A freshly created listing with the refreshed board and the in-flight notification.
#[derive(Debug)]
pub struct PostedListing {
    pub listing: Listing,
    pub board: Option<JobBoard>,
    pub notification: NotificationHandle,
}

impl<P, L, N> MarketplaceService<P, L, N>
where
    P: ProfileStore + 'static,
    L: ListingStore + 'static,
    N: ListingNotifier + 'static,
{
    pub fn new(profiles: Arc<P>, listings: Arc<L>, notifier: Arc<N>) -> Self {
        Self {
            profiles,
            listings,
            notifier,
        }
    }

    pub async fn load_profile(&self, session: &Session) -> Result<Option<Profile>, MarketplaceError> {
        let profile = self
            .profiles
            .read_profile(session, session.user_id())
            .await?;
        Ok(profile)
    }

    /// Account page contents, pre-filled from sign-up details until a profile is saved.
    pub async fn account_view(&self, session: &Session) -> Result<AccountView, MarketplaceError> {
        let email = session.user.email.clone();
        let view = match self.load_profile(session).await? {
            Some(profile) => AccountView::from_profile(email, &profile),
            None => {
                let mut form = ProfileForm::default();
                if let Some(seed) = &session.user.seed {
                    form.full_name = Some(seed.full_name.clone());
                    form.user_type = Some(seed.user_type.as_str().to_string());
                }
                AccountView::unsaved(email, form)
            }
        };
        Ok(view)
    }

    /// Validate and upsert the signed-in user's profile.
    pub async fn save_profile(
        &self,
        session: &Session,
        form: &ProfileForm,
    ) -> Result<Profile, MarketplaceError> {
        let draft = form.validate().map_err(MarketplaceError::Invalid)?;

        let profile = Profile {
            id: session.user_id().clone(),
            display_name: draft.display_name,
            role: draft.role,
            time_zone: draft.time_zone,
            hourly_rate: draft.hourly_rate,
            bio: draft.bio,
            updated_at: Some(Utc::now()),
        };

        self.profiles.upsert_profile(session, &profile).await?;
        info!(user = %profile.id, role = %profile.role, "profile saved");
        Ok(profile)
    }

    /// Listings visible to the signed-in member, newest first.
    pub async fn job_board(&self, session: &Session) -> Result<JobBoard, MarketplaceError> {
        let profile = self.load_profile(session).await?;
        self.board_for(session, profile.as_ref()).await
    }

    async fn board_for(
        &self,
        session: &Session,
        profile: Option<&Profile>,
    ) -> Result<JobBoard, MarketplaceError> {
        let scope = listing_scope(profile);
        let listings = self.listings.query_listings(session, &scope).await?;

        let Some(profile) = profile else {
            debug!(user = %session.user_id(), "profile not loaded; listing query left unscoped");
            return Ok(JobBoard::unscoped(listings));
        };
        Ok(JobBoard::for_capability(
            ListingCapability::for_role(profile.role),
            listings,
        ))
    }

    /// Create a listing owned by the session user, notify the automation hook, and
    /// return the refreshed board.
    pub async fn post_listing(
        &self,
        session: &Session,
        form: &ListingForm,
    ) -> Result<PostedListing, MarketplaceError> {
        let draft = form.validate().map_err(MarketplaceError::Invalid)?;

        let profile = self.load_profile(session).await?;
        ensure_can_post(profile.as_ref())?;

        let new_listing = NewListing::for_session(session, draft, Utc::now());
        let listing = self.listings.create_listing(session, &new_listing).await?;
        info!(listing_id = %listing.id, owner = %listing.owner, "listing created");

        let notification = dispatch(
            self.notifier.clone(),
            ListingNotification {
                listing: listing.clone(),
                creator: profile.clone(),
            },
        );

        // The listing is committed at this point, so a failed refresh is not an error.
        let board = match self.board_for(session, profile.as_ref()).await {
            Ok(board) => Some(board),
            Err(err) => {
                warn!(error = %err, "listing created but the board could not be refreshed");
                None
            }
        };

        Ok(PostedListing {
            listing,
            board,
            notification,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("{0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Denied(#[from] PostingDenied),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
