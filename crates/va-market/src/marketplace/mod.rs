//! Hirer / virtual-assistant job marketplace: session handling, page routing,
//! role-scoped listing visibility, and the profile and listing controllers.

pub mod domain;
pub mod forms;
pub mod navigation;
pub mod notify;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;
pub mod views;
pub mod visibility;

#[cfg(test)]
mod tests;

pub use domain::{
    AccessToken, AssistantType, AuthUser, Listing, ListingDraft, ListingId, NewListing, Profile,
    ProfileSeed, Role, Session, UserId,
};
pub use forms::{FieldErrors, ListingForm, ProfileForm, RateInput, SignInForm, SignUpForm};
pub use navigation::{Navigation, RouterState, View, ViewRouter};
pub use notify::{NotificationHandle, NotificationOutcome};
pub use repository::{
    AuthProvider, ListingNotification, ListingNotifier, ListingStore, NotificationError,
    ProfileStore, ProviderError, SignUpOutcome,
};
pub use router::{marketplace_router, Marketplace};
pub use service::{MarketplaceError, MarketplaceService, PostedListing};
pub use session::{AuthEvent, SessionContext, SessionFile, SessionSnapshot, SessionSubscription};
pub use views::{AccountView, JobBoard};
pub use visibility::{ListingCapability, ListingScope, PostingDenied};
