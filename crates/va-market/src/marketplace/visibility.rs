//! Role-based rules deciding which listings a member may query or create.

use serde::Serialize;

use super::domain::{Listing, Profile, Role, UserId};

/// Query scope handed to the listing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingScope {
    /// Only listings owned by this user.
    OwnedBy(UserId),
    /// Every listing, regardless of owner.
    Everyone,
}

impl ListingScope {
    pub fn owner(&self) -> Option<&UserId> {
        match self {
            ListingScope::OwnedBy(owner) => Some(owner),
            ListingScope::Everyone => None,
        }
    }

    pub fn admits(&self, listing: &Listing) -> bool {
        match self {
            ListingScope::OwnedBy(owner) => &listing.owner == owner,
            ListingScope::Everyone => true,
        }
    }
}

/// What a role is allowed to do with listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingCapability {
    PostAndReviewOwn,
    BrowseAll,
}

impl ListingCapability {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Hirer => ListingCapability::PostAndReviewOwn,
            Role::VirtualAssistant => ListingCapability::BrowseAll,
        }
    }

    pub fn can_post(&self) -> bool {
        matches!(self, ListingCapability::PostAndReviewOwn)
    }

    pub fn heading(&self) -> &'static str {
        match self {
            ListingCapability::PostAndReviewOwn => "Your Posted Jobs",
            ListingCapability::BrowseAll => "Available Jobs",
        }
    }

    pub fn empty_message(&self) -> &'static str {
        match self {
            ListingCapability::PostAndReviewOwn => "You haven't posted any jobs yet.",
            ListingCapability::BrowseAll => "No jobs are currently available.",
        }
    }
}

/// Scope for the current cycle.
///
/// Without a loaded profile no scoping is applied and every listing is queried.
pub fn listing_scope(profile: Option<&Profile>) -> ListingScope {
    match profile {
        Some(profile) => match profile.role {
            Role::Hirer => ListingScope::OwnedBy(profile.id.clone()),
            Role::VirtualAssistant => ListingScope::Everyone,
        },
        None => ListingScope::Everyone,
    }
}

/// Refusal returned when a member without the hirer role tries to post.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostingDenied {
    #[error("complete your profile before posting jobs")]
    ProfileMissing,
    #[error("only hirers can post jobs")]
    NotAHirer,
}

pub fn ensure_can_post(profile: Option<&Profile>) -> Result<(), PostingDenied> {
    let profile = profile.ok_or(PostingDenied::ProfileMissing)?;
    match ListingCapability::for_role(profile.role) {
        ListingCapability::PostAndReviewOwn => Ok(()),
        ListingCapability::BrowseAll => Err(PostingDenied::NotAHirer),
    }
}
