//! JSON view models returned to the browser.

use serde::Serialize;

use super::domain::{AssistantType, Listing, Profile, Role};
use super::forms::{ProfileForm, RateInput};
use super::navigation::View;
use super::visibility::ListingCapability;

#[derive(Debug, Clone, Serialize)]
pub struct LandingView {
    pub view: View,
    pub signed_in: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginView {
    pub view: View,
    pub roles: Vec<OptionView>,
}

impl LoginView {
    pub fn new() -> Self {
        Self {
            view: View::Login,
            roles: role_options(),
        }
    }
}

impl Default for LoginView {
    fn default() -> Self {
        Self::new()
    }
}

/// A `<select>` option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub value: &'static str,
    pub label: &'static str,
}

pub fn role_options() -> Vec<OptionView> {
    [Role::Hirer, Role::VirtualAssistant]
        .into_iter()
        .map(|role| OptionView {
            value: role.as_str(),
            label: role.label(),
        })
        .collect()
}

pub fn assistant_type_options() -> Vec<OptionView> {
    AssistantType::ALL
        .into_iter()
        .map(|kind| OptionView {
            value: kind.as_str(),
            label: kind.label(),
        })
        .collect()
}

/// Account page: the stored profile, or the sign-up details as a starting point.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub view: View,
    pub email: Option<String>,
    pub profile_saved: bool,
    pub form: ProfileForm,
    pub roles: Vec<OptionView>,
}

impl AccountView {
    pub fn from_profile(email: Option<String>, profile: &Profile) -> Self {
        Self {
            view: View::Account,
            email,
            profile_saved: true,
            form: ProfileForm {
                full_name: Some(profile.display_name.clone()),
                user_type: Some(profile.role.as_str().to_string()),
                time_zone: Some(profile.time_zone.clone()),
                hourly_rate: profile.hourly_rate.map(RateInput::from),
                bio: Some(profile.bio.clone()),
            },
            roles: role_options(),
        }
    }

    pub fn unsaved(email: Option<String>, form: ProfileForm) -> Self {
        Self {
            view: View::Account,
            email,
            profile_saved: false,
            form,
            roles: role_options(),
        }
    }
}

/// Job board for the signed-in member.
#[derive(Debug, Clone, Serialize)]
pub struct JobBoard {
    pub view: View,
    pub heading: &'static str,
    /// False when no profile was found, so the query ran unscoped.
    pub profile_loaded: bool,
    pub can_post_listing: bool,
    pub listings: Vec<Listing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assistant_types: Vec<OptionView>,
}

impl JobBoard {
    /// Board shown before the member has saved a profile: every listing, no posting.
    pub fn unscoped(listings: Vec<Listing>) -> Self {
        let capability = ListingCapability::BrowseAll;
        Self {
            profile_loaded: false,
            ..Self::for_capability(capability, listings)
        }
    }

    pub fn for_capability(capability: ListingCapability, listings: Vec<Listing>) -> Self {
        let empty_message = listings.is_empty().then(|| capability.empty_message());
        let assistant_types = if capability.can_post() {
            assistant_type_options()
        } else {
            Vec::new()
        };

        Self {
            view: View::Jobs,
            heading: capability.heading(),
            profile_loaded: true,
            can_post_listing: capability.can_post(),
            listings,
            empty_message,
            assistant_types,
        }
    }
}
