use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier issued by the auth provider for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a stored job listing.
///
/// The backing table may hand out numeric or textual keys, so both are accepted
/// on the wire and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl<'de> Deserialize<'de> for ListingId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => ListingId(text),
            RawId::Number(number) => ListingId(number.to_string()),
        })
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two kinds of marketplace member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Hirer,
    VirtualAssistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hirer => "hirer",
            Role::VirtualAssistant => "virtual-assistant",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Hirer => "Hirer",
            Role::VirtualAssistant => "Virtual Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "hirer" => Ok(Role::Hirer),
            "virtual-assistant" => Ok(Role::VirtualAssistant),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Category of help a listing is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssistantType {
    General,
    SocialMedia,
    Content,
    CustomerService,
    DataEntry,
    Bookkeeping,
    Technical,
    Other,
}

impl AssistantType {
    pub const ALL: [AssistantType; 8] = [
        AssistantType::General,
        AssistantType::SocialMedia,
        AssistantType::Content,
        AssistantType::CustomerService,
        AssistantType::DataEntry,
        AssistantType::Bookkeeping,
        AssistantType::Technical,
        AssistantType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantType::General => "general",
            AssistantType::SocialMedia => "social-media",
            AssistantType::Content => "content",
            AssistantType::CustomerService => "customer-service",
            AssistantType::DataEntry => "data-entry",
            AssistantType::Bookkeeping => "bookkeeping",
            AssistantType::Technical => "technical",
            AssistantType::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssistantType::General => "General Virtual Assistant",
            AssistantType::SocialMedia => "Social Media Manager",
            AssistantType::Content => "Content Creator",
            AssistantType::CustomerService => "Customer Service",
            AssistantType::DataEntry => "Data Entry",
            AssistantType::Bookkeeping => "Bookkeeping",
            AssistantType::Technical => "Technical Assistant",
            AssistantType::Other => "Other",
        }
    }
}

impl FromStr for AssistantType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        AssistantType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownVariant(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised value '{0}'")]
pub struct UnknownVariant(pub String);

/// A member's profile row, keyed by their user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(rename = "full_name")]
    pub display_name: String,
    #[serde(rename = "user_type")]
    pub role: Role,
    #[serde(default, deserialize_with = "nullable_text")]
    pub time_zone: String,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default, deserialize_with = "nullable_text")]
    pub bio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Name and role captured at sign-up and stored as auth user metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSeed {
    pub full_name: String,
    pub user_type: Role,
}

/// A stored job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    #[serde(rename = "user_id")]
    pub owner: UserId,
    pub title: String,
    pub description: String,
    pub assistant_type: AssistantType,
    pub hourly_rate: f64,
    pub time_zone: String,
    pub created_at: DateTime<Utc>,
}

/// Listing fields that passed form validation, not yet bound to an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub assistant_type: AssistantType,
    pub hourly_rate: f64,
    pub time_zone: String,
}

/// Insert payload for the listing store.
///
/// The owner is always taken from the session that creates the listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    #[serde(rename = "user_id")]
    owner: UserId,
    pub title: String,
    pub description: String,
    pub assistant_type: AssistantType,
    pub hourly_rate: f64,
    pub time_zone: String,
    pub created_at: DateTime<Utc>,
}

impl NewListing {
    pub fn for_session(session: &Session, draft: ListingDraft, created_at: DateTime<Utc>) -> Self {
        let ListingDraft {
            title,
            description,
            assistant_type,
            hourly_rate,
            time_zone,
        } = draft;

        Self {
            owner: session.user.id.clone(),
            title,
            description,
            assistant_type,
            hourly_rate,
            time_zone,
            created_at,
        }
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn into_listing(self, id: ListingId) -> Listing {
        Listing {
            id,
            owner: self.owner,
            title: self.title,
            description: self.description,
            assistant_type: self.assistant_type,
            hourly_rate: self.hourly_rate,
            time_zone: self.time_zone,
            created_at: self.created_at,
        }
    }
}

/// Bearer credential issued by the auth provider. Never rendered.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// The identity half of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub seed: Option<ProfileSeed>,
}

/// Authenticated identity plus the provider's token lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: AccessToken,
    #[serde(default)]
    pub refresh_token: Option<AccessToken>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthUser,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

fn nullable_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
