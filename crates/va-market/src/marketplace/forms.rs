//! Form payloads and the required-field checks that run before any provider call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{AssistantType, ListingDraft, ProfileSeed, Role};

/// Lowest hourly rate a listing may advertise.
pub const MIN_LISTING_RATE: f64 = 5.0;

/// Minimum password length accepted by the sign-in and sign-up forms.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Inline, per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, &'static str>);

impl FieldErrors {
    pub fn insert(&mut self, field: &'static str, message: &'static str) {
        self.0.entry(field).or_insert(message);
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self.0.values().copied().collect::<Vec<_>>().join("; ");
        f.write_str(&joined)
    }
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn optional_text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// An hourly rate as submitted: a JSON number, or the text of a form input.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RateInput {
    Amount(f64),
    Text(String),
}

enum Rate {
    Blank,
    Amount(f64),
    NotANumber,
}

impl RateInput {
    fn read(value: &Option<RateInput>) -> Rate {
        match value {
            None => Rate::Blank,
            Some(RateInput::Amount(amount)) => Rate::Amount(*amount),
            Some(RateInput::Text(text)) if text.trim().is_empty() => Rate::Blank,
            Some(RateInput::Text(text)) => match text.trim().parse::<f64>() {
                Ok(amount) => Rate::Amount(amount),
                Err(_) => Rate::NotANumber,
            },
        }
    }
}

impl From<f64> for RateInput {
    fn from(amount: f64) -> Self {
        RateInput::Amount(amount)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignInForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    pub fn validate(&self) -> Result<Credentials, FieldErrors> {
        let mut errors = FieldErrors::default();
        let credentials = check_credentials(&self.email, &self.password, &mut errors);
        errors.into_result(|| credentials)
    }
}

fn check_credentials(
    email: &Option<String>,
    password: &Option<String>,
    errors: &mut FieldErrors,
) -> Credentials {
    let email = required(email).unwrap_or_else(|| {
        errors.insert("email", "Email is required");
        String::new()
    });

    // Passwords are compared verbatim, so they are not trimmed.
    let password = password.clone().unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert("password", "Password must be at least 6 characters");
    }

    Credentials { email, password }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignUpForm {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub credentials: Credentials,
    pub seed: ProfileSeed,
}

impl SignUpForm {
    pub fn validate(&self) -> Result<Registration, FieldErrors> {
        let mut errors = FieldErrors::default();

        let full_name = required(&self.full_name);
        if full_name.is_none() {
            errors.insert("full_name", "Full name is required");
        }
        let credentials = check_credentials(&self.email, &self.password, &mut errors);
        let role = required(&self.user_type).and_then(|raw| raw.parse::<Role>().ok());
        if role.is_none() {
            errors.insert("user_type", "Please select a user type");
        }

        match (full_name, role) {
            (Some(full_name), Some(user_type)) if errors.is_empty() => Ok(Registration {
                credentials,
                seed: ProfileSeed {
                    full_name,
                    user_type,
                },
            }),
            _ => Err(errors),
        }
    }
}

/// Account page submission.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub hourly_rate: Option<RateInput>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Profile fields that passed validation, ready to be keyed to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDraft {
    pub display_name: String,
    pub role: Role,
    pub time_zone: String,
    pub hourly_rate: Option<f64>,
    pub bio: String,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<ProfileDraft, FieldErrors> {
        let mut errors = FieldErrors::default();

        let display_name = required(&self.full_name);
        if display_name.is_none() {
            errors.insert("full_name", "Full name is required");
        }
        let role = required(&self.user_type).and_then(|raw| raw.parse::<Role>().ok());
        if role.is_none() {
            errors.insert("user_type", "User type is required");
        }

        let hourly_rate = match RateInput::read(&self.hourly_rate) {
            Rate::Blank => None,
            Rate::Amount(amount) if amount.is_finite() && amount >= 0.0 => Some(amount),
            Rate::Amount(_) | Rate::NotANumber => {
                errors.insert("hourly_rate", "Hourly rate must be a number");
                None
            }
        };

        match (display_name, role) {
            (Some(display_name), Some(role)) if errors.is_empty() => Ok(ProfileDraft {
                display_name,
                role,
                time_zone: optional_text(&self.time_zone),
                hourly_rate,
                bio: optional_text(&self.bio),
            }),
            _ => Err(errors),
        }
    }
}

/// "Post New Job" submission. Any owner field a client sends is ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListingForm {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assistant_type: Option<String>,
    #[serde(default)]
    pub hourly_rate: Option<RateInput>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl ListingForm {
    pub fn validate(&self) -> Result<ListingDraft, FieldErrors> {
        let mut errors = FieldErrors::default();

        let title = required(&self.title);
        if title.is_none() {
            errors.insert("title", "Job title is required");
        }
        let description = required(&self.description);
        if description.is_none() {
            errors.insert("description", "Job description is required");
        }
        let assistant_type =
            required(&self.assistant_type).and_then(|raw| raw.parse::<AssistantType>().ok());
        if assistant_type.is_none() {
            errors.insert("assistant_type", "Assistant type is required");
        }
        let hourly_rate = match RateInput::read(&self.hourly_rate) {
            Rate::Amount(amount) if amount.is_finite() && amount >= MIN_LISTING_RATE => {
                Some(amount)
            }
            Rate::Blank | Rate::Amount(_) | Rate::NotANumber => None,
        };
        if hourly_rate.is_none() {
            errors.insert("hourly_rate", "Hourly rate must be at least $5");
        }
        let time_zone = required(&self.time_zone);
        if time_zone.is_none() {
            errors.insert("time_zone", "Time zone is required");
        }

        match (title, description, assistant_type, hourly_rate, time_zone) {
            (
                Some(title),
                Some(description),
                Some(assistant_type),
                Some(hourly_rate),
                Some(time_zone),
            ) => Ok(ListingDraft {
                title,
                description,
                assistant_type,
                hourly_rate,
                time_zone,
            }),
            _ => Err(errors),
        }
    }
}
