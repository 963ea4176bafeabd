use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::marketplace::repository::{ListingNotification, ListingNotifier, NotificationError};

/// Posts `{ listing, creator }` as JSON to the automation endpoint.
pub struct WebhookNotifier {
    target: Option<(Client, Url)>,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            target: Some((client, endpoint)),
        })
    }

    /// A notifier with no endpoint: every notification is skipped.
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.target.as_ref().map(|(_, url)| url)
    }
}

#[async_trait]
impl ListingNotifier for WebhookNotifier {
    async fn notify(&self, event: &ListingNotification) -> Result<(), NotificationError> {
        let Some((client, endpoint)) = &self.target else {
            debug!(listing_id = %event.listing.id, "no webhook configured; notification skipped");
            return Ok(());
        };

        let response = client
            .post(endpoint.clone())
            .json(event)
            .send()
            .await
            .map_err(|err| NotificationError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Status(status.as_u16()));
        }
        Ok(())
    }
}
