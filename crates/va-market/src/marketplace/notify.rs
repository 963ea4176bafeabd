use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::repository::{ListingNotification, ListingNotifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    Failed(String),
}

/// Handle to a detached notification. Dropping it leaves the delivery running.
#[derive(Debug)]
pub struct NotificationHandle(JoinHandle<NotificationOutcome>);

impl NotificationHandle {
    /// Wait for the delivery attempt to settle.
    pub async fn outcome(self) -> NotificationOutcome {
        match self.0.await {
            Ok(outcome) => outcome,
            Err(err) => NotificationOutcome::Failed(err.to_string()),
        }
    }
}

/// Send the notification on its own task. Failures are logged, never returned.
pub fn dispatch<N>(notifier: Arc<N>, event: ListingNotification) -> NotificationHandle
where
    N: ListingNotifier + 'static,
{
    NotificationHandle(tokio::spawn(async move {
        match notifier.notify(&event).await {
            Ok(()) => {
                debug!(listing_id = %event.listing.id, "listing notification delivered");
                NotificationOutcome::Delivered
            }
            Err(err) => {
                warn!(
                    listing_id = %event.listing.id,
                    error = %err,
                    "listing notification failed; the listing stays published"
                );
                NotificationOutcome::Failed(err.to_string())
            }
        }
    }))
}
