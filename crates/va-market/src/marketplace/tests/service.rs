use std::sync::Arc;

use super::common::*;
use crate::backend::InMemoryBackend;
use crate::marketplace::domain::Role;
use crate::marketplace::notify::NotificationOutcome;
use crate::marketplace::repository::ProviderError;
use crate::marketplace::service::{MarketplaceError, MarketplaceService};
use crate::marketplace::visibility::PostingDenied;
use crate::marketplace::ListingForm;

fn setup() -> (Arc<InMemoryBackend>, Arc<RecordingNotifier>, MemoryService) {
    let backend = Arc::new(InMemoryBackend::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = memory_service(&backend, &notifier);
    (backend, notifier, service)
}

#[tokio::test]
async fn saved_profile_reads_back_with_submitted_fields() {
    let (backend, _, service) = setup();
    let session = registered(&backend, "va@example.com", Role::VirtualAssistant).await;

    let saved = service
        .save_profile(&session, &profile_form("Vera Assist", Role::VirtualAssistant))
        .await
        .expect("profile saved");
    let loaded = service
        .load_profile(&session)
        .await
        .expect("profile read")
        .expect("profile exists");

    assert_eq!(loaded, saved);
    assert_eq!(loaded.id, *session.user_id());
    assert_eq!(loaded.display_name, "Vera Assist");
    assert_eq!(loaded.role, Role::VirtualAssistant);
    assert_eq!(loaded.time_zone, "EST");
    assert_eq!(loaded.hourly_rate, Some(25.0));
    assert_eq!(loaded.bio, "Remote since 2019");
    assert!(loaded.updated_at.is_some());
}

#[tokio::test]
async fn second_save_overwrites_the_same_row() {
    let (backend, _, service) = setup();
    let session = registered(&backend, "va@example.com", Role::VirtualAssistant).await;
    service
        .save_profile(&session, &profile_form("Vera Assist", Role::VirtualAssistant))
        .await
        .expect("first save");

    let mut form = profile_form("Vera A.", Role::VirtualAssistant);
    form.hourly_rate = None;
    service.save_profile(&session, &form).await.expect("second save");

    let loaded = service
        .load_profile(&session)
        .await
        .expect("read")
        .expect("exists");
    assert_eq!(loaded.display_name, "Vera A.");
    assert_eq!(loaded.hourly_rate, None);
}

#[tokio::test]
async fn account_view_prefills_from_sign_up_details() {
    let (backend, _, service) = setup();
    let session = registered(&backend, "hirer@example.com", Role::Hirer).await;

    let view = service.account_view(&session).await.expect("view");
    assert!(!view.profile_saved);
    assert_eq!(view.email.as_deref(), Some("hirer@example.com"));
    assert_eq!(view.form.full_name.as_deref(), Some("Pat Doe"));
    assert_eq!(view.form.user_type.as_deref(), Some("hirer"));
}

#[tokio::test]
async fn invalid_profile_is_rejected_per_field() {
    let (backend, _, service) = setup();
    let session = registered(&backend, "hirer@example.com", Role::Hirer).await;

    let mut form = profile_form("", Role::Hirer);
    form.user_type = Some("manager".to_string());
    match service.save_profile(&session, &form).await {
        Err(MarketplaceError::Invalid(errors)) => {
            assert!(errors.contains("full_name"));
            assert!(errors.contains("user_type"));
        }
        other => panic!("expected field errors, got {other:?}"),
    }
    assert!(service.load_profile(&session).await.expect("read").is_none());
}

#[tokio::test]
async fn hirer_board_is_scoped_to_own_listings() {
    let (backend, _, service) = setup();
    let first = hirer(&service, &backend, "first@example.com").await;
    let second = hirer(&service, &backend, "second@example.com").await;

    service
        .post_listing(&first, &listing_form("Inbox triage", 15.0, "PST"))
        .await
        .expect("first posts");
    service
        .post_listing(&second, &listing_form("Bookkeeping", 30.0, "CET"))
        .await
        .expect("second posts");

    let board = service.job_board(&first).await.expect("board");
    assert!(board.profile_loaded);
    assert!(board.can_post_listing);
    assert_eq!(board.heading, "Your Posted Jobs");
    assert_eq!(board.listings.len(), 1);
    assert!(board
        .listings
        .iter()
        .all(|listing| listing.owner == *first.user_id()));
}

#[tokio::test]
async fn assistant_board_shows_everything_newest_first() {
    let (backend, _, service) = setup();
    let first = hirer(&service, &backend, "first@example.com").await;
    let second = hirer(&service, &backend, "second@example.com").await;
    service
        .post_listing(&first, &listing_form("Older", 15.0, "PST"))
        .await
        .expect("first posts");
    service
        .post_listing(&second, &listing_form("Newer", 30.0, "CET"))
        .await
        .expect("second posts");

    let va = registered(&backend, "va@example.com", Role::VirtualAssistant).await;
    service
        .save_profile(&va, &profile_form("Vera Assist", Role::VirtualAssistant))
        .await
        .expect("va profile");

    let board = service.job_board(&va).await.expect("board");
    let titles: Vec<&str> = board
        .listings
        .iter()
        .map(|listing| listing.title.as_str())
        .collect();
    assert_eq!(titles, ["Newer", "Older"]);
    assert!(!board.can_post_listing);
    assert!(board.assistant_types.is_empty());
    assert_eq!(board.heading, "Available Jobs");
}

#[tokio::test]
async fn empty_boards_carry_role_specific_messages() {
    let (backend, _, service) = setup();
    let session = hirer(&service, &backend, "hirer@example.com").await;

    let board = service.job_board(&session).await.expect("board");
    assert_eq!(board.empty_message, Some("You haven't posted any jobs yet."));
}

#[tokio::test]
async fn board_without_profile_lists_everything_read_only() {
    let (backend, _, service) = setup();
    let owner = hirer(&service, &backend, "hirer@example.com").await;
    service
        .post_listing(&owner, &listing_form("Social Media Help", 10.0, "EST"))
        .await
        .expect("listing posted");

    let newcomer = registered(&backend, "new@example.com", Role::VirtualAssistant).await;
    let board = service.job_board(&newcomer).await.expect("board");

    assert!(!board.profile_loaded);
    assert!(!board.can_post_listing);
    assert_eq!(board.heading, "Available Jobs");
    assert_eq!(board.listings.len(), 1);
    assert_eq!(board.listings[0].title, "Social Media Help");
    assert_eq!(board.empty_message, None);
}

#[tokio::test]
async fn rate_below_minimum_never_reaches_the_store() {
    let backend = Arc::new(InMemoryBackend::new());
    let profiles = Arc::new(CountingProfiles::new(backend.clone()));
    let listings = Arc::new(CountingListings::new(backend.clone()));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = MarketplaceService::new(profiles.clone(), listings.clone(), notifier.clone());
    let session = registered(&backend, "hirer@example.com", Role::Hirer).await;
    service
        .save_profile(&session, &profile_form("Hana Hirer", Role::Hirer))
        .await
        .expect("profile");
    let profile_calls = profiles.calls();

    match service
        .post_listing(&session, &listing_form("Cheap help", 4.99, "EST"))
        .await
    {
        Err(MarketplaceError::Invalid(errors)) => {
            assert_eq!(errors.get("hourly_rate"), Some("Hourly rate must be at least $5"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(profiles.calls(), profile_calls);
    assert_eq!(listings.calls(), 0);
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn owner_always_comes_from_the_session() {
    let (backend, notifier, service) = setup();
    let session = hirer(&service, &backend, "hirer@example.com").await;
    let other = registered(&backend, "other@example.com", Role::Hirer).await;

    let form: ListingForm = serde_json::from_value(serde_json::json!({
        "title": "Social Media Help",
        "description": "Daily posting",
        "assistant_type": "social-media",
        "hourly_rate": 10,
        "time_zone": "EST",
        "user_id": other.user_id(),
    }))
    .expect("form parses");

    let posted = service.post_listing(&session, &form).await.expect("posted");
    assert_eq!(posted.listing.owner, *session.user_id());
    assert_eq!(posted.notification.outcome().await, NotificationOutcome::Delivered);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].listing, posted.listing);
    let creator = events[0].creator.as_ref().expect("creator attached");
    assert_eq!(creator.display_name, "Hana Hirer");
}

#[tokio::test]
async fn failed_notification_keeps_the_listing() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = MarketplaceService::new(backend.clone(), backend.clone(), Arc::new(FailingNotifier));
    let session = registered(&backend, "hirer@example.com", Role::Hirer).await;
    service
        .save_profile(&session, &profile_form("Hana Hirer", Role::Hirer))
        .await
        .expect("profile");

    let posted = service
        .post_listing(&session, &listing_form("Social Media Help", 10.0, "EST"))
        .await
        .expect("creation succeeds despite the hook");

    assert!(matches!(
        posted.notification.outcome().await,
        NotificationOutcome::Failed(_)
    ));
    assert_eq!(backend.listing_count(), 1);
    let board = service.job_board(&session).await.expect("board");
    assert_eq!(board.listings[0].id, posted.listing.id);
}

#[tokio::test]
async fn failed_refresh_after_creation_still_succeeds() {
    let backend = Arc::new(InMemoryBackend::new());
    let listings = Arc::new(CountingListings::new(backend.clone()));
    let service = MarketplaceService::new(
        backend.clone(),
        listings.clone(),
        Arc::new(RecordingNotifier::default()),
    );
    let session = registered(&backend, "hirer@example.com", Role::Hirer).await;
    service
        .save_profile(&session, &profile_form("Hana Hirer", Role::Hirer))
        .await
        .expect("profile");

    listings.fail_queries();
    let posted = service
        .post_listing(&session, &listing_form("Social Media Help", 10.0, "EST"))
        .await
        .expect("creation is committed");
    assert!(posted.board.is_none());
    assert_eq!(backend.listing_count(), 1);

    match service.job_board(&session).await {
        Err(MarketplaceError::Provider(ProviderError::Unavailable(_))) => {}
        other => panic!("expected provider failure, got {other:?}"),
    }
}

#[tokio::test]
async fn only_hirers_with_profiles_may_post() {
    let (backend, _, service) = setup();

    let fresh = registered(&backend, "fresh@example.com", Role::Hirer).await;
    match service
        .post_listing(&fresh, &listing_form("Help", 10.0, "EST"))
        .await
    {
        Err(MarketplaceError::Denied(PostingDenied::ProfileMissing)) => {}
        other => panic!("expected missing profile, got {other:?}"),
    }

    let va = registered(&backend, "va@example.com", Role::VirtualAssistant).await;
    service
        .save_profile(&va, &profile_form("Vera Assist", Role::VirtualAssistant))
        .await
        .expect("profile");
    match service.post_listing(&va, &listing_form("Help", 10.0, "EST")).await {
        Err(MarketplaceError::Denied(PostingDenied::NotAHirer)) => {}
        other => panic!("expected role refusal, got {other:?}"),
    }
    assert_eq!(backend.listing_count(), 0);
}
