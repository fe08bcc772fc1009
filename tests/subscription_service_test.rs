//! Integration tests for subscription and settings management.

use std::sync::Arc;
use std::time::Duration;

use digest_bot::database::table::UserSettingsUpdate;
use digest_bot::service::error::ServiceError;
use digest_bot::service::subscription_service::SubscribeResult;
use digest_bot::service::subscription_service::SubscriptionService;
use digest_bot::source::ForwardOrigin;

mod common;

use common::MockChatSource;

struct Fixture {
    db: Arc<digest_bot::database::Database>,
    db_path: std::path::PathBuf,
    source: MockChatSource,
    service: SubscriptionService,
}

async fn setup() -> Fixture {
    let (db, db_path) = common::setup_db().await;
    let source = MockChatSource::new();
    let service = SubscriptionService::new(db.clone(), Arc::new(source.clone()));
    Fixture {
        db,
        db_path,
        source,
        service,
    }
}

fn channel_origin(chat_id: i64, title: &str) -> ForwardOrigin {
    ForwardOrigin::Channel {
        chat_id,
        title: title.to_string(),
    }
}

#[tokio::test]
async fn test_register_user_creates_default_settings() {
    let f = setup().await;

    let user = f
        .service
        .register_user(100, "Ann", None, Some("ann"))
        .await
        .unwrap();

    let settings = f
        .db
        .user_settings_table
        .select_by_user_id(user.id)
        .await
        .unwrap()
        .expect("settings should be created with the user");
    assert_eq!(settings.delivery_time, "10:00");
    assert_eq!(settings.delivery_frequency, "daily");
    assert_eq!(settings.timezone, "UTC");
    assert!(settings.is_active);

    // Re-registering refreshes the profile without duplicating anything.
    let again = f
        .service
        .register_user(100, "Anna", Some("Smith"), Some("ann"))
        .await
        .unwrap();
    assert_eq!(again.id, user.id);
    assert_eq!(again.first_name, "Anna");
    assert_eq!(again.last_name.as_deref(), Some("Smith"));

    let settings_again = f
        .db
        .user_settings_table
        .select_by_user_id(user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settings_again.id, settings.id);

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_subscribe_from_channel_forward() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();
    f.source.add_chat(7, "Rust News");

    let result = f
        .service
        .subscribe_from_forward(&user, channel_origin(7, "stale title"))
        .await
        .unwrap();

    match result {
        SubscribeResult::Subscribed { subscription } => {
            assert_eq!(subscription.chat_id, 7);
            // The resolved title wins over the forwarded one.
            assert_eq!(subscription.chat_title, "Rust News");
            assert!(subscription.is_active);
            assert_eq!(subscription.last_processed_message_id, None);
        }
        other => panic!("Expected Subscribed, got {other:?}"),
    }

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_subscribe_rejects_private_and_unresolvable_origins() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();

    for origin in [ForwardOrigin::PrivateUser, ForwardOrigin::Unresolvable] {
        let result = f
            .service
            .subscribe_from_forward(&user, origin)
            .await
            .unwrap();
        assert!(matches!(result, SubscribeResult::NotAllowed { .. }));
    }

    assert!(f.service.list_subscriptions(&user).await.unwrap().is_empty());

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_subscribe_requires_resolvable_chat() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();
    f.source.fail_resolution(9);

    let result = f
        .service
        .subscribe_from_forward(&user, channel_origin(9, "Gone"))
        .await;

    assert!(matches!(result, Err(ServiceError::Source(_))));
    assert!(f.service.list_subscriptions(&user).await.unwrap().is_empty());

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_resubscribe_reactivates_and_keeps_watermark() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();
    f.source.add_chat(7, "Rust News");

    let first = match f
        .service
        .subscribe_from_forward(&user, channel_origin(7, ""))
        .await
        .unwrap()
    {
        SubscribeResult::Subscribed { subscription } => subscription,
        other => panic!("Expected Subscribed, got {other:?}"),
    };

    f.db
        .subscription_table
        .advance_watermark(first.id, 55)
        .await
        .unwrap();
    f.db.subscription_table.deactivate(user.id, 7).await.unwrap();

    let second = match f
        .service
        .subscribe_from_forward(&user, channel_origin(7, ""))
        .await
        .unwrap()
    {
        SubscribeResult::Subscribed { subscription } => subscription,
        other => panic!("Expected Subscribed, got {other:?}"),
    };

    assert_eq!(second.id, first.id);
    assert!(second.is_active);
    assert_eq!(second.last_processed_message_id, Some(55));

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_unsubscribe_flow() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();
    for (chat_id, title) in [(1, "One"), (2, "Two")] {
        f.source.add_chat(chat_id, title);
        f.service
            .subscribe_from_forward(&user, channel_origin(chat_id, ""))
            .await
            .unwrap();
    }

    let listing = f.service.begin_unsubscribe(&user).await.unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0], (1, "One".to_string()));

    let removed = f.service.confirm_unsubscribe(&user, 2).await.unwrap();
    assert_eq!(removed.chat_title, "Two");

    let remaining = f.service.list_subscriptions(&user).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].chat_title, "One");

    // The pending entry was consumed.
    assert!(matches!(
        f.service.confirm_unsubscribe(&user, 1).await,
        Err(ServiceError::PendingExpired)
    ));

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_unsubscribe_invalid_choice_can_be_retried() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();
    f.source.add_chat(1, "One");
    f.service
        .subscribe_from_forward(&user, channel_origin(1, ""))
        .await
        .unwrap();

    f.service.begin_unsubscribe(&user).await.unwrap();

    let err = f.service.confirm_unsubscribe(&user, 5).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidChoice { choice: 5, max: 1 }));

    // A bad pick does not consume the pending selection.
    let removed = f.service.confirm_unsubscribe(&user, 1).await.unwrap();
    assert_eq!(removed.chat_title, "One");

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_unsubscribe_selection_expires() {
    let (db, db_path) = common::setup_db().await;
    let source = MockChatSource::new();
    let service = SubscriptionService::with_pending_ttl(
        db.clone(),
        Arc::new(source.clone()),
        Duration::from_millis(1),
    );

    let user = service.register_user(100, "Ann", None, None).await.unwrap();
    source.add_chat(1, "One");
    service
        .subscribe_from_forward(&user, channel_origin(1, ""))
        .await
        .unwrap();

    service.begin_unsubscribe(&user).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(matches!(
        service.confirm_unsubscribe(&user, 1).await,
        Err(ServiceError::PendingExpired)
    ));
    // Nothing was deactivated.
    assert_eq!(service.list_subscriptions(&user).await.unwrap().len(), 1);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_update_settings_validates_fields() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();

    let bad_updates = [
        UserSettingsUpdate {
            delivery_time: Some("25:00".to_string()),
            ..Default::default()
        },
        UserSettingsUpdate {
            delivery_frequency: Some("hourly".to_string()),
            ..Default::default()
        },
        UserSettingsUpdate {
            timezone: Some("Atlantis/Lost".to_string()),
            ..Default::default()
        },
        UserSettingsUpdate {
            openrouter_model: Some("bogus/model".to_string()),
            ..Default::default()
        },
    ];
    for update in bad_updates {
        let result = f.service.update_settings(&user, update).await;
        assert!(matches!(result, Err(ServiceError::Configuration { .. })));
    }

    // Settings are unchanged after the rejected updates.
    let settings = f
        .db
        .user_settings_table
        .select_by_user_id(user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settings.delivery_time, "10:00");
    assert_eq!(settings.delivery_frequency, "daily");

    common::teardown_db(f.db_path).await;
}

#[tokio::test]
async fn test_update_settings_reports_schedule_impact() {
    let f = setup().await;
    let user = f.service.register_user(100, "Ann", None, None).await.unwrap();

    let change = f
        .service
        .update_settings(
            &user,
            UserSettingsUpdate {
                delivery_time: Some("09:30".to_string()),
                delivery_frequency: Some("weekly".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(change.schedule_affected);
    assert_eq!(change.settings.delivery_time, "09:30");
    assert_eq!(change.settings.delivery_frequency, "weekly");
    // Untouched fields keep their values.
    assert_eq!(change.settings.timezone, "UTC");

    // A model-only change does not require rescheduling.
    let change = f
        .service
        .update_settings(
            &user,
            UserSettingsUpdate {
                openrouter_model: Some("openai/gpt-4o".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!change.schedule_affected);
    assert_eq!(change.settings.openrouter_model, "openai/gpt-4o");

    common::teardown_db(f.db_path).await;
}
