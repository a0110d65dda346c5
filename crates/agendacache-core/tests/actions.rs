mod common;

use agendacache_core::actions::{ActionError, Actions, ValidationError};
use agendacache_core::api::{ApiError, Table};
use agendacache_core::auth::SessionContext;
use agendacache_core::sync::{AgendaScreen, HomeScreen, SyncContext};
use common::{agenda_row, seed_agenda, session_for, Failure, Harness, FRIEND, ME};
use serde_json::json;

#[tokio::test]
async fn test_sixteen_character_name_is_rejected_before_any_request() {
    let h = Harness::new();
    let actions = Actions::new(h.ctx());

    let err = actions
        .create_agenda("abcdefghijklmnop", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ActionError::Validation(ValidationError::NameTooLong { max: 15 })
    ));
    assert!(h.backend.calls().is_empty());
    assert!(h.backend.rows(Table::Agenda).is_empty());
}

#[tokio::test]
async fn test_create_agenda_adds_owner_membership_and_caches() {
    let h = Harness::new();
    let actions = Actions::new(h.ctx());

    let agenda = actions
        .create_agenda("  Weekend ", Some("plans"))
        .await
        .unwrap();

    assert_eq!(agenda.name, "Weekend");
    assert_eq!(agenda.owner_id, ME);
    assert_eq!(agenda.join_key.len(), 8);
    assert_eq!(h.backend.rows(Table::AgendaMember).len(), 1);
    assert_eq!(h.backend.rows(Table::AgendaEditor).len(), 1);
    assert_eq!(h.cache.load_agendas(), vec![agenda]);
}

#[tokio::test]
async fn test_signed_out_actions_fail_without_requests() {
    let h = Harness::new();
    let ctx = SyncContext::new(
        h.cache.clone(),
        h.backend.clone(),
        SessionContext::new(),
        h.connectivity.clone(),
    );
    let actions = Actions::new(ctx);

    let err = actions.create_agenda("Fine name", None).await.unwrap_err();
    assert!(matches!(err, ActionError::NotSignedIn));
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_join_checks_key_and_duplicate_membership() {
    let h = Harness::new();
    h.backend.seed(Table::Agenda, vec![agenda_row("a9", "Shared", FRIEND, "OPENSESA")]);
    let actions = Actions::new(h.ctx());

    let wrong = actions.join_agenda("a9", "nope").await.unwrap_err();
    assert!(matches!(
        wrong,
        ActionError::Validation(ValidationError::WrongJoinKey)
    ));
    assert!(h.backend.rows(Table::AgendaMember).is_empty());

    let joined = actions.join_agenda("a9", " OPENSESA ").await.unwrap();
    assert_eq!(joined.id, "a9");
    assert_eq!(h.cache.load_agendas().len(), 1);

    let again = actions.join_agenda("a9", "OPENSESA").await.unwrap_err();
    assert!(matches!(
        again,
        ActionError::Validation(ValidationError::AlreadyMember)
    ));
    assert_eq!(again.user_message(), "Already a member of this agenda");
}

#[tokio::test]
async fn test_leave_removes_only_that_agenda_from_cache() {
    let h = Harness::new();
    seed_agenda(&h.backend);
    h.backend.seed(Table::Agenda, vec![agenda_row("a2", "Other", FRIEND, "k")]);
    h.backend.seed(
        Table::AgendaMember,
        vec![json!({ "agenda_id": "a2", "user_id": ME })],
    );

    let mut home = HomeScreen::new(h.ctx());
    home.mount().await;
    let mut screen = AgendaScreen::new(h.ctx(), "a2");
    screen.mount().await;
    let mut screen = AgendaScreen::new(h.ctx(), "a1");
    screen.mount().await;
    assert_eq!(h.cache.load_agendas().len(), 2);

    Actions::new(h.ctx()).leave_agenda("a2").await.unwrap();

    let left: Vec<String> = h.cache.load_agendas().into_iter().map(|a| a.id).collect();
    assert_eq!(left, vec!["a1".to_string()]);
    assert!(h.cache.get_agenda_data("a2").is_none());
    assert!(h.cache.get_agenda_data("a1").is_some());
    assert!(h
        .backend
        .rows(Table::AgendaMember)
        .iter()
        .all(|m| m["agenda_id"] != "a2"));
}

#[tokio::test]
async fn test_only_owner_can_delete_agenda() {
    let h = Harness::new();
    seed_agenda(&h.backend);
    h.backend.seed(Table::Agenda, vec![agenda_row("a2", "Theirs", FRIEND, "k")]);
    let actions = Actions::new(h.ctx());

    let err = actions.delete_agenda("a2").await.unwrap_err();
    assert!(matches!(err, ActionError::Validation(ValidationError::NotOwner)));

    let mut screen = AgendaScreen::new(h.ctx(), "a1");
    screen.mount().await;
    actions.delete_agenda("a1").await.unwrap();
    assert!(h.cache.get_agenda_data("a1").is_none());
    assert!(h.cache.load_agendas().is_empty());
    assert_eq!(h.backend.rows(Table::Agenda).len(), 1);
}

#[tokio::test]
async fn test_elements_require_editor_and_patch_cached_bundle() {
    let h = Harness::new();
    seed_agenda(&h.backend);
    let mut screen = AgendaScreen::new(h.ctx(), "a1");
    screen.mount().await;

    let actions = Actions::new(h.ctx());
    let section = actions.create_section("a1", "Later").await.unwrap();
    assert_eq!(section.position, 1);

    let element = actions
        .create_element("a1", &section.id, "Pack bags", None, None)
        .await
        .unwrap();
    let bundle = h.cache.get_agenda_data("a1").unwrap();
    assert!(bundle.contains_element(&element.id));
    assert_eq!(bundle.sections.len(), 2);

    actions.delete_element(&element.id).await.unwrap();
    assert!(!h.cache.get_agenda_data("a1").unwrap().contains_element(&element.id));

    let title = "t".repeat(101);
    let err = actions
        .create_element("a1", &section.id, &title, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ActionError::Validation(ValidationError::TitleTooLong { max: 100 })
    ));

    h.session.sign_in(session_for(FRIEND));
    let err = actions
        .create_element("a1", &section.id, "Sneaky", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Validation(ValidationError::NotEditor)));
}

#[tokio::test]
async fn test_annotations_update_backend_and_cache() {
    let h = Harness::new();
    seed_agenda(&h.backend);
    let mut home = HomeScreen::new(h.ctx());
    home.mount().await;
    let mut screen = AgendaScreen::new(h.ctx(), "a1");
    screen.mount().await;
    let actions = Actions::new(h.ctx());

    actions.set_urgent("e1", true).await.unwrap();
    assert!(h.cache.get_agenda_data("a1").unwrap().is_urgent("e1"));
    let urgent: Vec<String> = h
        .cache
        .load_urgent_elements()
        .into_iter()
        .map(|v| v.element.id)
        .collect();
    assert_eq!(urgent, vec!["e1".to_string(), "e2".to_string()]);
    assert_eq!(h.backend.rows(Table::UrgentElement).len(), 2);

    actions.set_completed("e3", false).await.unwrap();
    assert!(!h.cache.get_agenda_data("a1").unwrap().is_completed("e3"));
    assert!(h.cache.load_completed_elements().is_empty());
    assert!(h.backend.rows(Table::CompletedElement).is_empty());
}

#[tokio::test]
async fn test_unauthorized_write_is_reported_and_ends_session() {
    let h = Harness::new();
    h.backend.fail_with(Some(Failure::Unauthorized));
    let actions = Actions::new(h.ctx());

    let err = actions.add_agenda_comment("a1", "hi").await.unwrap_err();
    assert!(matches!(err, ActionError::Api(ApiError::Unauthorized)));
    assert!(err.user_message().contains("sign in again"));
    assert!(!h.session.is_signed_in());
}

#[tokio::test]
async fn test_transient_write_failure_keeps_session() {
    let h = Harness::new();
    h.backend.fail_with(Some(Failure::Server));
    let actions = Actions::new(h.ctx());

    let err = actions.add_profile_comment(FRIEND, "hi").await.unwrap_err();
    assert!(err.user_message().starts_with("Could not reach the server"));
    assert!(h.session.is_signed_in());
}

#[tokio::test]
async fn test_comments_and_reactions() {
    let h = Harness::new();
    let actions = Actions::new(h.ctx());

    let empty = actions.add_profile_comment(FRIEND, "   ").await.unwrap_err();
    assert!(matches!(
        empty,
        ActionError::Validation(ValidationError::EmptyComment)
    ));
    let comment = actions.add_profile_comment(FRIEND, "nice").await.unwrap();
    assert_eq!(comment.author_id, ME);

    actions.react(FRIEND, "fire").await.unwrap();
    let twice = actions.react(FRIEND, "fire").await.unwrap_err();
    assert!(matches!(
        twice,
        ActionError::Validation(ValidationError::AlreadyReacted)
    ));
    let unknown = actions.react(FRIEND, "meh").await.unwrap_err();
    assert!(matches!(
        unknown,
        ActionError::Validation(ValidationError::UnknownReaction(_))
    ));
    assert_eq!(h.backend.rows(Table::Reaction).len(), 1);
}

#[tokio::test]
async fn test_profile_updates_refresh_cached_profile() {
    let h = Harness::new();
    seed_agenda(&h.backend);
    let mut home = HomeScreen::new(h.ctx());
    home.mount().await;
    let actions = Actions::new(h.ctx());

    let profile = actions
        .update_profile(Some("new_name"), Some("hello"))
        .await
        .unwrap();
    assert_eq!(profile.username, "new_name");
    assert_eq!(profile.credits, Some(42));
    assert_eq!(h.cache.load_user_profile(), Some(profile.clone()));
    assert_eq!(
        h.cache.find_cached_profile(ME).map(|p| p.username),
        Some("new_name".to_string())
    );

    let bad = actions.update_profile(Some("no spaces"), None).await.unwrap_err();
    assert!(matches!(
        bad,
        ActionError::Validation(ValidationError::InvalidUsername { .. })
    ));

    let too_big = actions
        .upload_avatar(vec![0; 3 * 1024 * 1024], "image/png")
        .await
        .unwrap_err();
    assert!(matches!(
        too_big,
        ActionError::Validation(ValidationError::ImageTooLarge { .. })
    ));

    let profile = actions
        .upload_avatar(vec![1, 2, 3], "image/png")
        .await
        .unwrap();
    let url = profile.avatar_url.unwrap();
    assert!(url.starts_with("https://fake.local/storage/v1/object/public/avatars/user-1/avatar-"));
    assert!(url.ends_with(".png"));
    assert_eq!(h.backend.uploads().len(), 1);
}

#[tokio::test]
async fn test_permission_refusal_keeps_session() {
    let h = Harness::new();
    h.backend.fail_with(Some(Failure::Forbidden));
    let actions = Actions::new(h.ctx());

    let err = actions.add_agenda_comment("a1", "hi").await.unwrap_err();

    assert!(matches!(err, ActionError::Api(ApiError::AccessDenied(_))));
    assert_eq!(err.user_message(), "You do not have permission to do this.");
    assert!(h.session.is_signed_in());
}

#[tokio::test]
async fn test_failed_membership_removes_new_agenda() {
    let h = Harness::new();
    h.backend.fail_table(Table::AgendaMember, Failure::Server);
    let actions = Actions::new(h.ctx());

    let err = actions.create_agenda("Weekend", None).await.unwrap_err();

    assert!(matches!(err, ActionError::Api(ApiError::ServerError(_))));
    assert!(h.backend.rows(Table::Agenda).is_empty());
    assert!(h.backend.calls().contains(&"delete agendas".to_string()));
    assert!(h.cache.load_agendas().is_empty());
}

#[tokio::test]
async fn test_empty_profile_update_sends_nothing() {
    let h = Harness::new();
    let actions = Actions::new(h.ctx());

    let err = actions.update_profile(None, None).await.unwrap_err();

    assert!(matches!(
        err,
        ActionError::Validation(ValidationError::NothingToUpdate)
    ));
    assert!(h.backend.calls().is_empty());
}
