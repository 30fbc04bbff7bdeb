//! Scan pipeline integration tests
//!
//! Exercise the single-image and bulk flows end to end: scripted OCR
//! backend, scripted gateway, in-memory store, and the real review API
//! serving the bot's session-creation call on a loopback port.

mod helpers;

use helpers::{bot_state_with_api, image, ScriptedBackend, ScriptedGateway};
use mkws_bot::scan;
use mkws_common::db::models::MemberStatus;
use mkws_common::db::{bulk, players, wars};

#[tokio::test]
async fn single_scan_approval_creates_a_war() {
    let backend = ScriptedBackend::new(&[(
        "img://war1",
        &["Alph", "95", "Beta", "80", "Gamma", "70"],
    )]);
    let (state, pool) = bot_state_with_api(backend).await;

    for name in ["Alpha", "Beta", "Gamma"] {
        players::add_player(&pool, 1, name, MemberStatus::Member, None).await.unwrap();
    }
    players::add_nickname(&pool, 1, "Alpha", "Alph").await.unwrap();
    state.invalidate_roster(1).await;

    let gateway = ScriptedGateway::new(vec![], true);
    let reply = scan::single_scan(&state, &gateway, &image(1, 7, "img://war1")).await.unwrap();

    // 245 - 41 * 12 * 3 = -1231
    assert!(reply.contains("-1231"), "unexpected reply: {}", reply);
    assert!(reply.contains("loss"));

    // The confirmation prompt resolved the nickname to the canonical name.
    let prompts = gateway.prompts.lock().await;
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Alpha (Alph) - 95"));

    let (saved, total) = wars::list_wars(&pool, 1, 1, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(saved[0].team_score, 245);
    assert_eq!(saved[0].players.len(), 3);

    let alpha = players::require_player(&pool, 1, "Alpha").await.unwrap();
    assert_eq!(alpha.war_count, 1.0);
    assert_eq!(alpha.average_score, 95.0);
}

#[tokio::test]
async fn single_scan_decline_saves_nothing() {
    let backend = ScriptedBackend::new(&[("img://war1", &["Alpha", "95"])]);
    let (state, pool) = bot_state_with_api(backend).await;
    players::add_player(&pool, 1, "Alpha", MemberStatus::Member, None).await.unwrap();

    let gateway = ScriptedGateway::new(vec![], false);
    let reply = scan::single_scan(&state, &gateway, &image(1, 7, "img://war1")).await.unwrap();

    assert!(reply.contains("Discarded"));
    let (_, total) = wars::list_wars(&pool, 1, 1, 10).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn unreadable_single_scan_asks_for_manual_entry() {
    let backend = ScriptedBackend::new(&[]);
    let (state, pool) = bot_state_with_api(backend).await;
    players::add_player(&pool, 1, "Alpha", MemberStatus::Member, None).await.unwrap();

    let gateway = ScriptedGateway::new(vec![], true);
    let reply = scan::single_scan(&state, &gateway, &image(1, 7, "img://garbled")).await.unwrap();

    assert!(reply.contains("manually"));
    // No confirmation was even attempted.
    assert!(gateway.prompts.lock().await.is_empty());
}

#[tokio::test]
async fn bulk_scan_fills_a_session_with_results_and_failures() {
    let backend = ScriptedBackend::new(&[
        ("img://a", &["Alpha", "90", "Beta", "60"]),
        ("img://b", &["Alpha", "70"]),
        // img://c is unknown to the backend: OCR errors.
    ]);
    let (state, pool) = bot_state_with_api(backend).await;
    players::add_player(&pool, 1, "Alpha", MemberStatus::Member, None).await.unwrap();
    players::add_player(&pool, 1, "Beta", MemberStatus::Member, None).await.unwrap();

    let images = vec![
        image(1, 7, "img://a"),
        image(1, 7, "img://b"),
        image(1, 7, "img://c"),
        image(1, 7, "missing://d"),
    ];
    let gateway = ScriptedGateway::new(images, true);

    let reply = scan::bulk_scan(&state, &gateway, 1, 7, 9).await.unwrap();
    assert!(reply.contains("4 images"), "unexpected reply: {}", reply);
    assert!(reply.contains("2 readable"));
    assert!(reply.contains("http://review.example/bulk/"));

    let token = reply.rsplit('/').next().unwrap().trim().to_string();
    let session = bulk::get_session(&pool, &token).await.unwrap();
    assert_eq!(session.guild_id, 1);
    assert_eq!(session.total_images, 4);

    let results = bulk::get_results(&pool, &token).await.unwrap();
    let failures = bulk::get_failures(&pool, &token).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(failures.len(), 2);

    // Results are pending with the detected players attached.
    for result in &results {
        assert_eq!(result.review_status, mkws_common::db::models::ReviewStatus::Pending);
        assert!(!result.detected_players.is_empty());
        assert!(result.corrected_players.is_none());
    }
    // One failure from OCR, one from the dead download link.
    assert!(failures.iter().any(|f| f.error_message.contains("unrecognized image")));
    assert!(failures.iter().any(|f| f.error_message.contains("download failed")));

    // No wars until the session is confirmed.
    let (_, war_total) = wars::list_wars(&pool, 1, 1, 10).await.unwrap();
    assert_eq!(war_total, 0);
}

#[tokio::test]
async fn bulk_scan_with_empty_channel_creates_nothing() {
    let backend = ScriptedBackend::new(&[]);
    let (state, _pool) = bot_state_with_api(backend).await;

    let gateway = ScriptedGateway::new(vec![], true);
    let reply = scan::bulk_scan(&state, &gateway, 1, 7, 9).await.unwrap();
    assert!(reply.contains("No recent images"));
}

#[tokio::test]
async fn debug_ocr_shows_tokens_and_parse() {
    let backend = ScriptedBackend::new(&[("img://war1", &["Alpha", "95", "Drifter", "88"])]);
    let (state, pool) = bot_state_with_api(backend).await;
    players::add_player(&pool, 1, "Alpha", MemberStatus::Member, None).await.unwrap();

    let gateway = ScriptedGateway::new(vec![], true);
    let reply = scan::debug_ocr(&state, &gateway, 1, "img://war1").await.unwrap();

    assert!(reply.contains("Tokens: Alpha | 95 | Drifter | 88"));
    assert!(reply.contains("Alpha - 95"));
    // The opponent is visible in tokens but not in the parse.
    assert!(!reply.contains("Drifter - 88"));
}
