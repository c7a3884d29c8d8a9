//! Chat text in, bot replies out

mod common;

use chrono::Duration as ChronoDuration;
use common::{harness_with, next_result, Harness, SCOPE};
use std::sync::Arc;
use std::time::Duration;
use wagerbot::{
    events::ChatEvent,
    handler::{CommandHandler, Disposition},
    moderation::ModerationStore,
};

const ADMIN: i64 = 99;

fn setup() -> (Harness, CommandHandler) {
    let h = harness_with(|config| config.moderation.admins = vec![ADMIN]);
    let moderation = Arc::new(ModerationStore::new(
        h.storage.clone(),
        Arc::new(h.clock.clone()),
        h.config.moderation.clone(),
    ));
    let handler = CommandHandler::new(h.engine.clone(), moderation);
    (h, handler)
}

async fn say(handler: &CommandHandler, from: i64, text: &str) -> Disposition {
    let event = ChatEvent {
        peer_id: SCOPE,
        from_id: from,
        text: text.to_string(),
        message_id: 0,
    };
    handler.handle(&event).await
}

#[tokio::test(start_paused = true)]
async fn test_roulette_through_chat() {
    let (h, handler) = setup();
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000);
    h.outcomes.push_roulette(1);

    assert_eq!(say(&handler, 1, "/bet red 500").await, Disposition::Handled);
    let texts = h.gateway.texts(SCOPE);
    assert!(texts[0].contains("Roulette round is open"));
    assert!(texts[1].contains("bet 500 on red"));

    next_result(&mut results).await;
    assert!(h.gateway.wait_for(SCOPE, "won 1,000", Duration::from_secs(1)).await);
    assert_eq!(h.balance(1), 1_500);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_bonus_cooldown_through_chat() {
    let (h, handler) = setup();

    assert_eq!(say(&handler, 5, "/bonus").await, Disposition::Handled);
    let first = h.balance(5);
    assert!((1_000_000..=5_000_000).contains(&first));

    h.clock.advance(ChronoDuration::minutes(30));
    assert_eq!(say(&handler, 5, "/bonus").await, Disposition::Rejected);
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("come back in 30 min"));
    assert_eq!(h.balance(5), first);

    h.clock.advance(ChronoDuration::minutes(31));
    assert_eq!(say(&handler, 5, "/bonus").await, Disposition::Handled);
    assert!(h.balance(5) > first);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_transfer_all_and_balance() {
    let (h, handler) = setup();
    h.fund(1, 7_500);

    assert_eq!(say(&handler, 1, "/transfer all [id2|Bob]").await, Disposition::Handled);
    assert_eq!(h.balance(1), 0);
    assert_eq!(h.balance(2), 7_500);

    assert_eq!(say(&handler, 1, "/transfer 1k 2").await, Disposition::Rejected);
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("Not enough coins"));

    assert_eq!(say(&handler, 2, "/pay 500 id2").await, Disposition::Rejected);
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("yourself"));

    say(&handler, 2, "/balance").await;
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("7,500"));

    say(&handler, 2, "/top").await;
    let top = h.gateway.last_text(SCOPE).unwrap();
    assert!(top.contains("1. [id2|id2] - 7,500"));
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_dice_through_chat() {
    let (h, handler) = setup();
    h.fund(1, 1_000);
    h.fund(2, 1_000);
    h.outcomes.push_dice([2, 6]);

    assert_eq!(say(&handler, 1, "/dice 200").await, Disposition::Handled);
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("dice lobby #"));
    let number = h.engine.list_dice(SCOPE).await[0].number;

    say(&handler, 3, "/dice").await;
    assert!(h.gateway.last_text(SCOPE).unwrap().contains(&format!("#{}", number)));

    assert_eq!(say(&handler, 1, &format!("/dice join {}", number)).await, Disposition::Rejected);
    assert_eq!(say(&handler, 2, &format!("/dice join {}", number)).await, Disposition::Handled);
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("takes the pot"));
    assert_eq!(h.balance(2), 1_200);
    assert_eq!(h.balance(1), 800);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_moderation_gate() {
    let (h, handler) = setup();
    h.fund(7, 1_000);

    assert_eq!(say(&handler, 7, "/ban 8").await, Disposition::Rejected);
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("not allowed"));

    assert_eq!(say(&handler, ADMIN, "/mute 7 10").await, Disposition::Handled);
    assert_eq!(say(&handler, 7, "/bet red 100").await, Disposition::Silenced);
    assert_eq!(say(&handler, 7, "anyone around?").await, Disposition::Silenced);
    assert_eq!(h.balance(7), 1_000);

    h.clock.advance(ChronoDuration::minutes(11));
    assert_eq!(say(&handler, 7, "/balance").await, Disposition::Handled);

    for _ in 0..3 {
        say(&handler, ADMIN, "/warn 7").await;
    }
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("muted until"));
    assert_eq!(say(&handler, 7, "/balance").await, Disposition::Silenced);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_ignored_and_malformed_messages() {
    let (h, handler) = setup();

    assert_eq!(say(&handler, 1, "good morning").await, Disposition::Ignored);
    assert!(h.gateway.texts(SCOPE).is_empty());

    assert_eq!(say(&handler, 1, "/bet purple 100").await, Disposition::Rejected);
    assert!(h.gateway.last_text(SCOPE).unwrap().starts_with("Invalid bet"));

    assert_eq!(say(&handler, 1, "/crash 2x 100").await, Disposition::Rejected);
    assert_eq!(say(&handler, 1, "/help").await, Disposition::Handled);
    assert!(h.gateway.last_text(SCOPE).unwrap().contains("/dice"));
    h.engine.shutdown();
}
