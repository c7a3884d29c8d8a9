//! Roulette, crash and dream rounds end to end

mod common;

use common::{harness, harness_with, next_result, SCOPE};
use std::time::Duration;
use wagerbot::gateway::GatewayAction;
use wagerbot::games::{BetTarget, GameKind, Multiplier, RoundStatus, RouletteBet};
use wagerbot::GameError;

fn red() -> BetTarget {
    BetTarget::Roulette { bet: RouletteBet::Red }
}

fn multiplier(hundredths: u32) -> BetTarget {
    BetTarget::Multiplier {
        target: Multiplier::from_hundredths(hundredths),
    }
}

#[tokio::test(start_paused = true)]
async fn test_roulette_red_doubles_the_wager() {
    let h = harness();
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000);
    h.outcomes.push_roulette(1);

    let receipt = h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 500).await.unwrap();
    assert!(receipt.opened_round);
    assert_eq!(receipt.balance_after, 500);

    let result = next_result(&mut results).await;
    assert_eq!(result.status, RoundStatus::Ended);
    assert_eq!(result.winners.len(), 1);
    assert_eq!(result.winners[0].payout, 1_000);
    assert_eq!(result.total_lost, 0);
    assert_eq!(h.balance(1), 1_500);

    assert!(h.gateway.wait_for(SCOPE, "landed on 1 (red)", Duration::from_secs(1)).await);
    assert!(h.engine.active_round(SCOPE, GameKind::Roulette).is_none());
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_closing_notice_is_pinned_until_the_result() {
    let h = harness();
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000);
    h.outcomes.push_roulette(2);

    h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 100).await.unwrap();
    next_result(&mut results).await;

    let retracted = |actions: &[GatewayAction]| {
        actions.iter().any(|a| matches!(a, GatewayAction::Delete { scope, .. } if *scope == SCOPE))
    };
    for _ in 0..100 {
        if retracted(&h.gateway.actions()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let actions = h.gateway.actions();
    let pinned = actions.iter().find_map(|a| match a {
        GatewayAction::Pin { message_id, .. } => Some(*message_id),
        _ => None,
    });
    let pinned = pinned.expect("closing notice should be pinned");
    let closing = actions.iter().find_map(|a| match a {
        GatewayAction::Send { message_id, text, .. } if text.contains("bets are closed") => Some(*message_id),
        _ => None,
    });
    assert_eq!(closing, Some(pinned));
    assert!(actions.contains(&GatewayAction::Unpin { scope: SCOPE, message_id: pinned }));
    assert!(actions.contains(&GatewayAction::Delete { scope: SCOPE, message_id: pinned }));
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_bet_on_a_resolving_round_moves_to_a_fresh_round() {
    let h = harness();
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000);
    h.fund(2, 1_000);
    h.outcomes.push_roulette(2);

    let first = h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 100).await.unwrap();
    let closing = h.engine.active_round(SCOPE, GameKind::Roulette).unwrap();
    assert_eq!(closing.id(), first.round_id);

    // resolution has flipped the phase but not yet released the registry slot
    let snapshot = closing.begin_resolution().await.unwrap();
    assert!(h.engine.active_round(SCOPE, GameKind::Roulette).is_some());

    let late = h.engine.place_bet(SCOPE, 2, GameKind::Roulette, red(), 100).await.unwrap();
    assert!(late.opened_round);
    assert_ne!(late.round_id, first.round_id);
    assert_eq!(late.balance_after, 900);

    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.iter().all(|bet| bet.user_id == 1));

    let result = next_result(&mut results).await;
    assert_eq!(result.round_id, late.round_id);
    assert_eq!(result.bet_count, 1);
    assert_eq!(result.total_wagered, 100);
    assert_eq!(h.balance(2), 900);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_failed_round_write_still_closes_the_round() {
    let h = harness();
    h.fund(1, 1_000);
    h.outcomes.push_roulette(1);
    h.storage.put(b"stats:roulette", b"not json").unwrap();

    h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 100).await.unwrap();
    assert_eq!(h.engine.metrics().active_rounds(), 1);

    assert!(h.engine.resolve_now(SCOPE, GameKind::Roulette).await.is_err());
    assert_eq!(h.engine.metrics().active_rounds(), 0);
    assert!(h.engine.active_round(SCOPE, GameKind::Roulette).is_none());
    // left for start-up recovery to refund
    assert_eq!(h.balance(1), 900);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_crash_below_target_loses_everything() {
    let h = harness();
    let mut results = h.engine.subscribe();
    h.fund(1, 100);
    h.outcomes.push_crash(Multiplier::from_hundredths(150));

    h.engine.place_bet(SCOPE, 1, GameKind::Crash, multiplier(200), 100).await.unwrap();

    let result = next_result(&mut results).await;
    assert!(result.winners.is_empty());
    assert_eq!(result.total_lost, 100);
    assert_eq!(h.balance(1), 0);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_dream_pays_floor_of_target() {
    let h = harness();
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000);
    h.fund(2, 1_000);
    h.outcomes.push_dream(Multiplier::from_hundredths(420));

    h.engine.place_bet(SCOPE, 1, GameKind::Dream, multiplier(333), 7).await.unwrap();
    h.engine.place_bet(SCOPE, 2, GameKind::Dream, multiplier(421), 100).await.unwrap();

    let result = next_result(&mut results).await;
    assert_eq!(result.bet_count, 2);
    assert_eq!(result.winners.len(), 1);
    // floor(7 * 3.33)
    assert_eq!(result.winners[0].payout, 23);
    assert_eq!(result.total_lost, 100);
    assert_eq!(h.balance(1), 1_000 - 7 + 23);
    assert_eq!(h.balance(2), 900);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_bet_is_visible_before_the_window_closes() {
    let h = harness();
    h.fund(3, 1_000);

    let receipt = h
        .engine
        .place_bet(SCOPE, 3, GameKind::Roulette, BetTarget::Roulette { bet: RouletteBet::Number(17) }, 250)
        .await
        .unwrap();
    let bets = h.engine.round_bets(SCOPE, GameKind::Roulette).await.unwrap();
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0].round_id, receipt.round_id);
    assert_eq!(bets[0].amount, 250);
    assert_eq!(bets[0].seq, 0);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_resolution_pays_once() {
    let h = harness();
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000);
    h.outcomes.push_roulette(1);
    h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 500).await.unwrap();

    let round = h.engine.active_round(SCOPE, GameKind::Roulette).unwrap();
    let (first, second) = tokio::join!(h.engine.resolve(round.clone()), h.engine.resolve(round));
    let resolved = [first.unwrap(), second.unwrap()];
    assert_eq!(resolved.iter().filter(|r| r.is_some()).count(), 1);

    next_result(&mut results).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(results.try_recv().is_err());
    assert_eq!(h.balance(1), 1_500);

    let err = h.engine.resolve_now(SCOPE, GameKind::Roulette).await.unwrap_err();
    assert_eq!(err.as_game(), Some(&GameError::NoActiveRound(GameKind::Roulette)));
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_each_bet_rearms_the_window_until_the_lifetime_cap() {
    let h = harness_with(|config| {
        config.games.roulette_window_ms = 100;
        config.games.max_round_lifetime_ms = 500;
    });
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000_000);
    let started = tokio::time::Instant::now();

    let engine = h.engine.clone();
    let bettor = tokio::spawn(async move {
        for _ in 0..30 {
            let _ = engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 10).await;
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
    });

    let first = next_result(&mut results).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500), "closed after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(600), "closed after {:?}", elapsed);
    assert!(first.bet_count > 1);

    bettor.abort();
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_round_without_bets_is_cancelled() {
    let h = harness();
    let mut results = h.engine.subscribe();

    let (_, created) = h.engine.open_round(SCOPE, GameKind::Crash).unwrap();
    assert!(created);
    let (_, created) = h.engine.open_round(SCOPE, GameKind::Crash).unwrap();
    assert!(!created);

    let result = next_result(&mut results).await;
    assert_eq!(result.status, RoundStatus::Cancelled);
    assert!(h.gateway.wait_for(SCOPE, "without bets", Duration::from_secs(1)).await);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_rejected_bets_never_debit() {
    let h = harness();
    h.fund(1, 50);

    let err = h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 100).await.unwrap_err();
    assert!(matches!(err.as_game(), Some(GameError::InsufficientFunds { balance: 50, needed: 100 })));

    let err = h.engine.place_bet(SCOPE, 1, GameKind::Crash, multiplier(100), 20).await.unwrap_err();
    assert!(matches!(err.as_game(), Some(GameError::InvalidTarget(_))));

    let err = h.engine.place_bet(SCOPE, 1, GameKind::Crash, red(), 20).await.unwrap_err();
    assert!(matches!(err.as_game(), Some(GameError::InvalidTarget(_))));

    let err = h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 0).await.unwrap_err();
    assert!(matches!(err.as_game(), Some(GameError::InvalidAmount(_))));

    let err = h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 5).await.unwrap_err();
    assert!(matches!(err.as_game(), Some(GameError::InvalidAmount(_))));

    assert_eq!(h.balance(1), 50);
    h.engine.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bets_never_double_debit() {
    let h = harness_with(|config| {
        config.games.roulette_window_ms = 10_000;
        config.games.max_round_lifetime_ms = 60_000;
    });
    h.fund(1, 1_000);

    let mut tasks = Vec::new();
    for _ in 0..25 {
        let engine = h.engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 100).await
        }));
    }
    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 10);
    assert_eq!(h.balance(1), 0);
    let bets = h.engine.round_bets(SCOPE, GameKind::Roulette).await.unwrap();
    assert_eq!(bets.len(), 10);
    let mut seqs: Vec<u32> = bets.iter().map(|b| b.seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..10).collect::<Vec<_>>());
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_payouts_stay_within_the_multiplier_bound() {
    let h = harness();
    let mut results = h.engine.subscribe();
    for user in 1..=6 {
        h.fund(user, 1_000_000);
    }

    for _ in 0..25 {
        for (user, bet) in [
            (1, RouletteBet::Number(7)),
            (2, RouletteBet::Red),
            (3, RouletteBet::Even),
            (4, RouletteBet::Odd),
        ] {
            h.engine
                .place_bet(SCOPE, user, GameKind::Roulette, BetTarget::Roulette { bet }, 100)
                .await
                .unwrap();
        }
        h.engine.place_bet(SCOPE, 5, GameKind::Crash, multiplier(250), 100).await.unwrap();
        h.engine.place_bet(SCOPE, 6, GameKind::Dream, multiplier(5_000), 100).await.unwrap();

        for _ in 0..3 {
            let result = next_result(&mut results).await;
            let bound = result.kind.max_multiplier().apply(result.total_wagered);
            assert!(result.total_paid <= bound, "{:?}", result);
            assert_eq!(
                result.total_lost,
                result.total_wagered - result.winners.iter().map(|w| w.wager).sum::<i64>()
            );
        }
    }
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_finished_rounds_appear_in_history_and_stats() {
    let h = harness();
    let mut results = h.engine.subscribe();
    h.fund(1, 1_000);
    h.outcomes.push_roulette(2);
    h.engine.place_bet(SCOPE, 1, GameKind::Roulette, red(), 100).await.unwrap();
    let finished = next_result(&mut results).await;

    let (history, _) = h.engine.recent_rounds(SCOPE, None, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].round.id, finished.round_id);
    assert_eq!(history[0].result.total_lost, 100);

    let stats = h.engine.stats().unwrap();
    let roulette = stats.iter().find(|s| s.kind == Some(GameKind::Roulette)).unwrap();
    assert_eq!(roulette.rounds_played, 1);
    assert_eq!(roulette.total_wagered, 100);
    h.engine.shutdown();
}

#[tokio::test]
async fn test_restart_refunds_interrupted_rounds() {
    let h = harness_with(|config| {
        config.games.crash_window_ms = 60_000;
        config.games.max_round_lifetime_ms = 120_000;
    });
    h.fund(1, 1_000);
    h.engine.place_bet(SCOPE, 1, GameKind::Crash, multiplier(300), 400).await.unwrap();
    assert_eq!(h.balance(1), 600);

    let common::Harness {
        engine,
        storage,
        dir,
        mut config,
        ..
    } = h;
    engine.shutdown();
    drop(engine);
    drop(storage);
    // let aborted timer tasks release their engine handles
    tokio::time::sleep(Duration::from_millis(100)).await;

    config.storage.clear_on_start = false;
    let restarted = common::build(dir, config);
    assert_eq!(restarted.engine.recover().unwrap(), 1);
    assert_eq!(restarted.balance(1), 1_000);
    assert_eq!(restarted.engine.recover().unwrap(), 0);

    let (history, _) = restarted.engine.recent_rounds(SCOPE, None, 10).unwrap();
    assert_eq!(history[0].result.status, RoundStatus::Cancelled);
    restarted.engine.shutdown();
}
