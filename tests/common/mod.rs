//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use wagerbot::{
    clock::ManualClock,
    config::BotConfig,
    gateway::RecordingGateway,
    games::{GameEngine, RoundResult, ScriptedOutcomes},
    storage::Storage,
};

pub const SCOPE: i64 = 2_000_000_001;

pub struct Harness {
    pub engine: GameEngine,
    pub gateway: Arc<RecordingGateway>,
    pub outcomes: Arc<ScriptedOutcomes>,
    pub clock: ManualClock,
    pub config: BotConfig,
    pub storage: Storage,
    pub dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(tweak: impl FnOnce(&mut BotConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = BotConfig::for_testing(dir.path().join("db").to_str().unwrap());
    tweak(&mut config);
    build(dir, config)
}

/// Build an engine over an existing data directory
pub fn build(dir: tempfile::TempDir, config: BotConfig) -> Harness {
    let storage = Storage::new_with_config(&config.storage).unwrap();
    let gateway = Arc::new(RecordingGateway::new());
    let outcomes = Arc::new(ScriptedOutcomes::new());
    let clock = ManualClock::new(Utc::now());
    let engine = GameEngine::builder(config.clone(), storage.clone())
        .gateway(gateway.clone())
        .outcomes(outcomes.clone())
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    Harness {
        engine,
        gateway,
        outcomes,
        clock,
        config,
        storage,
        dir,
    }
}

impl Harness {
    pub fn fund(&self, user: i64, amount: i64) {
        self.engine.ledger().credit(user, amount).unwrap();
    }

    pub fn balance(&self, user: i64) -> i64 {
        self.engine.balance(user).unwrap().balance
    }
}

/// Next finished round, failing the test if none arrives in time
pub async fn next_result(rx: &mut tokio::sync::broadcast::Receiver<RoundResult>) -> RoundResult {
    tokio::time::timeout(Duration::from_secs(3_600), rx.recv())
        .await
        .expect("no round finished in time")
        .expect("result channel closed")
}
