//! Collaborators shared by every game component

use crate::{
    clock::Clock,
    errors::GameError,
    config::{DiceConfig, GamesConfig},
    gateway::{IdentityResolver, MessageGateway},
    games::{outcome::OutcomeSource, store::RoundStore, types::RoundResult},
    ledger::Ledger,
    metrics::GameMetrics,
};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct GameContext {
    pub games: GamesConfig,
    pub dice: DiceConfig,
    pub ledger: Arc<Ledger>,
    pub store: RoundStore,
    pub outcomes: Arc<dyn OutcomeSource>,
    pub gateway: Arc<dyn MessageGateway>,
    pub identity: Arc<dyn IdentityResolver>,
    pub metrics: GameMetrics,
    pub clock: Arc<dyn Clock>,
    /// Every finished round, for in-process subscribers
    pub results: broadcast::Sender<RoundResult>,
}

impl GameContext {
    pub fn publish(&self, result: &RoundResult) {
        // no subscribers is the normal case
        let _ = self.results.send(result.clone());
    }

    /// Reject wagers outside the configured bounds before anything is debited
    pub fn check_wager(&self, amount: i64) -> Result<(), GameError> {
        if amount <= 0 {
            return Err(GameError::InvalidAmount("wager must be positive".to_string()));
        }
        if amount < self.games.min_wager {
            return Err(GameError::InvalidAmount(format!(
                "minimum wager is {}",
                self.games.min_wager
            )));
        }
        if amount > self.games.max_wager {
            return Err(GameError::InvalidAmount(format!(
                "maximum wager is {}",
                self.games.max_wager
            )));
        }
        Ok(())
    }
}
