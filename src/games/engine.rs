//! Public entry points of the game engine
//!
//! Bet placement takes the round lock, debits atomically through the ledger
//! and re-arms the round's betting window while still holding the lock. A
//! round whose window fires flips to resolving under that same lock, so a
//! bet either lands in the round before resolution or retries against a
//! fresh round.

use crate::{
    clock::{Clock, SystemClock},
    config::{BotConfig, LedgerConfig},
    errors::{BotError, BotResult, ConfigurationError, GameError},
    gateway::{IdentityResolver, MentionIdentity, MessageGateway},
    games::{
        context::GameContext,
        dice::{DiceHall, JoinOutcome, LobbyView},
        outcome::{OutcomeSource, RandomOutcomes},
        registry::{ActiveRound, RoundPhase, RoundRegistry},
        resolver::RoundResolver,
        store::{GameStats, HistoryEntry, RoundStore},
        types::{
            Bet, BetReceipt, BetTarget, GameKind, Multiplier, RoundId, RoundResult, RouletteBet, ScopeId, UserId,
        },
        window::BettingWindow,
    },
    ledger::{Account, BonusClaim, Ledger, TransferReceipt},
    metrics::GameMetrics,
    storage::Storage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Attempts to land a bet when rounds keep closing underneath it
const MAX_PLACEMENT_ATTEMPTS: usize = 3;

/// Open round as reported by the status server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRoundView {
    pub round_id: RoundId,
    pub kind: GameKind,
    pub created_at: DateTime<Utc>,
    pub bets: usize,
    pub total_wagered: i64,
    pub closes_in_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeOverview {
    pub scope: ScopeId,
    pub rounds: Vec<ActiveRoundView>,
    pub lobbies: Vec<LobbyView>,
}

struct EngineInner {
    ctx: Arc<GameContext>,
    ledger_config: LedgerConfig,
    registry: RoundRegistry,
    window: BettingWindow<RoundId>,
    resolver: Arc<RoundResolver>,
    dice: Arc<DiceHall>,
}

#[derive(Clone)]
pub struct GameEngine {
    inner: Arc<EngineInner>,
}

/// Wires the engine's collaborators; anything not set gets its production default
pub struct EngineBuilder {
    config: BotConfig,
    storage: Storage,
    gateway: Option<Arc<dyn MessageGateway>>,
    identity: Option<Arc<dyn IdentityResolver>>,
    outcomes: Option<Arc<dyn OutcomeSource>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<GameMetrics>,
}

impl EngineBuilder {
    pub fn gateway(mut self, gateway: Arc<dyn MessageGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn outcomes(mut self, outcomes: Arc<dyn OutcomeSource>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics(mut self, metrics: GameMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> BotResult<GameEngine> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => GameMetrics::new()?,
        };
        let gateway = self
            .gateway
            .ok_or_else(|| ConfigurationError::MissingRequired("message gateway".to_string()))?;
        let (results, _) = broadcast::channel(256);

        let ledger = Arc::new(Ledger::new(
            self.storage.clone(),
            clock.clone(),
            self.config.ledger.clone(),
        ));
        let ctx = Arc::new(GameContext {
            games: self.config.games.clone(),
            dice: self.config.dice.clone(),
            ledger,
            store: RoundStore::new(self.storage),
            outcomes: self.outcomes.unwrap_or_else(|| Arc::new(RandomOutcomes)),
            gateway,
            identity: self.identity.unwrap_or_else(|| Arc::new(MentionIdentity)),
            metrics,
            clock,
            results,
        });
        let resolver = Arc::new(RoundResolver::new(ctx.clone()));
        let dice = Arc::new(DiceHall::new(ctx.clone(), resolver.clone()));

        Ok(GameEngine {
            inner: Arc::new(EngineInner {
                ctx,
                ledger_config: self.config.ledger,
                registry: RoundRegistry::new(),
                window: BettingWindow::new(),
                resolver,
                dice,
            }),
        })
    }
}

fn validate_target(kind: GameKind, target: &BetTarget) -> Result<(), GameError> {
    match (kind, target) {
        (GameKind::Roulette, BetTarget::Roulette { bet }) => match bet {
            RouletteBet::Number(n) if *n > 36 => {
                Err(GameError::InvalidTarget(format!("{} is not on the wheel", n)))
            }
            _ => Ok(()),
        },
        (GameKind::Crash | GameKind::Dream, BetTarget::Multiplier { target }) => {
            let max = kind.max_multiplier();
            if *target < Multiplier::MIN_TARGET || *target > max {
                return Err(GameError::InvalidTarget(format!(
                    "target must lie between {} and {}",
                    Multiplier::MIN_TARGET,
                    max
                )));
            }
            Ok(())
        }
        (GameKind::Dice, _) => Err(GameError::InvalidTarget("dice is played through lobbies".to_string())),
        (kind, target) => Err(GameError::InvalidTarget(format!("{} is not a {} bet", target, kind))),
    }
}

impl GameEngine {
    pub fn builder(config: BotConfig, storage: Storage) -> EngineBuilder {
        EngineBuilder {
            config,
            storage,
            gateway: None,
            identity: None,
            outcomes: None,
            clock: None,
            metrics: None,
        }
    }

    fn ctx(&self) -> &GameContext {
        &self.inner.ctx
    }

    pub fn metrics(&self) -> &GameMetrics {
        &self.inner.ctx.metrics
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.inner.ctx.ledger
    }

    pub fn gateway(&self) -> &Arc<dyn MessageGateway> {
        &self.inner.ctx.gateway
    }

    pub fn identity(&self) -> &Arc<dyn IdentityResolver> {
        &self.inner.ctx.identity
    }

    /// Stream of every finished round
    pub fn subscribe(&self) -> broadcast::Receiver<RoundResult> {
        self.inner.ctx.results.subscribe()
    }

    /// Cancel and refund rounds a previous process left open
    pub fn recover(&self) -> BotResult<usize> {
        let count = self.inner.resolver.recover_interrupted()?;
        if count > 0 {
            info!(count, "Refunded interrupted rounds");
        }
        Ok(count)
    }

    /// Open round for the key, creating, persisting and arming one if needed
    fn round_for(&self, scope: ScopeId, kind: GameKind) -> BotResult<(Arc<ActiveRound>, bool)> {
        let now = self.ctx().clock.now();
        let (round, created) = self.inner.registry.get_or_create_round(scope, kind, now);
        if created {
            if let Err(e) = self.ctx().store.save_open(&round.round) {
                self.inner.registry.release(&round);
                return Err(e);
            }
            self.ctx().metrics.round_opened();
            self.arm_window(&round);
            info!(scope, %kind, round_id = %round.id(), "Round opened");
        }
        Ok((round, created))
    }

    /// Restart the countdown, never past the round's maximum lifetime
    fn arm_window(&self, round: &Arc<ActiveRound>) {
        let games = &self.ctx().games;
        let left = games.max_round_lifetime().saturating_sub(round.opened.elapsed());
        let delay = games.window(round.round.kind).min(left);

        let engine = self.clone();
        let expiring = Arc::clone(round);
        self.inner.window.arm(round.id(), delay, async move {
            if let Err(e) = engine.resolve(expiring.clone()).await {
                error!(round_id = %expiring.id(), error = %e, "Round resolution failed");
            }
        });
    }

    /// Open a timed round without betting, or return the one already open
    pub fn open_round(&self, scope: ScopeId, kind: GameKind) -> BotResult<(Arc<ActiveRound>, bool)> {
        if !GameKind::TIMED.contains(&kind) {
            return Err(GameError::InvalidTarget(format!("{} has no betting rounds", kind)).into());
        }
        self.round_for(scope, kind)
    }

    pub fn active_round(&self, scope: ScopeId, kind: GameKind) -> Option<Arc<ActiveRound>> {
        self.inner.registry.get(scope, kind)
    }

    /// Validate, debit and record a bet against the open round of its kind
    pub async fn place_bet(
        &self,
        scope: ScopeId,
        user: UserId,
        kind: GameKind,
        target: BetTarget,
        amount: i64,
    ) -> BotResult<BetReceipt> {
        let outcome = self.try_place_bet(scope, user, kind, target, amount).await;
        self.track_rejection(outcome)
    }

    async fn try_place_bet(
        &self,
        scope: ScopeId,
        user: UserId,
        kind: GameKind,
        target: BetTarget,
        amount: i64,
    ) -> BotResult<BetReceipt> {
        validate_target(kind, &target)?;
        self.ctx().check_wager(amount)?;
        // early reject so a broke bettor does not open an empty round; the debit re-checks
        let balance = self.ctx().ledger.get_balance(user)?.balance;
        if balance < amount {
            return Err(GameError::InsufficientFunds { balance, needed: amount }.into());
        }

        for attempt in 0..MAX_PLACEMENT_ATTEMPTS {
            let (round, created) = self.round_for(scope, kind)?;
            let mut phase = round.lock().await;
            if let RoundPhase::Open { bets } = &mut *phase {
                let account = self.ctx().ledger.try_debit(user, amount)?;
                let bet = Bet {
                    round_id: round.id(),
                    seq: bets.len() as u32,
                    user_id: user,
                    amount,
                    target,
                    placed_at: self.ctx().clock.now(),
                };
                if let Err(e) = self.ctx().store.record_bet(&bet) {
                    self.ctx().ledger.credit(user, amount)?;
                    return Err(e);
                }
                bets.push(bet);
                self.arm_window(&round);

                self.ctx().metrics.bet_placed(kind, amount);
                info!(scope, user, %kind, amount, %target, round_id = %round.id(), "Bet accepted");
                return Ok(BetReceipt {
                    round_id: round.id(),
                    kind,
                    amount,
                    target,
                    balance_after: account.balance,
                    opened_round: created,
                });
            }
            drop(phase);

            // resolution may not have released it yet
            self.inner.registry.release(&round);
            debug!(scope, %kind, round_id = %round.id(), attempt, "Round closed under bet, retrying");
        }

        Err(GameError::RoundAlreadyResolving(format!("{} in {}", kind, scope)).into())
    }

    /// Resolve a round if nobody has started to. Returns `None` for the loser
    /// of a concurrent resolution race.
    pub async fn resolve(&self, round: Arc<ActiveRound>) -> BotResult<Option<RoundResult>> {
        let Some(bets) = round.begin_resolution().await else {
            return Ok(None);
        };
        // released before anything fallible so a failure cannot wedge the scope
        self.inner.registry.release(&round);
        self.inner.window.cancel(&round.id());

        self.inner
            .resolver
            .resolve_timed(round.round.clone(), bets)
            .await
            .map(Some)
    }

    /// Close the open round of a kind right away
    pub async fn resolve_now(&self, scope: ScopeId, kind: GameKind) -> BotResult<RoundResult> {
        let round = self
            .active_round(scope, kind)
            .ok_or(GameError::NoActiveRound(kind))?;
        let id = round.id();
        self.resolve(round)
            .await?
            .ok_or_else(|| GameError::RoundAlreadyResolving(id.to_string()).into())
    }

    /// Bets recorded so far in the open round
    pub async fn round_bets(&self, scope: ScopeId, kind: GameKind) -> BotResult<Vec<Bet>> {
        let round = self
            .active_round(scope, kind)
            .ok_or(GameError::NoActiveRound(kind))?;
        Ok(round.bets().await)
    }

    pub fn balance(&self, user: UserId) -> BotResult<Account> {
        self.ctx().ledger.get_balance(user)
    }

    pub fn claim_bonus(&self, user: UserId) -> BotResult<BonusClaim> {
        let claim = self.ctx().ledger.claim_bonus(user)?;
        self.ctx().metrics.bonus_claimed();
        Ok(claim)
    }

    pub fn transfer(&self, sender: UserId, receiver: UserId, amount: i64) -> BotResult<TransferReceipt> {
        let receipt = self.ctx().ledger.transfer(sender, receiver, amount)?;
        self.ctx().metrics.transfer_completed();
        Ok(receipt)
    }

    pub fn leaderboard(&self) -> BotResult<Vec<Account>> {
        self.ctx().ledger.leaderboard(self.inner.ledger_config.leaderboard_size)
    }

    fn track_rejection<T>(&self, outcome: BotResult<T>) -> BotResult<T> {
        if let Err(BotError::Game(e)) = &outcome {
            self.ctx().metrics.bet_rejected(e.reason());
        }
        outcome
    }

    pub fn create_dice(&self, scope: ScopeId, creator: UserId, wager: i64, seats: Option<usize>) -> BotResult<LobbyView> {
        self.track_rejection(self.inner.dice.create(scope, creator, wager, seats))
    }

    pub async fn join_dice(&self, scope: ScopeId, user: UserId, number: u64) -> BotResult<JoinOutcome> {
        let outcome = self.inner.dice.join(scope, user, number).await;
        self.track_rejection(outcome)
    }

    pub async fn cancel_dice(&self, scope: ScopeId, user: UserId, number: u64) -> BotResult<RoundResult> {
        self.inner.dice.cancel(scope, user, number).await
    }

    pub async fn list_dice(&self, scope: ScopeId) -> Vec<LobbyView> {
        self.inner.dice.list(scope).await
    }

    pub fn recent_rounds(
        &self,
        scope: ScopeId,
        cursor: Option<&str>,
        limit: usize,
    ) -> BotResult<(Vec<HistoryEntry>, Option<String>)> {
        self.ctx().store.recent_rounds(scope, cursor, limit)
    }

    pub fn stats(&self) -> BotResult<Vec<GameStats>> {
        self.ctx().store.all_stats()
    }

    /// Open rounds and waiting lobbies of one scope
    pub async fn overview(&self, scope: ScopeId) -> ScopeOverview {
        let mut rounds = Vec::new();
        for round in self.inner.registry.in_scope(scope) {
            let bets = round.bets().await;
            rounds.push(ActiveRoundView {
                round_id: round.id(),
                kind: round.round.kind,
                created_at: round.round.created_at,
                bets: bets.len(),
                total_wagered: bets.iter().map(|b| b.amount).sum(),
                closes_in_ms: self
                    .inner
                    .window
                    .remaining(&round.id())
                    .map(|d| d.as_millis() as u64),
            });
        }
        rounds.sort_by_key(|r| r.created_at);
        ScopeOverview {
            scope,
            rounds,
            lobbies: self.list_dice(scope).await,
        }
    }

    pub fn games_config(&self) -> &crate::config::GamesConfig {
        &self.ctx().games
    }

    /// Stop every pending timer; open rounds are refunded on next start
    pub fn shutdown(&self) {
        self.inner.window.shutdown();
        self.inner.dice.shutdown();
        info!(
            open_rounds = self.inner.registry.len(),
            open_lobbies = self.inner.dice.lobby_count(),
            "Game timers stopped"
        );
    }
}
