//! Multi-seat dice lobbies
//!
//! A lobby is created by a player who stakes the wager up front. Others join
//! at the same wager until every seat is taken, at which point everybody
//! rolls and the single highest roll takes the pot. A lobby left idle for the
//! configured timeout, or cancelled by its creator, refunds every stake.
//! Both endings flip the lobby state under its lock, so only one can win.

use crate::{
    errors::{BotResult, GameError},
    gateway::notify,
    games::{
        context::GameContext,
        outcome::roll_dice,
        resolver::RoundResolver,
        types::{Bet, BetTarget, GameKind, Outcome, Round, RoundId, RoundResult, ScopeId, UserId},
        window::BettingWindow,
    },
    render,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Participant that joined after the creator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DicePlayer {
    pub user_id: UserId,
    pub join_order: usize,
}

#[derive(Debug)]
enum LobbyState {
    Waiting {
        players: Vec<DicePlayer>,
        /// Creator's stake first, then every joiner's
        bets: Vec<Bet>,
    },
    Closed,
}

#[derive(Debug)]
pub struct DiceLobby {
    pub number: u64,
    pub round: Round,
    pub creator: UserId,
    pub wager: i64,
    pub max_players: usize,
    state: Mutex<LobbyState>,
}

/// Snapshot of a waiting lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyView {
    pub number: u64,
    pub round_id: RoundId,
    pub scope: ScopeId,
    pub creator: UserId,
    pub wager: i64,
    pub max_players: usize,
    pub players: Vec<DicePlayer>,
    pub created_at: DateTime<Utc>,
}

impl LobbyView {
    pub fn seats_taken(&self) -> usize {
        self.players.len() + 1
    }
}

impl DiceLobby {
    fn view(&self, players: &[DicePlayer]) -> LobbyView {
        LobbyView {
            number: self.number,
            round_id: self.round.id,
            scope: self.round.scope,
            creator: self.creator,
            wager: self.wager,
            max_players: self.max_players,
            players: players.to_vec(),
            created_at: self.round.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinOutcome {
    Joined(LobbyView),
    /// The join filled the last seat and the lobby was rolled
    Resolved(RoundResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Creator,
    Idle,
}

pub struct DiceHall {
    ctx: Arc<GameContext>,
    resolver: Arc<RoundResolver>,
    lobbies: DashMap<ScopeId, Vec<Arc<DiceLobby>>>,
    next_number: AtomicU64,
    idle: BettingWindow<u64>,
}

impl DiceHall {
    pub fn new(ctx: Arc<GameContext>, resolver: Arc<RoundResolver>) -> Self {
        Self {
            ctx,
            resolver,
            lobbies: DashMap::new(),
            next_number: AtomicU64::new(1),
            idle: BettingWindow::new(),
        }
    }

    /// Open a lobby and stake the creator's wager
    pub fn create(self: &Arc<Self>, scope: ScopeId, creator: UserId, wager: i64, seats: Option<usize>) -> BotResult<LobbyView> {
        self.ctx.check_wager(wager)?;
        let dice = &self.ctx.dice;
        let max_players = seats.unwrap_or(dice.default_seats);
        if !(dice.min_seats..=dice.max_seats).contains(&max_players) {
            return Err(GameError::InvalidTarget(format!(
                "a lobby has {} to {} seats",
                dice.min_seats, dice.max_seats
            ))
            .into());
        }

        let lobby = {
            // the scope entry stays locked from the cap check until the lobby is listed
            let mut scope_lobbies = self.lobbies.entry(scope).or_default();
            if scope_lobbies.len() >= dice.max_lobbies_per_chat {
                return Err(GameError::TooManyActiveLobbies(dice.max_lobbies_per_chat).into());
            }
            self.ctx.ledger.try_debit(creator, wager)?;

            let now = self.ctx.clock.now();
            let round = Round::open(scope, GameKind::Dice, now);
            let stake = Bet {
                round_id: round.id,
                seq: 0,
                user_id: creator,
                amount: wager,
                target: BetTarget::Seat,
                placed_at: now,
            };
            let persisted = self
                .ctx
                .store
                .save_open(&round)
                .and_then(|_| self.ctx.store.record_bet(&stake));
            if let Err(e) = persisted {
                self.ctx.ledger.credit(creator, wager)?;
                return Err(e);
            }

            let lobby = Arc::new(DiceLobby {
                number: self.next_number.fetch_add(1, Ordering::Relaxed),
                round,
                creator,
                wager,
                max_players,
                state: Mutex::new(LobbyState::Waiting {
                    players: Vec::new(),
                    bets: vec![stake],
                }),
            });
            scope_lobbies.push(lobby.clone());
            lobby
        };

        self.ctx.metrics.round_opened();
        self.ctx.metrics.bet_placed(GameKind::Dice, wager);
        self.arm_idle(&lobby);
        info!(scope, creator, wager, lobby = lobby.number, seats = max_players, "Dice lobby created");
        Ok(lobby.view(&[]))
    }

    /// Take a seat; filling the last seat rolls the lobby immediately
    pub async fn join(self: &Arc<Self>, scope: ScopeId, user: UserId, number: u64) -> BotResult<JoinOutcome> {
        let lobby = self.find(scope, number).ok_or(GameError::LobbyNotFound(number))?;

        let mut state = lobby.state.lock().await;
        let LobbyState::Waiting { players, bets } = &mut *state else {
            return Err(GameError::LobbyNotFound(number).into());
        };
        if user == lobby.creator {
            return Err(GameError::SelfJoinForbidden.into());
        }
        if players.iter().any(|p| p.user_id == user) {
            return Err(GameError::DuplicateJoin(user).into());
        }
        if players.len() + 1 >= lobby.max_players {
            return Err(GameError::LobbyFull.into());
        }

        self.ctx.ledger.try_debit(user, lobby.wager)?;
        let stake = Bet {
            round_id: lobby.round.id,
            seq: bets.len() as u32,
            user_id: user,
            amount: lobby.wager,
            target: BetTarget::Seat,
            placed_at: self.ctx.clock.now(),
        };
        if let Err(e) = self.ctx.store.record_bet(&stake) {
            self.ctx.ledger.credit(user, lobby.wager)?;
            return Err(e);
        }
        bets.push(stake);
        players.push(DicePlayer {
            user_id: user,
            join_order: players.len() + 1,
        });
        self.ctx.metrics.bet_placed(GameKind::Dice, lobby.wager);
        info!(scope, user, lobby = number, seats = players.len() + 1, "Joined dice lobby");

        if players.len() + 1 < lobby.max_players {
            let view = lobby.view(players);
            self.arm_idle(&lobby);
            return Ok(JoinOutcome::Joined(view));
        }

        let LobbyState::Waiting { bets, .. } = std::mem::replace(&mut *state, LobbyState::Closed) else {
            return Err(GameError::LobbyNotFound(number).into());
        };
        drop(state);
        self.detach(&lobby);
        self.idle.cancel(&lobby.number);

        let result = self.roll(&lobby, bets).await?;
        Ok(JoinOutcome::Resolved(result))
    }

    async fn roll(&self, lobby: &DiceLobby, bets: Vec<Bet>) -> BotResult<RoundResult> {
        let participants: Vec<UserId> = bets.iter().map(|b| b.user_id).collect();
        let (winner, rolls) = roll_dice(self.ctx.outcomes.as_ref(), &participants)
            .ok_or_else(|| GameError::InvalidTarget("lobby has no participants".to_string()))?;
        let pot = lobby.wager.saturating_mul(participants.len() as i64);

        let mut round = lobby.round.clone();
        let result = self.resolver.settle(
            &mut round,
            &bets,
            Outcome::Dice { winner, rolls },
            |bet| (bet.user_id == winner).then_some(pot),
        )?;
        self.resolver.announce(&result).await;
        info!(scope = round.scope, lobby = lobby.number, winner, pot, "Dice lobby rolled");
        Ok(result)
    }

    /// Creator-initiated cancellation with a full refund
    pub async fn cancel(&self, scope: ScopeId, user: UserId, number: u64) -> BotResult<RoundResult> {
        let lobby = self.find(scope, number).ok_or(GameError::LobbyNotFound(number))?;
        if lobby.creator != user {
            return Err(GameError::NotLobbyCreator.into());
        }
        self.close_and_refund(&lobby, CancelReason::Creator)
            .await?
            .ok_or_else(|| GameError::LobbyNotFound(number).into())
    }

    async fn close_and_refund(&self, lobby: &DiceLobby, reason: CancelReason) -> BotResult<Option<RoundResult>> {
        let mut state = lobby.state.lock().await;
        let LobbyState::Waiting { bets, .. } = std::mem::replace(&mut *state, LobbyState::Closed) else {
            return Ok(None);
        };
        drop(state);
        self.detach(lobby);
        self.idle.cancel(&lobby.number);

        let mut round = lobby.round.clone();
        let result = self.resolver.cancel(&mut round, &bets)?;
        notify(
            self.ctx.gateway.as_ref(),
            round.scope,
            &render::dice_cancelled(lobby.number, reason, bets.len()),
            None,
        )
        .await;
        info!(scope = round.scope, lobby = lobby.number, ?reason, refunded = result.total_wagered, "Dice lobby cancelled");
        Ok(Some(result))
    }

    fn arm_idle(self: &Arc<Self>, lobby: &Arc<DiceLobby>) {
        let hall = Arc::clone(self);
        let expiring = Arc::clone(lobby);
        self.idle.arm(lobby.number, self.ctx.dice.idle_timeout(), async move {
            if let Err(e) = hall.close_and_refund(&expiring, CancelReason::Idle).await {
                error!(lobby = expiring.number, error = %e, "Idle dice lobby cleanup failed");
            }
        });
    }

    fn find(&self, scope: ScopeId, number: u64) -> Option<Arc<DiceLobby>> {
        self.lobbies
            .get(&scope)
            .and_then(|list| list.iter().find(|l| l.number == number).cloned())
    }

    fn detach(&self, lobby: &DiceLobby) {
        let scope = lobby.round.scope;
        if let Some(mut list) = self.lobbies.get_mut(&scope) {
            list.retain(|l| l.number != lobby.number);
        }
        self.lobbies.remove_if(&scope, |_, list| list.is_empty());
    }

    /// Waiting lobbies of a scope, oldest first
    pub async fn list(&self, scope: ScopeId) -> Vec<LobbyView> {
        let lobbies: Vec<Arc<DiceLobby>> = self
            .lobbies
            .get(&scope)
            .map(|list| list.clone())
            .unwrap_or_default();

        let mut views = Vec::with_capacity(lobbies.len());
        for lobby in lobbies {
            if let LobbyState::Waiting { players, .. } = &*lobby.state.lock().await {
                views.push(lobby.view(players));
            }
        }
        views
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn shutdown(&self) {
        self.idle.shutdown();
    }
}
