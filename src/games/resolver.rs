//! Round resolution: outcome, payouts, persistence and the result message
//!
//! Callers hand over a round only after winning its resolution gate (see
//! `ActiveRound::begin_resolution`), so everything here runs at most once per
//! round. The final record is persisted before any winner is credited; if
//! that write fails, the active marker stays behind and start-up recovery
//! refunds the bets instead.

use crate::{
    errors::{BotResult, GameError},
    gateway::{display_names, notify, MessageId},
    games::{
        context::GameContext,
        outcome::{draw_timed, payout_for},
        types::{Bet, Outcome, Round, RoundResult, RoundStatus, ScopeId, Winner},
    },
    render,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct RoundResolver {
    ctx: Arc<GameContext>,
}

impl RoundResolver {
    pub fn new(ctx: Arc<GameContext>) -> Self {
        Self { ctx }
    }

    /// Resolve a roulette, crash or dream round from its bet snapshot
    pub async fn resolve_timed(&self, mut round: Round, bets: Vec<Bet>) -> BotResult<RoundResult> {
        let scope = round.scope;
        let kind = round.kind;

        if bets.is_empty() {
            let result = self.cancel(&mut round, &[])?;
            notify(self.ctx.gateway.as_ref(), scope, &render::no_bets(kind), None).await;
            info!(scope, %kind, round_id = %round.id, "Round cancelled without bets");
            return Ok(result);
        }

        let closed_notice = notify(self.ctx.gateway.as_ref(), scope, &render::bets_closed(kind, bets.len()), None).await;
        if let Some(message_id) = closed_notice {
            if let Err(e) = self.ctx.gateway.pin(scope, message_id).await {
                warn!(scope, error = %e, "Could not pin closing notice");
            }
        }
        let delay = self.ctx.games.results_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = draw_timed(self.ctx.outcomes.as_ref(), kind)
            .ok_or_else(|| GameError::InvalidTarget(format!("{} rounds are not drawn on a timer", kind)))?;
        let drawn = outcome.clone();
        let result = self.settle(&mut round, &bets, outcome, |bet| payout_for(&bet.target, &drawn, bet.amount))?;

        self.announce(&result).await;
        if let Some(message_id) = closed_notice {
            self.retract(scope, message_id).await;
        }
        info!(
            scope,
            %kind,
            round_id = %round.id,
            bets = result.bet_count,
            wagered = result.total_wagered,
            paid = result.total_paid,
            "Round resolved"
        );
        Ok(result)
    }

    /// Evaluate every bet against `outcome`, persist the finished round and
    /// credit the winners. Each payout is independent of the others.
    pub(crate) fn settle(
        &self,
        round: &mut Round,
        bets: &[Bet],
        outcome: Outcome,
        payout: impl Fn(&Bet) -> Option<i64>,
    ) -> BotResult<RoundResult> {
        let mut winners = Vec::new();
        let mut total_wagered = 0i64;
        let mut total_paid = 0i64;
        let mut total_lost = 0i64;

        for bet in bets {
            total_wagered = total_wagered.saturating_add(bet.amount);
            match payout(bet) {
                Some(amount) if amount > 0 => {
                    total_paid = total_paid.saturating_add(amount);
                    winners.push(Winner {
                        user_id: bet.user_id,
                        wager: bet.amount,
                        payout: amount,
                        target: Some(bet.target),
                    });
                }
                _ => total_lost = total_lost.saturating_add(bet.amount),
            }
        }

        round.status = RoundStatus::Ended;
        round.ended_at = Some(self.ctx.clock.now());
        round.outcome = Some(outcome.clone());

        let result = RoundResult {
            round_id: round.id,
            scope: round.scope,
            kind: round.kind,
            status: RoundStatus::Ended,
            outcome: Some(outcome),
            winners,
            total_wagered,
            total_paid,
            total_lost,
            bet_count: bets.len(),
        };
        // the round has left the registry whether or not the write lands
        self.ctx.metrics.round_closed();
        self.ctx.store.finish(round, &result)?;

        for winner in &result.winners {
            if let Err(e) = self.ctx.ledger.credit(winner.user_id, winner.payout) {
                error!(round_id = %round.id, user = winner.user_id, amount = winner.payout, error = %e, "Payout failed");
            }
        }

        self.ctx.metrics.round_resolved(round.kind, total_paid);
        self.ctx.publish(&result);
        Ok(result)
    }

    /// Cancel a round and refund every bet in full
    pub(crate) fn cancel(&self, round: &mut Round, bets: &[Bet]) -> BotResult<RoundResult> {
        self.ctx.metrics.round_closed();
        let result = self.refund(round, bets)?;
        self.ctx.metrics.round_cancelled(round.kind);
        self.ctx.publish(&result);
        Ok(result)
    }

    fn refund(&self, round: &mut Round, bets: &[Bet]) -> BotResult<RoundResult> {
        round.status = RoundStatus::Cancelled;
        round.ended_at = Some(self.ctx.clock.now());

        let mut result = RoundResult::cancelled(round);
        result.bet_count = bets.len();
        result.total_wagered = bets.iter().map(|b| b.amount).sum();
        self.ctx.store.finish(round, &result)?;

        for bet in bets {
            if let Err(e) = self.ctx.ledger.credit(bet.user_id, bet.amount) {
                error!(round_id = %round.id, user = bet.user_id, amount = bet.amount, error = %e, "Refund failed");
            }
        }
        Ok(result)
    }

    /// Cancel rounds left active by a previous process and refund their bets
    pub fn recover_interrupted(&self) -> BotResult<usize> {
        let rounds = self.ctx.store.interrupted_rounds()?;
        let count = rounds.len();
        for mut round in rounds {
            let bets = self.ctx.store.load_bets(&round.id)?;
            let result = self.refund(&mut round, &bets)?;
            warn!(
                round_id = %round.id,
                scope = round.scope,
                kind = %round.kind,
                refunded = result.total_wagered,
                "Cancelled round interrupted by restart"
            );
        }
        Ok(count)
    }

    /// Unpin and drop the closing notice once the result is out
    async fn retract(&self, scope: ScopeId, message_id: MessageId) {
        if let Err(e) = self.ctx.gateway.unpin(scope, message_id).await {
            warn!(scope, error = %e, "Could not unpin closing notice");
        }
        if let Err(e) = self.ctx.gateway.delete_message(scope, message_id).await {
            warn!(scope, error = %e, "Could not delete closing notice");
        }
    }

    /// Render and send a finished round to its scope
    pub async fn announce(&self, result: &RoundResult) {
        let mut users: Vec<_> = result.winners.iter().map(|w| w.user_id).collect();
        if let Some(Outcome::Dice { rolls, .. }) = &result.outcome {
            users.extend(rolls.iter().map(|r| r.user_id));
        }
        let names = display_names(self.ctx.identity.as_ref(), users).await;
        notify(
            self.ctx.gateway.as_ref(),
            result.scope,
            &render::round_result(result, &names),
            None,
        )
        .await;
    }
}
