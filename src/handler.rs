//! Executes parsed chat commands against the engine and moderation store
//!
//! Every rejection turns into a reply in the originating chat; only
//! infrastructure failures are logged as errors.

use crate::{
    commands::{self, Amount, Command, DiceCommand},
    errors::{BotResult, GameError},
    events::ChatEvent,
    gateway::{display_names, notify, Keyboard},
    games::{BetTarget, GameEngine, GameKind, JoinOutcome, ScopeId, UserId},
    moderation::{ModerationStore, Silence},
    render,
};
use std::sync::Arc;
use tracing::{debug, error};

const HISTORY_LIMIT: usize = 10;

/// What happened to one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not a command
    Ignored,
    /// Sender is banned or muted in this chat
    Silenced,
    Handled,
    Rejected,
}

struct Reply {
    text: String,
    keyboard: Option<Keyboard>,
}

impl Reply {
    fn text(text: String) -> Option<Self> {
        Some(Self { text, keyboard: None })
    }

    fn with_keyboard(text: String, keyboard: Keyboard) -> Option<Self> {
        Some(Self {
            text,
            keyboard: Some(keyboard),
        })
    }
}

#[derive(Clone)]
pub struct CommandHandler {
    engine: GameEngine,
    moderation: Arc<ModerationStore>,
}

impl CommandHandler {
    pub fn new(engine: GameEngine, moderation: Arc<ModerationStore>) -> Self {
        Self { engine, moderation }
    }

    pub async fn handle(&self, event: &ChatEvent) -> Disposition {
        let scope = event.peer_id;
        let user = event.from_id;

        match self.moderation.silenced(scope, user) {
            Ok(None) => {}
            Ok(Some(silence)) => {
                let reason = match silence {
                    Silence::Banned => "banned",
                    Silence::Muted { .. } => "muted",
                };
                self.engine.metrics().event_dropped(reason);
                debug!(scope, user, reason, "Dropped command from silenced user");
                return Disposition::Silenced;
            }
            Err(e) => error!(scope, user, error = %e, "Moderation lookup failed"),
        }

        let Some(parsed) = commands::parse(&event.text) else {
            return Disposition::Ignored;
        };

        let outcome = match parsed {
            Ok(command) => self.execute(scope, user, command).await,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(reply) => {
                if let Some(reply) = reply {
                    self.send(scope, &reply.text, reply.keyboard).await;
                }
                Disposition::Handled
            }
            Err(e) => {
                if e.as_game().is_none() {
                    error!(scope, user, text = %event.text, error = %e, "Command failed");
                }
                self.send(scope, &e.user_message(), None).await;
                Disposition::Rejected
            }
        }
    }

    async fn send(&self, scope: ScopeId, text: &str, keyboard: Option<Keyboard>) {
        notify(self.engine.gateway().as_ref(), scope, text, keyboard).await;
    }

    fn resolve_amount(&self, user: UserId, amount: Amount) -> BotResult<i64> {
        match amount {
            Amount::Exact(value) => Ok(value),
            Amount::All => {
                let balance = self.engine.balance(user)?.balance;
                if balance <= 0 {
                    return Err(GameError::InsufficientFunds { balance, needed: 1 }.into());
                }
                Ok(balance)
            }
        }
    }

    async fn bet(&self, scope: ScopeId, user: UserId, kind: GameKind, target: BetTarget, amount: Amount) -> BotResult<Option<Reply>> {
        let amount = self.resolve_amount(user, amount)?;
        let receipt = self.engine.place_bet(scope, user, kind, target, amount).await?;
        if receipt.opened_round {
            let window = self.engine.games_config().window(kind).as_secs();
            self.send(scope, &render::round_opened(kind, window), None).await;
        }
        Ok(Reply::text(render::bet_accepted(user, &receipt)))
    }

    async fn execute(&self, scope: ScopeId, user: UserId, command: Command) -> BotResult<Option<Reply>> {
        match command {
            Command::Roulette => {
                let (_, created) = self.engine.open_round(scope, GameKind::Roulette)?;
                let games = self.engine.games_config();
                let window = games.window(GameKind::Roulette).as_secs();
                let text = if created {
                    render::round_opened(GameKind::Roulette, window)
                } else {
                    "A roulette round is already open, place your bets!".to_string()
                };
                Ok(Reply::with_keyboard(text, render::roulette_keyboard(games.min_wager.max(100))))
            }
            Command::Bet { bet, amount } => {
                self.bet(scope, user, GameKind::Roulette, BetTarget::Roulette { bet }, amount).await
            }
            Command::Crash { target, amount } => {
                self.bet(scope, user, GameKind::Crash, BetTarget::Multiplier { target }, amount).await
            }
            Command::Dream { target, amount } => {
                self.bet(scope, user, GameKind::Dream, BetTarget::Multiplier { target }, amount).await
            }
            Command::Dice(dice) => self.dice(scope, user, dice).await,
            Command::Bonus => {
                let claim = self.engine.claim_bonus(user)?;
                Ok(Reply::text(render::bonus(user, &claim)))
            }
            Command::Transfer { amount, to } => {
                let amount = self.resolve_amount(user, amount)?;
                let receipt = self.engine.transfer(user, to, amount)?;
                Ok(Reply::text(render::transfer(&receipt)))
            }
            Command::Balance => Ok(Reply::text(render::balance(&self.engine.balance(user)?))),
            Command::Top => {
                let accounts = self.engine.leaderboard()?;
                let names = display_names(self.engine.identity().as_ref(), accounts.iter().map(|a| a.user_id).collect::<Vec<_>>()).await;
                Ok(Reply::text(render::leaderboard(&accounts, &names)))
            }
            Command::History => {
                let (entries, _) = self.engine.recent_rounds(scope, None, HISTORY_LIMIT)?;
                Ok(Reply::text(render::history(&entries)))
            }
            Command::Help => Ok(Reply::text(render::help())),
            Command::Ban(target) => {
                self.moderation.ban(user, target)?;
                Ok(Reply::text(render::banned(target)))
            }
            Command::Unban(target) => {
                let was_banned = self.moderation.unban(user, target)?;
                Ok(Reply::text(render::unbanned(target, was_banned)))
            }
            Command::Mute { user: target, minutes } => {
                let until = self.moderation.mute(user, scope, target, minutes)?;
                Ok(Reply::text(render::muted(target, until)))
            }
            Command::Unmute(target) => {
                let was_muted = self.moderation.unmute(user, scope, target)?;
                Ok(Reply::text(render::unmuted(target, was_muted)))
            }
            Command::Warn(target) => {
                let outcome = self.moderation.warn(user, scope, target)?;
                Ok(Reply::text(render::warned(target, &outcome)))
            }
        }
    }

    async fn dice(&self, scope: ScopeId, user: UserId, command: DiceCommand) -> BotResult<Option<Reply>> {
        match command {
            DiceCommand::List => Ok(Reply::text(render::dice_lobbies(&self.engine.list_dice(scope).await))),
            DiceCommand::Create { wager, seats } => {
                let wager = self.resolve_amount(user, wager)?;
                let lobby = self.engine.create_dice(scope, user, wager, seats)?;
                Ok(Reply::with_keyboard(
                    render::dice_created(&lobby),
                    render::dice_keyboard(lobby.number),
                ))
            }
            DiceCommand::Join(number) => match self.engine.join_dice(scope, user, number).await? {
                JoinOutcome::Joined(lobby) => Ok(Reply::text(render::dice_joined(user, &lobby))),
                // the result was already announced by the roll
                JoinOutcome::Resolved(_) => Ok(None),
            },
            DiceCommand::Cancel(number) => {
                self.engine.cancel_dice(scope, user, number).await?;
                Ok(None)
            }
        }
    }
}
