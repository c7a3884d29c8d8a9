//! Chat text for every bot reply and game notice

use crate::{
    gateway::{mention, Button, Keyboard},
    games::{
        dice::CancelReason,
        store::HistoryEntry,
        types::{BetReceipt, GameKind, Outcome, RoundResult, RoundStatus, UserId},
        LobbyView,
    },
    ledger::{Account, BonusClaim, TransferReceipt},
    moderation::WarnOutcome,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Write;

/// `1234567` -> `1,234,567`
pub fn amount(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn name(names: &HashMap<UserId, String>, user: UserId) -> String {
    names.get(&user).cloned().unwrap_or_else(|| mention(user))
}

fn title(kind: GameKind) -> &'static str {
    match kind {
        GameKind::Roulette => "Roulette",
        GameKind::Crash => "Crash",
        GameKind::Dream => "Dream",
        GameKind::Dice => "Dice",
    }
}

pub fn round_opened(kind: GameKind, window_secs: u64) -> String {
    format!(
        "{} round is open! Place your bets, the window closes {}s after the last bet.",
        title(kind),
        window_secs
    )
}

/// Quick-bet buttons shown under a fresh roulette round
pub fn roulette_keyboard(stake: i64) -> Keyboard {
    let bet = |label: &str, target: &str| Button::new(label, format!("/bet {} {}", target, stake));
    Keyboard::default()
        .row(vec![bet("Red", "red"), bet("Black", "black")])
        .row(vec![bet("Even", "even"), bet("Odd", "odd"), bet("Zero", "0")])
}

pub fn bet_accepted(user: UserId, receipt: &BetReceipt) -> String {
    format!(
        "{} bet {} on {} ({}). Balance: {}",
        mention(user),
        amount(receipt.amount),
        receipt.target,
        receipt.kind,
        amount(receipt.balance_after)
    )
}

pub fn no_bets(kind: GameKind) -> String {
    format!("{} round closed without bets.", title(kind))
}

pub fn bets_closed(kind: GameKind, count: usize) -> String {
    format!("{}: bets are closed ({} accepted). Drawing...", title(kind), count)
}

fn describe_outcome(outcome: &Outcome, names: &HashMap<UserId, String>) -> String {
    match outcome {
        Outcome::Roulette { number, color } => format!("The ball landed on {} ({})", number, color),
        Outcome::Crash { multiplier } => format!("Crashed at {}", multiplier),
        Outcome::Dream { multiplier } => format!("The dream reached {}", multiplier),
        Outcome::Dice { winner, rolls } => {
            let mut text = String::from("Rolls:");
            for roll in rolls {
                let _ = write!(text, "\n  {} rolled {}", name(names, roll.user_id), roll.value);
            }
            if let Some(rerolls) = rolls.iter().map(|r| r.rerolls).max().filter(|r| *r > 0) {
                let _ = write!(text, "\n  ({} reroll(s) to break a tie)", rerolls);
            }
            let _ = write!(text, "\n{} takes the pot", name(names, *winner));
            text
        }
    }
}

/// Result of a finished round
pub fn round_result(result: &RoundResult, names: &HashMap<UserId, String>) -> String {
    if result.status == RoundStatus::Cancelled {
        return format!(
            "{} round cancelled, {} refunded.",
            title(result.kind),
            amount(result.total_wagered)
        );
    }

    let mut text = format!("{} results", title(result.kind));
    if let Some(outcome) = &result.outcome {
        let _ = write!(text, "\n{}", describe_outcome(outcome, names));
    }
    if result.winners.is_empty() {
        text.push_str("\nNobody won this time.");
    } else {
        text.push_str("\nWinners:");
        for winner in &result.winners {
            let _ = write!(
                text,
                "\n  {} won {} (bet {})",
                name(names, winner.user_id),
                amount(winner.payout),
                amount(winner.wager)
            );
        }
    }
    let _ = write!(text, "\nTotal lost: {}", amount(result.total_lost));
    text
}

pub fn dice_created(lobby: &LobbyView) -> String {
    format!(
        "{} opened dice lobby #{} for {} per seat ({} seats). Join with /dice join {}",
        mention(lobby.creator),
        lobby.number,
        amount(lobby.wager),
        lobby.max_players,
        lobby.number
    )
}

pub fn dice_keyboard(number: u64) -> Keyboard {
    Keyboard::default().row(vec![Button::new("Join", format!("/dice join {}", number))])
}

pub fn dice_joined(user: UserId, lobby: &LobbyView) -> String {
    format!(
        "{} joined dice lobby #{} ({}/{} seats)",
        mention(user),
        lobby.number,
        lobby.seats_taken(),
        lobby.max_players
    )
}

pub fn dice_cancelled(number: u64, reason: CancelReason, refunded: usize) -> String {
    let why = match reason {
        CancelReason::Creator => "cancelled by its creator",
        CancelReason::Idle => "closed after sitting idle",
    };
    format!("Dice lobby #{} was {}; {} stake(s) refunded.", number, why, refunded)
}

pub fn dice_lobbies(lobbies: &[LobbyView]) -> String {
    if lobbies.is_empty() {
        return "No open dice lobbies. Start one with /dice <wager> [seats]".to_string();
    }
    let mut text = String::from("Open dice lobbies:");
    for lobby in lobbies {
        let _ = write!(
            text,
            "\n  #{}: {} per seat, {}/{} seats, by {}",
            lobby.number,
            amount(lobby.wager),
            lobby.seats_taken(),
            lobby.max_players,
            mention(lobby.creator)
        );
    }
    text
}

pub fn balance(account: &Account) -> String {
    format!("{} balance: {}", mention(account.user_id), amount(account.balance))
}

pub fn bonus(user: UserId, claim: &BonusClaim) -> String {
    format!(
        "{} claimed a bonus of {}! Balance: {}",
        mention(user),
        amount(claim.amount),
        amount(claim.balance)
    )
}

pub fn transfer(receipt: &TransferReceipt) -> String {
    format!(
        "{} sent {} to {}. Your balance: {}",
        mention(receipt.sender),
        amount(receipt.amount),
        mention(receipt.receiver),
        amount(receipt.sender_balance)
    )
}

pub fn leaderboard(accounts: &[Account], names: &HashMap<UserId, String>) -> String {
    if accounts.is_empty() {
        return "Nobody has any coins yet.".to_string();
    }
    let mut text = String::from("Richest players:");
    for (place, account) in accounts.iter().enumerate() {
        let _ = write!(
            text,
            "\n{}. {} - {}",
            place + 1,
            name(names, account.user_id),
            amount(account.balance)
        );
    }
    text
}

pub fn history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No finished rounds in this chat yet.".to_string();
    }
    let mut text = String::from("Recent rounds:");
    for entry in entries {
        let result = &entry.result;
        let summary = match (&result.status, &result.outcome) {
            (RoundStatus::Cancelled, _) => "cancelled".to_string(),
            (_, Some(Outcome::Roulette { number, color })) => format!("{} {}", number, color),
            (_, Some(Outcome::Crash { multiplier } | Outcome::Dream { multiplier })) => multiplier.to_string(),
            (_, Some(Outcome::Dice { winner, .. })) => format!("won by {}", mention(*winner)),
            (_, None) => "-".to_string(),
        };
        let _ = write!(
            text,
            "\n  {} {}: {}, {} bet(s), {} wagered",
            entry.round.created_at.format("%H:%M"),
            result.kind,
            summary,
            result.bet_count,
            amount(result.total_wagered)
        );
    }
    text
}

pub fn banned(user: UserId) -> String {
    format!("{} is banned from the bot.", mention(user))
}

pub fn unbanned(user: UserId, was_banned: bool) -> String {
    if was_banned {
        format!("{} is no longer banned.", mention(user))
    } else {
        format!("{} was not banned.", mention(user))
    }
}

pub fn muted(user: UserId, until: DateTime<Utc>) -> String {
    format!("{} is muted until {} UTC.", mention(user), until.format("%Y-%m-%d %H:%M"))
}

pub fn unmuted(user: UserId, was_muted: bool) -> String {
    if was_muted {
        format!("{} can talk again.", mention(user))
    } else {
        format!("{} was not muted.", mention(user))
    }
}

pub fn warned(user: UserId, outcome: &WarnOutcome) -> String {
    match outcome.muted_until {
        Some(until) => format!(
            "{} reached {} warnings and is muted until {} UTC.",
            mention(user),
            outcome.limit,
            until.format("%Y-%m-%d %H:%M")
        ),
        None => format!("{} warned ({}/{}).", mention(user), outcome.count, outcome.limit),
    }
}

pub fn help() -> String {
    [
        "Games:",
        "  /roulette - open a roulette round",
        "  /bet <red|black|even|odd|0-36> <amount>",
        "  /crash <multiplier> <amount>",
        "  /dream <multiplier> <amount>",
        "  /dice [list | <wager> [seats] | join <n> | cancel <n>]",
        "Coins:",
        "  /balance, /bonus, /top, /history",
        "  /transfer <amount> <user>",
        "Amounts accept 5k, 1.5m or all.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{Color, DiceRoll, Multiplier, Winner};
    use uuid::Uuid;

    fn finished(kind: GameKind, outcome: Outcome, winners: Vec<Winner>, lost: i64) -> RoundResult {
        RoundResult {
            round_id: Uuid::new_v4(),
            scope: 1,
            kind,
            status: RoundStatus::Ended,
            outcome: Some(outcome),
            total_paid: winners.iter().map(|w| w.payout).sum(),
            winners,
            total_wagered: 1_000,
            total_lost: lost,
            bet_count: 2,
        }
    }

    #[test]
    fn test_amount_grouping() {
        assert_eq!(amount(0), "0");
        assert_eq!(amount(999), "999");
        assert_eq!(amount(1_000), "1,000");
        assert_eq!(amount(1_234_567), "1,234,567");
        assert_eq!(amount(-50_000), "-50,000");
    }

    #[test]
    fn test_roulette_result_lists_winners() {
        let result = finished(
            GameKind::Roulette,
            Outcome::Roulette { number: 1, color: Color::Red },
            vec![Winner {
                user_id: 5,
                wager: 500,
                payout: 1_000,
                target: None,
            }],
            500,
        );
        let names = HashMap::from([(5, "Alice".to_string())]);
        let text = round_result(&result, &names);
        assert!(text.contains("landed on 1 (red)"));
        assert!(text.contains("Alice won 1,000"));
        assert!(text.contains("Total lost: 500"));
    }

    #[test]
    fn test_crash_result_without_winners() {
        let result = finished(
            GameKind::Crash,
            Outcome::Crash {
                multiplier: Multiplier::from_hundredths(150),
            },
            vec![],
            100,
        );
        let text = round_result(&result, &HashMap::new());
        assert!(text.contains("x1.50"));
        assert!(text.contains("Nobody won"));
        assert!(text.contains("Total lost: 100"));
    }

    #[test]
    fn test_dice_result_mentions_rerolls() {
        let rolls = vec![
            DiceRoll {
                user_id: 1,
                value: 6,
                rerolls: 1,
            },
            DiceRoll {
                user_id: 2,
                value: 3,
                rerolls: 1,
            },
        ];
        let result = finished(GameKind::Dice, Outcome::Dice { winner: 1, rolls }, vec![], 200);
        let text = round_result(&result, &HashMap::new());
        assert!(text.contains("[id1|id1] rolled 6"));
        assert!(text.contains("reroll"));
        assert!(text.contains("[id1|id1] takes the pot"));
    }

    #[test]
    fn test_cancelled_round_reports_refund() {
        let mut result = finished(GameKind::Dream, Outcome::Dream { multiplier: Multiplier::MIN_TARGET }, vec![], 0);
        result.status = RoundStatus::Cancelled;
        assert!(round_result(&result, &HashMap::new()).contains("1,000 refunded"));
    }
}
