//! Chat command parsing
//!
//! Commands start with `/` or `!`, may carry a `@botname` suffix, and are
//! matched case-insensitively. Text that is not a command parses to `None`.

use crate::errors::GameError;
use crate::games::types::{Multiplier, RouletteBet, UserId};

/// Stake as typed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    Exact(i64),
    /// Entire current balance
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiceCommand {
    List,
    Create { wager: Amount, seats: Option<usize> },
    Join(u64),
    Cancel(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Roulette,
    Bet { bet: RouletteBet, amount: Amount },
    Crash { target: Multiplier, amount: Amount },
    Dream { target: Multiplier, amount: Amount },
    Dice(DiceCommand),
    Bonus,
    Transfer { amount: Amount, to: UserId },
    Balance,
    Top,
    History,
    Help,
    Ban(UserId),
    Unban(UserId),
    Mute { user: UserId, minutes: i64 },
    Unmute(UserId),
    Warn(UserId),
}

/// Parse `5000`, `5k`, `1.5k`, `2m` or `all`
pub fn parse_amount(token: &str) -> Result<Amount, GameError> {
    let token = token.trim().to_lowercase().replace('_', "");
    if token == "all" || token == "allin" {
        return Ok(Amount::All);
    }
    let invalid = || GameError::InvalidAmount(format!("'{}' is not an amount", token));

    let (digits, factor) = match token.chars().last() {
        Some('k') => (&token[..token.len() - 1], 1_000i64),
        Some('m') => (&token[..token.len() - 1], 1_000_000i64),
        _ => (token.as_str(), 1i64),
    };
    if digits.is_empty() {
        return Err(invalid());
    }

    let value = match digits.split_once(['.', ',']) {
        None => digits.parse::<i64>().map_err(|_| invalid())?.checked_mul(factor),
        Some((whole, frac)) if factor > 1 && !frac.is_empty() && frac.len() <= 3 => {
            let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
            let frac_value: i64 = frac.parse().map_err(|_| invalid())?;
            let scale = 10i64.pow(frac.len() as u32);
            whole
                .checked_mul(factor)
                .and_then(|w| w.checked_add(frac_value * factor / scale))
        }
        Some(_) => return Err(invalid()),
    }
    .ok_or_else(|| GameError::InvalidAmount("amount is too large".to_string()))?;

    if value <= 0 {
        return Err(GameError::InvalidAmount("amount must be positive".to_string()));
    }
    Ok(Amount::Exact(value))
}

/// Parse `123`, `id123`, `@id123` or a `[id123|Name]` mention
pub fn parse_user(token: &str) -> Result<UserId, GameError> {
    let token = token.trim();
    let inner = token
        .strip_prefix('[')
        .and_then(|t| t.split_once('|'))
        .map(|(id, _)| id)
        .unwrap_or(token);
    let digits = inner.trim_start_matches('@').trim_start_matches("id");
    digits
        .parse()
        .map_err(|_| GameError::InvalidTarget(format!("'{}' is not a user", token)))
}

fn parse_multiplier(token: &str) -> Result<Multiplier, GameError> {
    token.parse().map_err(GameError::InvalidTarget)
}

fn usage(text: &str) -> GameError {
    GameError::InvalidTarget(format!("usage: {}", text))
}

fn parse_dice(args: &[&str]) -> Result<DiceCommand, GameError> {
    match args {
        [] | ["list"] => Ok(DiceCommand::List),
        ["join", n] => n.trim_start_matches('#').parse().map(DiceCommand::Join).map_err(|_| usage("/dice join <n>")),
        ["cancel", n] => n
            .trim_start_matches('#')
            .parse()
            .map(DiceCommand::Cancel)
            .map_err(|_| usage("/dice cancel <n>")),
        [wager] => Ok(DiceCommand::Create {
            wager: parse_amount(wager)?,
            seats: None,
        }),
        [wager, seats] => Ok(DiceCommand::Create {
            wager: parse_amount(wager)?,
            seats: Some(seats.parse().map_err(|_| usage("/dice <wager> [seats]"))?),
        }),
        _ => Err(usage("/dice [list | <wager> [seats] | join <n> | cancel <n>]")),
    }
}

/// Parse one chat message. `None` means the text is not addressed to the bot.
pub fn parse(text: &str) -> Option<Result<Command, GameError>> {
    let text = text.trim();
    let body = text.strip_prefix('/').or_else(|| text.strip_prefix('!'))?;
    let mut parts = body.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let name = head.split('@').next().unwrap_or_default().to_string();
    let args: Vec<String> = parts.map(|p| p.to_lowercase()).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let command = match (name.as_str(), args.as_slice()) {
        ("roulette" | "r", []) => Ok(Command::Roulette),
        ("bet", [target, amount]) => target
            .parse::<RouletteBet>()
            .map_err(GameError::InvalidTarget)
            .and_then(|bet| Ok(Command::Bet { bet, amount: parse_amount(amount)? })),
        ("bet", _) => Err(usage("/bet <red|black|even|odd|0-36> <amount>")),
        ("crash", [target, amount]) => parse_multiplier(target).and_then(|target| {
            Ok(Command::Crash {
                target,
                amount: parse_amount(amount)?,
            })
        }),
        ("crash", _) => Err(usage("/crash <multiplier> <amount>")),
        ("dream", [target, amount]) => parse_multiplier(target).and_then(|target| {
            Ok(Command::Dream {
                target,
                amount: parse_amount(amount)?,
            })
        }),
        ("dream", _) => Err(usage("/dream <multiplier> <amount>")),
        ("dice", rest) => parse_dice(rest).map(Command::Dice),
        ("bonus", []) => Ok(Command::Bonus),
        ("transfer" | "pay", [amount, user]) => parse_amount(amount).and_then(|amount| {
            Ok(Command::Transfer {
                amount,
                to: parse_user(user)?,
            })
        }),
        ("transfer" | "pay", _) => Err(usage("/transfer <amount> <user>")),
        ("balance" | "bal", []) => Ok(Command::Balance),
        ("top", []) => Ok(Command::Top),
        ("history", []) => Ok(Command::History),
        ("help" | "start", _) => Ok(Command::Help),
        ("ban", [user]) => parse_user(user).map(Command::Ban),
        ("unban", [user]) => parse_user(user).map(Command::Unban),
        ("mute", [user, minutes]) => parse_user(user).and_then(|user| {
            let minutes = minutes.parse().map_err(|_| usage("/mute <user> <minutes>"))?;
            Ok(Command::Mute { user, minutes })
        }),
        ("unmute", [user]) => parse_user(user).map(Command::Unmute),
        ("warn", [user]) => parse_user(user).map(Command::Warn),
        ("ban" | "unban" | "unmute" | "warn", _) => Err(usage(&format!("/{} <user>", name))),
        ("mute", _) => Err(usage("/mute <user> <minutes>")),
        _ => return None,
    };
    Some(command)
}
