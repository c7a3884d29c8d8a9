use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Chat (or private-message peer) that owns rounds
pub type ScopeId = i64;
pub type UserId = i64;
pub type RoundId = Uuid;

/// Supported game kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Roulette,
    Crash,
    Dream,
    Dice,
}

impl GameKind {
    /// Kinds that run on a re-armable betting window
    pub const TIMED: [GameKind; 3] = [GameKind::Roulette, GameKind::Crash, GameKind::Dream];

    /// Upper bound on gross payout per unit wagered
    pub fn max_multiplier(&self) -> Multiplier {
        match self {
            GameKind::Roulette => Multiplier::from_whole(36),
            GameKind::Crash => Multiplier::from_hundredths(150_000),
            GameKind::Dream => Multiplier::from_hundredths(10_000),
            // pot of at most four seats
            GameKind::Dice => Multiplier::from_whole(4),
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::Roulette => write!(f, "roulette"),
            GameKind::Crash => write!(f, "crash"),
            GameKind::Dream => write!(f, "dream"),
            GameKind::Dice => write!(f, "dice"),
        }
    }
}

/// Payout multiplier with two decimal places, stored as hundredths
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const MIN_TARGET: Multiplier = Multiplier(101);

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    pub const fn from_whole(whole: u32) -> Self {
        Self(whole * 100)
    }

    pub fn hundredths(&self) -> u32 {
        self.0
    }

    /// `floor(wager * multiplier)`
    pub fn apply(&self, wager: i64) -> i64 {
        ((wager as i128 * self.0 as i128) / 100) as i64
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Multiplier {
    type Err = String;

    /// Accepts `2`, `2.5`, `2,50`, `x2.25`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().trim_start_matches(['x', 'X', '×']).replace(',', ".");
        let (whole, frac) = match cleaned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (cleaned.as_str(), ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(format!("'{}' is not a multiplier like 2.50", s));
        }
        let whole: u32 = whole
            .parse()
            .map_err(|_| format!("'{}' is not a multiplier like 2.50", s))?;
        let frac: u32 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u32>().map(|d| d * 10).map_err(|_| format!("'{}' is not a number", s))?,
            _ => frac.parse().map_err(|_| format!("'{}' is not a number", s))?,
        };
        whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .map(Multiplier)
            .ok_or_else(|| format!("'{}' is too large", s))
    }
}

/// Roulette wheel colour
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Red,
    Black,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Green => write!(f, "green"),
            Color::Red => write!(f, "red"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// What a single roulette bet covers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RouletteBet {
    Number(u8),
    Red,
    Black,
    Even,
    Odd,
}

impl FromStr for RouletteBet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "red" | "r" => Ok(RouletteBet::Red),
            "black" | "b" => Ok(RouletteBet::Black),
            "even" => Ok(RouletteBet::Even),
            "odd" => Ok(RouletteBet::Odd),
            other => match other.parse::<u8>() {
                Ok(n) if n <= 36 => Ok(RouletteBet::Number(n)),
                _ => Err(format!("'{}' is not red, black, even, odd or 0-36", s)),
            },
        }
    }
}

impl fmt::Display for RouletteBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouletteBet::Number(n) => write!(f, "{}", n),
            RouletteBet::Red => write!(f, "red"),
            RouletteBet::Black => write!(f, "black"),
            RouletteBet::Even => write!(f, "even"),
            RouletteBet::Odd => write!(f, "odd"),
        }
    }
}

/// Kind-specific condition a bet wins on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BetTarget {
    Roulette { bet: RouletteBet },
    /// Crash or dream: wins when the drawn value reaches the target
    Multiplier { target: Multiplier },
    /// Dice lobby seat; the pot goes to the single highest roll
    Seat,
}

impl fmt::Display for BetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetTarget::Roulette { bet } => write!(f, "{}", bet),
            BetTarget::Multiplier { target } => write!(f, "{}", target),
            BetTarget::Seat => write!(f, "seat"),
        }
    }
}

/// A wager recorded against a round; immutable once accepted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bet {
    pub round_id: RoundId,
    /// Arrival order within the round
    pub seq: u32,
    pub user_id: UserId,
    pub amount: i64,
    pub target: BetTarget,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Active,
    Ended,
    Cancelled,
}

/// Drawn result of a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum Outcome {
    Roulette { number: u8, color: Color },
    Crash { multiplier: Multiplier },
    Dream { multiplier: Multiplier },
    Dice { winner: UserId, rolls: Vec<DiceRoll> },
}

/// One participant's final roll; `rerolls` counts tie-break rounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiceRoll {
    pub user_id: UserId,
    pub value: u8,
    pub rerolls: u32,
}

/// Persistent round record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub scope: ScopeId,
    pub kind: GameKind,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
}

impl Round {
    pub fn open(scope: ScopeId, kind: GameKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            kind,
            status: RoundStatus::Active,
            created_at: now,
            ended_at: None,
            outcome: None,
        }
    }
}

/// A winning bet and what it paid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Winner {
    pub user_id: UserId,
    pub wager: i64,
    pub payout: i64,
    pub target: Option<BetTarget>,
}

/// Structured result handed to the messaging layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_id: RoundId,
    pub scope: ScopeId,
    pub kind: GameKind,
    pub status: RoundStatus,
    pub outcome: Option<Outcome>,
    pub winners: Vec<Winner>,
    pub total_wagered: i64,
    pub total_paid: i64,
    pub total_lost: i64,
    pub bet_count: usize,
}

impl RoundResult {
    pub fn cancelled(round: &Round) -> Self {
        Self {
            round_id: round.id,
            scope: round.scope,
            kind: round.kind,
            status: RoundStatus::Cancelled,
            outcome: None,
            winners: vec![],
            total_wagered: 0,
            total_paid: 0,
            total_lost: 0,
            bet_count: 0,
        }
    }
}

/// Confirmation returned to the bettor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetReceipt {
    pub round_id: RoundId,
    pub kind: GameKind,
    pub amount: i64,
    pub target: BetTarget,
    pub balance_after: i64,
    /// True when this bet opened the round
    pub opened_round: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_parsing() {
        assert_eq!("2".parse::<Multiplier>().unwrap(), Multiplier::from_hundredths(200));
        assert_eq!("2.5".parse::<Multiplier>().unwrap(), Multiplier::from_hundredths(250));
        assert_eq!("2,50".parse::<Multiplier>().unwrap(), Multiplier::from_hundredths(250));
        assert_eq!("x1.01".parse::<Multiplier>().unwrap(), Multiplier::from_hundredths(101));
        assert!("2.505".parse::<Multiplier>().is_err());
        assert!("abc".parse::<Multiplier>().is_err());
        assert!(".5".parse::<Multiplier>().is_err());
    }

    #[test]
    fn test_multiplier_apply_floors() {
        let m = Multiplier::from_hundredths(133);
        assert_eq!(m.apply(100), 133);
        assert_eq!(m.apply(7), 9); // 9.31
        assert_eq!(Multiplier::from_whole(2).to_string(), "x2.00");
    }

    #[test]
    fn test_roulette_bet_parsing() {
        assert_eq!("RED".parse::<RouletteBet>().unwrap(), RouletteBet::Red);
        assert_eq!("0".parse::<RouletteBet>().unwrap(), RouletteBet::Number(0));
        assert_eq!("36".parse::<RouletteBet>().unwrap(), RouletteBet::Number(36));
        assert!("37".parse::<RouletteBet>().is_err());
        assert!("green".parse::<RouletteBet>().is_err());
    }

    #[test]
    fn test_target_serialization_is_tagged() {
        let target = BetTarget::Roulette { bet: RouletteBet::Number(7) };
        let json = serde_json::to_value(target).unwrap();
        assert_eq!(json["kind"], "roulette");
        let back: BetTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
    }
}
