//! Random outcomes and the payout rules evaluated against them

use crate::games::types::{BetTarget, Color, DiceRoll, GameKind, Multiplier, Outcome, RouletteBet, UserId};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Numbers coloured red on a European wheel; every other non-zero number is black
pub const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

/// `(weight percent, low, high)` with bounds in hundredths
type Bucket = (u32, u32, u32);

const CRASH_BUCKETS: [Bucket; 6] = [
    (40, 101, 150),
    (30, 150, 300),
    (15, 300, 1_000),
    (10, 1_000, 5_000),
    (4, 5_000, 20_000),
    (1, 20_000, 150_000),
];

const DREAM_BUCKETS: [Bucket; 5] = [
    (50, 101, 200),
    (30, 200, 500),
    (15, 500, 1_000),
    (4, 1_000, 5_000),
    (1, 5_000, 10_000),
];

/// Source of raw random draws, swappable so tests can force outcomes
pub trait OutcomeSource: Send + Sync {
    /// Uniform in 0..=36
    fn roulette(&self) -> u8;
    fn crash(&self) -> Multiplier;
    fn dream(&self) -> Multiplier;
    /// Uniform in 1..=6
    fn die(&self) -> u8;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomOutcomes;

impl RandomOutcomes {
    fn sample_buckets(buckets: &[Bucket]) -> Multiplier {
        let mut rng = rand::thread_rng();
        let total: u32 = buckets.iter().map(|(w, _, _)| w).sum();
        let mut roll = rng.gen_range(0..total);
        for &(weight, low, high) in buckets {
            if roll < weight {
                return Multiplier::from_hundredths(rng.gen_range(low..=high));
            }
            roll -= weight;
        }
        Multiplier::MIN_TARGET
    }
}

impl OutcomeSource for RandomOutcomes {
    fn roulette(&self) -> u8 {
        rand::thread_rng().gen_range(0..=36)
    }

    fn crash(&self) -> Multiplier {
        Self::sample_buckets(&CRASH_BUCKETS)
    }

    fn dream(&self) -> Multiplier {
        Self::sample_buckets(&DREAM_BUCKETS)
    }

    fn die(&self) -> u8 {
        rand::thread_rng().gen_range(1..=6)
    }
}

/// Queued draws for deterministic tests; falls back to random draws once a queue runs dry
#[derive(Debug, Default)]
pub struct ScriptedOutcomes {
    roulette: Mutex<VecDeque<u8>>,
    crash: Mutex<VecDeque<Multiplier>>,
    dream: Mutex<VecDeque<Multiplier>>,
    dice: Mutex<VecDeque<u8>>,
}

fn pop<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
}

fn push<T>(queue: &Mutex<VecDeque<T>>, values: impl IntoIterator<Item = T>) {
    queue.lock().unwrap_or_else(PoisonError::into_inner).extend(values);
}

impl ScriptedOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_roulette(&self, number: u8) {
        push(&self.roulette, [number]);
    }

    pub fn push_crash(&self, multiplier: Multiplier) {
        push(&self.crash, [multiplier]);
    }

    pub fn push_dream(&self, multiplier: Multiplier) {
        push(&self.dream, [multiplier]);
    }

    /// Die faces consumed in participant order, one per roll
    pub fn push_dice(&self, faces: impl IntoIterator<Item = u8>) {
        push(&self.dice, faces);
    }
}

impl OutcomeSource for ScriptedOutcomes {
    fn roulette(&self) -> u8 {
        pop(&self.roulette).unwrap_or_else(|| RandomOutcomes.roulette())
    }

    fn crash(&self) -> Multiplier {
        pop(&self.crash).unwrap_or_else(|| RandomOutcomes.crash())
    }

    fn dream(&self) -> Multiplier {
        pop(&self.dream).unwrap_or_else(|| RandomOutcomes.dream())
    }

    fn die(&self) -> u8 {
        pop(&self.dice).unwrap_or_else(|| RandomOutcomes.die())
    }
}

pub fn roulette_color(number: u8) -> Color {
    if number == 0 {
        Color::Green
    } else if RED_NUMBERS.contains(&number) {
        Color::Red
    } else {
        Color::Black
    }
}

/// Draw the outcome of a timed round. Dice lobbies roll through [`roll_dice`].
pub fn draw_timed(source: &dyn OutcomeSource, kind: GameKind) -> Option<Outcome> {
    match kind {
        GameKind::Roulette => {
            let number = source.roulette();
            Some(Outcome::Roulette {
                number,
                color: roulette_color(number),
            })
        }
        GameKind::Crash => Some(Outcome::Crash {
            multiplier: source.crash(),
        }),
        GameKind::Dream => Some(Outcome::Dream {
            multiplier: source.dream(),
        }),
        GameKind::Dice => None,
    }
}

/// Gross payout of a roulette bet, or `None` when it loses
pub fn roulette_payout(bet: RouletteBet, number: u8, wager: i64) -> Option<i64> {
    let color = roulette_color(number);
    let wins = match bet {
        RouletteBet::Number(n) => n == number,
        RouletteBet::Red => color == Color::Red,
        RouletteBet::Black => color == Color::Black,
        RouletteBet::Even => number != 0 && number % 2 == 0,
        RouletteBet::Odd => number % 2 == 1,
    };
    if !wins {
        return None;
    }
    let factor = match bet {
        RouletteBet::Number(_) => 36,
        _ => 2,
    };
    Some(wager.saturating_mul(factor))
}

/// Crash and dream bets win when the target does not exceed the drawn value
pub fn multiplier_payout(target: Multiplier, drawn: Multiplier, wager: i64) -> Option<i64> {
    (target <= drawn).then(|| target.apply(wager))
}

/// Evaluate one bet against the round outcome
pub fn payout_for(target: &BetTarget, outcome: &Outcome, wager: i64) -> Option<i64> {
    match (target, outcome) {
        (BetTarget::Roulette { bet }, Outcome::Roulette { number, .. }) => roulette_payout(*bet, *number, wager),
        (BetTarget::Multiplier { target }, Outcome::Crash { multiplier })
        | (BetTarget::Multiplier { target }, Outcome::Dream { multiplier }) => {
            multiplier_payout(*target, *multiplier, wager)
        }
        _ => None,
    }
}

/// Roll one die per participant, rerolling everyone until the maximum is unique
pub fn roll_dice(source: &dyn OutcomeSource, participants: &[UserId]) -> Option<(UserId, Vec<DiceRoll>)> {
    if participants.is_empty() {
        return None;
    }
    let mut rerolls = 0;
    loop {
        let rolls: Vec<DiceRoll> = participants
            .iter()
            .map(|&user_id| DiceRoll {
                user_id,
                value: source.die(),
                rerolls,
            })
            .collect();
        let max = rolls.iter().map(|r| r.value).max().unwrap_or(0);
        let mut top = rolls.iter().filter(|r| r.value == max);
        if let (Some(winner), None) = (top.next(), top.next()) {
            return Some((winner.user_id, rolls));
        }
        rerolls += 1;
    }
}
