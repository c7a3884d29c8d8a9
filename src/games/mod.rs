pub mod context;
pub mod dice;
pub mod engine;
pub mod outcome;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod types;
pub mod window;

pub use dice::{DiceHall, JoinOutcome, LobbyView};
pub use engine::{GameEngine, ScopeOverview};
pub use outcome::{OutcomeSource, RandomOutcomes, ScriptedOutcomes};
pub use types::*;
pub use window::BettingWindow;
