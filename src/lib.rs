//! Wagerbot - chat mini-games bot
//!
//! Timed roulette, crash and dream rounds plus multi-seat dice lobbies, played
//! with a virtual-currency ledger. Chat events come in through an
//! [`events::EventSource`], pass the moderation gate and a bounded worker
//! pool, and end up in the [`games::GameEngine`]. Replies leave through a
//! [`gateway::MessageGateway`].

pub mod clock;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod games;
pub mod gateway;
pub mod handler;
pub mod ledger;
pub mod metrics;
pub mod moderation;
pub mod render;
pub mod status;
pub mod storage;

pub use config::{BotConfig, ConfigLoader};
pub use errors::{BotError, BotResult, GameError};
pub use games::GameEngine;
