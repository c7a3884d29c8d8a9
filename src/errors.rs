//! Error types for the wagerbot system
//!
//! `GameError` is the recoverable taxonomy surfaced to chat users; everything
//! else is infrastructure failure that gets logged and apologised for.

use crate::games::types::GameKind;

/// Root error type for all wagerbot operations
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Rejected game, ledger or moderation request
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Storage system errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Outbound messaging errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Event queue errors
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Metric registration or encoding errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// User-recoverable failures of game, ledger and moderation operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid bet target: {0}")]
    InvalidTarget(String),

    #[error("Insufficient funds: balance {balance}, needed {needed}")]
    InsufficientFunds { balance: i64, needed: i64 },

    #[error("No active {0} round")]
    NoActiveRound(GameKind),

    #[error("Round {0} is already resolving")]
    RoundAlreadyResolving(String),

    #[error("Player {0} already joined this lobby")]
    DuplicateJoin(i64),

    #[error("Lobby creator cannot join their own lobby")]
    SelfJoinForbidden,

    #[error("Lobby is full")]
    LobbyFull,

    #[error("Too many active dice lobbies (max {0})")]
    TooManyActiveLobbies(usize),

    #[error("Dice lobby #{0} not found")]
    LobbyNotFound(u64),

    #[error("Only the lobby creator can cancel it")]
    NotLobbyCreator,

    #[error("Bonus available again in {remaining_secs}s")]
    BonusTooEarly { remaining_secs: i64 },

    #[error("Cannot transfer to yourself")]
    SelfTransfer,

    #[error("Permission denied")]
    PermissionDenied,
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue { field: String, value: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Invalid history cursor: {0}")]
    InvalidCursor(String),
}

/// Outbound messaging errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Delivery to {scope} failed: {reason}")]
    DeliveryFailed { scope: i64, reason: String },

    #[error("Identity lookup failed for {0}")]
    IdentityUnavailable(i64),

    #[error("Event source closed: {0}")]
    SourceClosed(String),
}

impl From<rocksdb::Error> for BotError {
    fn from(e: rocksdb::Error) -> Self {
        BotError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<std::io::Error> for BotError {
    fn from(e: std::io::Error) -> Self {
        BotError::Storage(StorageError::ReadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl BotError {
    /// The game error behind this failure, if it is user-recoverable
    pub fn as_game(&self) -> Option<&GameError> {
        match self {
            BotError::Game(e) => Some(e),
            _ => None,
        }
    }

    /// Text shown in chat when a command fails
    pub fn user_message(&self) -> String {
        match self {
            BotError::Game(e) => e.user_message(),
            _ => "Something went wrong, please try again later.".to_string(),
        }
    }
}

impl GameError {
    /// Short reason label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            GameError::InvalidAmount(_) => "invalid_amount",
            GameError::InvalidTarget(_) => "invalid_target",
            GameError::InsufficientFunds { .. } => "insufficient_funds",
            GameError::NoActiveRound(_) => "no_active_round",
            GameError::RoundAlreadyResolving(_) => "round_resolving",
            GameError::DuplicateJoin(_) => "duplicate_join",
            GameError::SelfJoinForbidden => "self_join",
            GameError::LobbyFull => "lobby_full",
            GameError::TooManyActiveLobbies(_) => "too_many_lobbies",
            GameError::LobbyNotFound(_) => "lobby_not_found",
            GameError::NotLobbyCreator => "not_creator",
            GameError::BonusTooEarly { .. } => "bonus_too_early",
            GameError::SelfTransfer => "self_transfer",
            GameError::PermissionDenied => "permission_denied",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GameError::InvalidAmount(msg) => format!("Invalid amount: {}", msg),
            GameError::InvalidTarget(msg) => format!("Invalid bet: {}", msg),
            GameError::InsufficientFunds { balance, needed } => {
                format!("Not enough coins: you have {}, need {}", balance, needed)
            }
            GameError::NoActiveRound(kind) => format!("There is no open {} round", kind),
            GameError::RoundAlreadyResolving(_) => {
                "Bets are closed for this round, try again in a moment".to_string()
            }
            GameError::DuplicateJoin(_) => "You already joined this lobby".to_string(),
            GameError::SelfJoinForbidden => "You cannot join your own lobby".to_string(),
            GameError::LobbyFull => "This lobby is full".to_string(),
            GameError::TooManyActiveLobbies(max) => {
                format!("This chat already has {} open dice lobbies", max)
            }
            GameError::LobbyNotFound(n) => format!("Dice lobby #{} does not exist", n),
            GameError::NotLobbyCreator => "Only the lobby creator can cancel it".to_string(),
            GameError::BonusTooEarly { remaining_secs } => {
                let minutes = (remaining_secs + 59) / 60;
                format!("Bonus is not ready yet, come back in {} min", minutes)
            }
            GameError::SelfTransfer => "You cannot transfer coins to yourself".to_string(),
            GameError::PermissionDenied => "You are not allowed to do that".to_string(),
        }
    }
}

// Convenience type alias for Results
pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BotError::Configuration(ConfigurationError::ValidationFailed("test".to_string()));
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("test"));
    }

    #[test]
    fn test_game_error_conversion() {
        let err: BotError = GameError::LobbyFull.into();
        assert_eq!(err.as_game(), Some(&GameError::LobbyFull));
        assert_eq!(err.user_message(), "This lobby is full");
    }

    #[test]
    fn test_infrastructure_errors_are_not_leaked() {
        let err = BotError::Storage(StorageError::WriteFailed("disk on fire".to_string()));
        assert!(err.as_game().is_none());
        assert!(!err.user_message().contains("disk"));
    }

    #[test]
    fn test_bonus_message_rounds_up_minutes() {
        let err = GameError::BonusTooEarly { remaining_secs: 61 };
        assert!(err.user_message().contains("2 min"));
    }
}
