//! System bans, per-chat mutes and warning counters
//!
//! Messages from banned or muted users are dropped before command parsing,
//! which is also what keeps them out of every game.

use crate::{
    clock::Clock,
    config::ModerationConfig,
    errors::{BotResult, GameError},
    games::types::{ScopeId, UserId},
    storage::Storage,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn ban_key(user: UserId) -> Vec<u8> {
    format!("mod:ban:{}", user).into_bytes()
}

fn mute_key(scope: ScopeId, user: UserId) -> Vec<u8> {
    format!("mod:mute:{}:{}", scope, user).into_bytes()
}

fn warn_key(scope: ScopeId, user: UserId) -> Vec<u8> {
    format!("mod:warn:{}:{}", scope, user).into_bytes()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanRecord {
    pub user_id: UserId,
    pub banned_by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRecord {
    pub user_id: UserId,
    pub muted_by: UserId,
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WarnRecord {
    count: u32,
}

/// Why a user's messages are being dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Silence {
    Banned,
    Muted { until: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarnOutcome {
    /// Warnings on record after this one; zero once the limit triggered a mute
    pub count: u32,
    pub limit: u32,
    pub muted_until: Option<DateTime<Utc>>,
}

pub struct ModerationStore {
    storage: Storage,
    clock: Arc<dyn Clock>,
    config: ModerationConfig,
}

impl ModerationStore {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>, config: ModerationConfig) -> Self {
        Self { storage, clock, config }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.config.admins.contains(&user)
    }

    /// Actor must be an admin and the target must not be one
    fn authorize(&self, actor: UserId, target: UserId) -> Result<(), GameError> {
        if !self.is_admin(actor) || self.is_admin(target) {
            return Err(GameError::PermissionDenied);
        }
        Ok(())
    }

    pub fn silenced(&self, scope: ScopeId, user: UserId) -> BotResult<Option<Silence>> {
        if self.storage.get(&ban_key(user))?.is_some() {
            return Ok(Some(Silence::Banned));
        }
        let key = mute_key(scope, user);
        if let Some(mute) = self.storage.get_json::<MuteRecord>(&key)? {
            if mute.until > self.clock.now() {
                return Ok(Some(Silence::Muted { until: mute.until }));
            }
            self.storage.delete(&key)?;
        }
        Ok(None)
    }

    pub fn ban(&self, actor: UserId, user: UserId) -> BotResult<()> {
        self.authorize(actor, user)?;
        let record = BanRecord {
            user_id: user,
            banned_by: actor,
            at: self.clock.now(),
        };
        self.storage.put_json(&ban_key(user), &record)?;
        info!(actor, user, "User banned");
        Ok(())
    }

    /// Returns false when the user was not banned
    pub fn unban(&self, actor: UserId, user: UserId) -> BotResult<bool> {
        self.authorize(actor, user)?;
        let key = ban_key(user);
        if self.storage.get(&key)?.is_none() {
            return Ok(false);
        }
        self.storage.delete(&key)?;
        info!(actor, user, "User unbanned");
        Ok(true)
    }

    pub fn mute(&self, actor: UserId, scope: ScopeId, user: UserId, minutes: i64) -> BotResult<DateTime<Utc>> {
        self.authorize(actor, user)?;
        if minutes <= 0 {
            return Err(GameError::InvalidAmount("mute length must be positive".to_string()).into());
        }
        self.mute_unchecked(actor, scope, user, minutes)
    }

    fn mute_unchecked(&self, actor: UserId, scope: ScopeId, user: UserId, minutes: i64) -> BotResult<DateTime<Utc>> {
        let until = Duration::try_minutes(minutes)
            .and_then(|length| self.clock.now().checked_add_signed(length))
            .ok_or_else(|| GameError::InvalidAmount("mute length is too long".to_string()))?;
        let record = MuteRecord {
            user_id: user,
            muted_by: actor,
            until,
        };
        self.storage.put_json(&mute_key(scope, user), &record)?;
        info!(actor, scope, user, %until, "User muted");
        Ok(until)
    }

    pub fn unmute(&self, actor: UserId, scope: ScopeId, user: UserId) -> BotResult<bool> {
        self.authorize(actor, user)?;
        let key = mute_key(scope, user);
        if self.storage.get(&key)?.is_none() {
            return Ok(false);
        }
        self.storage.delete(&key)?;
        Ok(true)
    }

    /// Add a warning; hitting the limit mutes the user and resets the counter
    pub fn warn(&self, actor: UserId, scope: ScopeId, user: UserId) -> BotResult<WarnOutcome> {
        self.authorize(actor, user)?;
        let key = warn_key(scope, user);
        let mut record: WarnRecord = self.storage.get_json(&key)?.unwrap_or_default();
        record.count += 1;

        let limit = self.config.warn_limit;
        if record.count >= limit {
            let until = self.mute_unchecked(actor, scope, user, self.config.warn_mute_minutes)?;
            self.storage.delete(&key)?;
            return Ok(WarnOutcome {
                count: 0,
                limit,
                muted_until: Some(until),
            });
        }

        self.storage.put_json(&key, &record)?;
        Ok(WarnOutcome {
            count: record.count,
            limit,
            muted_until: None,
        })
    }
}
