//! Persistent round, bet and statistics records stored in RocksDB.

use crate::{
    errors::{BotResult, StorageError},
    games::types::{Bet, GameKind, Round, RoundId, RoundResult, RoundStatus, ScopeId},
    storage::{encode_json, BatchOp, Storage},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

const ROUND_PREFIX: &str = "round:";
const BETS_PREFIX: &str = "round:bets:";
const ACTIVE_PREFIX: &str = "round:active:";
const RECENT_PREFIX: &str = "round:recent:";
const STATS_PREFIX: &str = "stats:";

fn round_key(id: &RoundId) -> Vec<u8> {
    format!("{}{}", ROUND_PREFIX, id).into_bytes()
}

fn bets_prefix(id: &RoundId) -> Vec<u8> {
    format!("{}{}:", BETS_PREFIX, id).into_bytes()
}

fn bet_key(bet: &Bet) -> Vec<u8> {
    // zero-padded so prefix scans return bets in arrival order
    format!("{}{}:{:08}", BETS_PREFIX, bet.round_id, bet.seq).into_bytes()
}

fn active_key(id: &RoundId) -> Vec<u8> {
    format!("{}{}", ACTIVE_PREFIX, id).into_bytes()
}

fn recent_prefix(scope: ScopeId) -> Vec<u8> {
    format!("{}{}:", RECENT_PREFIX, scope).into_bytes()
}

fn recent_key(scope: ScopeId, ended_at: DateTime<Utc>, id: &RoundId) -> Vec<u8> {
    // Sort newest-first by using an inverted timestamp as the primary sort key.
    let inv_ts = u64::MAX - ended_at.timestamp_millis().max(0) as u64;
    format!("{}{}:{:016x}:{}", RECENT_PREFIX, scope, inv_ts, id).into_bytes()
}

fn stats_key(kind: GameKind) -> Vec<u8> {
    format!("{}{}", STATS_PREFIX, kind).into_bytes()
}

/// Finished round as listed by `/history`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub round: Round,
    pub result: RoundResult,
}

/// Aggregate statistics per game kind
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStats {
    pub kind: Option<GameKind>,
    pub rounds_played: u64,
    pub rounds_cancelled: u64,
    pub bets: u64,
    pub total_wagered: i64,
    pub total_paid_out: i64,
    pub biggest_win: i64,
}

pub struct RoundStore {
    storage: Storage,
    /// Serializes read-modify-write of the stats records
    stats_lock: Mutex<()>,
}

impl RoundStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            stats_lock: Mutex::new(()),
        }
    }

    /// Persist a newly opened round together with its active marker
    pub fn save_open(&self, round: &Round) -> BotResult<()> {
        self.storage.batch_write(vec![
            BatchOp::Put(round_key(&round.id), encode_json(round)?),
            BatchOp::Put(active_key(&round.id), round.scope.to_string().into_bytes()),
        ])
    }

    pub fn record_bet(&self, bet: &Bet) -> BotResult<()> {
        self.storage.put_json(&bet_key(bet), bet)
    }

    pub fn load_round(&self, id: &RoundId) -> BotResult<Option<Round>> {
        self.storage.get_json(&round_key(id))
    }

    pub fn load_bets(&self, id: &RoundId) -> BotResult<Vec<Bet>> {
        let prefix = bets_prefix(id);
        let mut bets = Vec::new();
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let rows = self.storage.scan_prefix(&prefix, cursor.as_deref(), 256)?;
            let Some((last_key, _)) = rows.last() else {
                break;
            };
            cursor = Some(last_key.clone());
            for (_, value) in &rows {
                bets.push(serde_json::from_slice(value)?);
            }
            if rows.len() < 256 {
                break;
            }
        }
        Ok(bets)
    }

    /// Write the final round record, drop the active marker, index it for
    /// history and fold it into the per-kind stats, all in one batch
    pub fn finish(&self, round: &Round, result: &RoundResult) -> BotResult<()> {
        let ended_at = round.ended_at.unwrap_or(round.created_at);
        let entry = HistoryEntry {
            round: round.clone(),
            result: result.clone(),
        };

        let _guard = self.stats_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stats = self.load_stats(round.kind)?;
        stats.kind = Some(round.kind);
        match result.status {
            RoundStatus::Cancelled => stats.rounds_cancelled += 1,
            _ => {
                stats.rounds_played += 1;
                stats.bets += result.bet_count as u64;
                stats.total_wagered += result.total_wagered;
                stats.total_paid_out += result.total_paid;
                let best = result.winners.iter().map(|w| w.payout).max().unwrap_or(0);
                stats.biggest_win = stats.biggest_win.max(best);
            }
        }

        self.storage.batch_write(vec![
            BatchOp::Put(round_key(&round.id), encode_json(round)?),
            BatchOp::Delete(active_key(&round.id)),
            BatchOp::Put(recent_key(round.scope, ended_at, &round.id), encode_json(&entry)?),
            BatchOp::Put(stats_key(round.kind), encode_json(&stats)?),
        ])
    }

    /// Rounds whose active marker survived a previous process
    pub fn interrupted_rounds(&self) -> BotResult<Vec<Round>> {
        let rows = self.storage.scan_prefix(ACTIVE_PREFIX.as_bytes(), None, usize::MAX)?;
        let mut rounds = Vec::with_capacity(rows.len());
        for (key, _) in rows {
            let id_str = String::from_utf8_lossy(&key[ACTIVE_PREFIX.len()..]).to_string();
            let id: RoundId = id_str
                .parse()
                .map_err(|e| StorageError::CorruptedData(format!("Bad active round key {}: {}", id_str, e)))?;
            match self.load_round(&id)? {
                Some(round) => rounds.push(round),
                None => {
                    tracing::warn!(round_id = %id, "Active marker without round record, dropping");
                    self.storage.delete(&key)?;
                }
            }
        }
        Ok(rounds)
    }

    /// Page through finished rounds of a scope, newest first
    pub fn recent_rounds(
        &self,
        scope: ScopeId,
        cursor_hex: Option<&str>,
        limit: usize,
    ) -> BotResult<(Vec<HistoryEntry>, Option<String>)> {
        let cursor_bytes = match cursor_hex {
            Some(c) => Some(
                hex::decode(c).map_err(|e| StorageError::InvalidCursor(e.to_string()))?,
            ),
            None => None,
        };

        let limit = limit.max(1);
        let rows = self
            .storage
            .scan_prefix(&recent_prefix(scope), cursor_bytes.as_deref(), limit)?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut next_cursor = None;
        for (key, value) in &rows {
            entries.push(serde_json::from_slice(value)?);
            next_cursor = Some(hex::encode(key));
        }

        // Only return cursor if we might have more results
        if rows.len() < limit {
            next_cursor = None;
        }
        Ok((entries, next_cursor))
    }

    pub fn load_stats(&self, kind: GameKind) -> BotResult<GameStats> {
        Ok(self.storage.get_json(&stats_key(kind))?.unwrap_or_else(|| GameStats {
            kind: Some(kind),
            ..Default::default()
        }))
    }

    pub fn all_stats(&self) -> BotResult<Vec<GameStats>> {
        [GameKind::Roulette, GameKind::Crash, GameKind::Dream, GameKind::Dice]
            .into_iter()
            .map(|kind| self.load_stats(kind))
            .collect()
    }
}
