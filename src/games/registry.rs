//! In-memory registry of open rounds, one per (scope, kind)

use crate::games::types::{Bet, GameKind, Round, RoundId, ScopeId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Phase of a round while it is still registered
#[derive(Debug)]
pub enum RoundPhase {
    Open { bets: Vec<Bet> },
    /// Bets have been handed to the resolver; nothing else may be added
    Resolving,
}

/// A round that is accepting bets
#[derive(Debug)]
pub struct ActiveRound {
    pub round: Round,
    /// Monotonic open time, used to cap window extension
    pub opened: Instant,
    phase: Mutex<RoundPhase>,
}

impl ActiveRound {
    pub fn new(round: Round) -> Self {
        Self {
            round,
            opened: Instant::now(),
            phase: Mutex::new(RoundPhase::Open { bets: Vec::new() }),
        }
    }

    pub fn id(&self) -> RoundId {
        self.round.id
    }

    /// Exclusive access to the bet list; callers must check the phase
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, RoundPhase> {
        self.phase.lock().await
    }

    /// Flip Open to Resolving and take the bets. Only the first caller gets `Some`.
    pub async fn begin_resolution(&self) -> Option<Vec<Bet>> {
        let mut phase = self.phase.lock().await;
        match std::mem::replace(&mut *phase, RoundPhase::Resolving) {
            RoundPhase::Open { bets } => Some(bets),
            RoundPhase::Resolving => None,
        }
    }

    /// Copy of the bets recorded so far; empty once resolution has begun
    pub async fn bets(&self) -> Vec<Bet> {
        match &*self.phase.lock().await {
            RoundPhase::Open { bets } => bets.clone(),
            RoundPhase::Resolving => Vec::new(),
        }
    }

    pub async fn is_open(&self) -> bool {
        matches!(*self.phase.lock().await, RoundPhase::Open { .. })
    }
}

#[derive(Default)]
pub struct RoundRegistry {
    rounds: DashMap<(ScopeId, GameKind), Arc<ActiveRound>>,
}

impl RoundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: ScopeId, kind: GameKind) -> Option<Arc<ActiveRound>> {
        self.rounds.get(&(scope, kind)).map(|r| r.value().clone())
    }

    /// Existing round for the key, or a freshly opened one. The flag is true when
    /// this call created the round. Insert-if-absent happens under the map's
    /// shard lock, so concurrent callers always agree on one round.
    pub fn get_or_create_round(
        &self,
        scope: ScopeId,
        kind: GameKind,
        now: DateTime<Utc>,
    ) -> (Arc<ActiveRound>, bool) {
        let mut created = false;
        let round = self
            .rounds
            .entry((scope, kind))
            .or_insert_with(|| {
                created = true;
                Arc::new(ActiveRound::new(Round::open(scope, kind, now)))
            })
            .value()
            .clone();
        (round, created)
    }

    /// Drop the round from active lookup if it is still the registered one
    pub fn release(&self, round: &ActiveRound) -> bool {
        self.rounds
            .remove_if(&(round.round.scope, round.round.kind), |_, current| {
                current.id() == round.id()
            })
            .is_some()
    }

    pub fn in_scope(&self, scope: ScopeId) -> Vec<Arc<ActiveRound>> {
        self.rounds
            .iter()
            .filter(|entry| entry.key().0 == scope)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_round_per_key() {
        let registry = RoundRegistry::new();
        let now = Utc::now();

        let (first, created) = registry.get_or_create_round(1, GameKind::Roulette, now);
        assert!(created);
        let (second, created) = registry.get_or_create_round(1, GameKind::Roulette, now);
        assert!(!created);
        assert_eq!(first.id(), second.id());

        let (other_kind, created) = registry.get_or_create_round(1, GameKind::Crash, now);
        assert!(created);
        assert_ne!(other_kind.id(), first.id());
        assert_eq!(registry.in_scope(1).len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_create_agrees() {
        let registry = Arc::new(RoundRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create_round(7, GameKind::Dream, Utc::now()) })
            })
            .collect();

        let mut ids = Vec::new();
        let mut creators = 0;
        for handle in handles {
            let (round, created) = handle.await.unwrap();
            ids.push(round.id());
            creators += created as usize;
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(creators, 1);
    }

    #[tokio::test]
    async fn test_resolution_gate_is_single_use() {
        let registry = RoundRegistry::new();
        let (round, _) = registry.get_or_create_round(3, GameKind::Crash, Utc::now());

        assert!(round.begin_resolution().await.is_some());
        assert!(round.begin_resolution().await.is_none());
        assert!(!round.is_open().await);

        assert!(registry.release(&round));
        assert!(!registry.release(&round));
        assert!(registry.get(3, GameKind::Crash).is_none());
    }

    #[tokio::test]
    async fn test_release_ignores_replaced_round() {
        let registry = RoundRegistry::new();
        let (old, _) = registry.get_or_create_round(3, GameKind::Crash, Utc::now());
        registry.release(&old);
        let (fresh, _) = registry.get_or_create_round(3, GameKind::Crash, Utc::now());

        assert!(!registry.release(&old));
        assert_eq!(registry.get(3, GameKind::Crash).map(|r| r.id()), Some(fresh.id()));
    }
}
