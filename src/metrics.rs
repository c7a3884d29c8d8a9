//! Prometheus metrics for games, ledger and event dispatch

use crate::errors::BotResult;
use crate::games::types::GameKind;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct GameMetrics {
    registry: Registry,
    bets_placed: IntCounterVec,
    bets_rejected: IntCounterVec,
    rounds_resolved: IntCounterVec,
    rounds_cancelled: IntCounterVec,
    amount_wagered: IntCounterVec,
    amount_paid: IntCounterVec,
    bonus_claims: IntCounter,
    transfers: IntCounter,
    events_dropped: IntCounterVec,
    active_rounds: IntGauge,
    queued_events: IntGauge,
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> BotResult<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help).namespace("wagerbot"), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn counter(registry: &Registry, name: &str, help: &str) -> BotResult<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help).namespace("wagerbot"))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> BotResult<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help).namespace("wagerbot"))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl GameMetrics {
    pub fn new() -> BotResult<Self> {
        let registry = Registry::new();
        Ok(Self {
            bets_placed: counter_vec(&registry, "bets_placed_total", "Accepted bets by game", &["kind"])?,
            bets_rejected: counter_vec(
                &registry,
                "bets_rejected_total",
                "Rejected bets and joins by reason",
                &["reason"],
            )?,
            rounds_resolved: counter_vec(&registry, "rounds_resolved_total", "Rounds paid out", &["kind"])?,
            rounds_cancelled: counter_vec(
                &registry,
                "rounds_cancelled_total",
                "Rounds cancelled or refunded",
                &["kind"],
            )?,
            amount_wagered: counter_vec(&registry, "amount_wagered_total", "Coins wagered", &["kind"])?,
            amount_paid: counter_vec(&registry, "amount_paid_total", "Coins paid to winners", &["kind"])?,
            bonus_claims: counter(&registry, "bonus_claims_total", "Granted bonus claims")?,
            transfers: counter(&registry, "transfers_total", "Completed transfers")?,
            events_dropped: counter_vec(
                &registry,
                "events_dropped_total",
                "Inbound events dropped before dispatch",
                &["reason"],
            )?,
            active_rounds: gauge(&registry, "active_rounds", "Rounds and lobbies accepting bets")?,
            queued_events: gauge(&registry, "queued_events", "Events waiting for a worker")?,
            registry,
        })
    }

    pub fn bet_placed(&self, kind: GameKind, amount: i64) {
        let label = kind.to_string();
        self.bets_placed.with_label_values(&[&label]).inc();
        self.amount_wagered
            .with_label_values(&[&label])
            .inc_by(amount.max(0) as u64);
    }

    pub fn bet_rejected(&self, reason: &str) {
        self.bets_rejected.with_label_values(&[reason]).inc();
    }

    pub fn round_resolved(&self, kind: GameKind, paid: i64) {
        let label = kind.to_string();
        self.rounds_resolved.with_label_values(&[&label]).inc();
        self.amount_paid.with_label_values(&[&label]).inc_by(paid.max(0) as u64);
    }

    pub fn round_cancelled(&self, kind: GameKind) {
        self.rounds_cancelled.with_label_values(&[&kind.to_string()]).inc();
    }

    pub fn round_opened(&self) {
        self.active_rounds.inc();
    }

    pub fn round_closed(&self) {
        self.active_rounds.dec();
    }

    pub fn bonus_claimed(&self) {
        self.bonus_claims.inc();
    }

    pub fn transfer_completed(&self) {
        self.transfers.inc();
    }

    pub fn event_dropped(&self, reason: &str) {
        self.events_dropped.with_label_values(&[reason]).inc();
    }

    pub fn event_queued(&self) {
        self.queued_events.inc();
    }

    pub fn event_dequeued(&self) {
        self.queued_events.dec();
    }

    pub fn active_rounds(&self) -> i64 {
        self.active_rounds.get()
    }

    /// Render every metric in Prometheus text exposition format
    pub fn encode(&self) -> BotResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
