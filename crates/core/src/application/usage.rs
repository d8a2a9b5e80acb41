// Usage Ledger - daily and monthly analysis accounting
//
// Periods are UTC calendar days and months taken from the injected clock.
// Every update rolls first, so counts never leak across a boundary even
// between ticks of the background task.

use crate::application::lifecycle::ShutdownToken;
use crate::port::TimeProvider;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageCounters {
    /// Analyses that ran the pipeline (cache misses that completed)
    pub analyses: u64,
    pub cache_hits: u64,
    pub failures: u64,
    /// Sum of `total_tokens` reported by the analyzer
    pub tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub day: NaiveDate,
    /// `YYYY-MM`
    pub month: String,
    pub daily: UsageCounters,
    pub monthly: UsageCounters,
}

#[derive(Debug)]
struct LedgerState {
    day: NaiveDate,
    daily: UsageCounters,
    monthly: UsageCounters,
}

pub struct UsageLedger {
    state: Mutex<LedgerState>,
    time_provider: Arc<dyn TimeProvider>,
}

impl UsageLedger {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        let day = utc_day(time_provider.now_millis());
        Self {
            state: Mutex::new(LedgerState {
                day,
                daily: UsageCounters::default(),
                monthly: UsageCounters::default(),
            }),
            time_provider,
        }
    }

    /// Completed analysis; `usage` is the analyzer's raw accounting data
    pub fn record_analysis(&self, usage: &serde_json::Value) {
        let tokens = token_count(usage);
        self.update(|c| {
            c.analyses += 1;
            c.tokens += tokens;
        });
    }

    pub fn record_cache_hit(&self) {
        self.update(|c| c.cache_hits += 1);
    }

    pub fn record_failure(&self) {
        self.update(|c| c.failures += 1);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let mut state = self.lock();
        self.roll(&mut state);
        UsageSnapshot {
            day: state.day,
            month: format!("{:04}-{:02}", state.day.year(), state.day.month()),
            daily: state.daily,
            monthly: state.monthly,
        }
    }

    /// Reset counters whose period has ended. Returns whether anything rolled.
    pub fn roll_over(&self) -> bool {
        let mut state = self.lock();
        self.roll(&mut state)
    }

    /// Background task: roll periods on each tick until shutdown
    pub async fn run(self: Arc<Self>, tick_every: Duration, mut shutdown: ShutdownToken) {
        let mut tick = interval(tick_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.roll_over();
                }
                _ = shutdown.wait() => break,
            }
        }

        let snapshot = self.snapshot();
        info!(
            day = %snapshot.day,
            analyses_today = snapshot.daily.analyses,
            cache_hits_today = snapshot.daily.cache_hits,
            tokens_month = snapshot.monthly.tokens,
            "Usage ledger stopped"
        );
    }

    fn update(&self, f: impl Fn(&mut UsageCounters)) {
        let mut state = self.lock();
        self.roll(&mut state);
        f(&mut state.daily);
        f(&mut state.monthly);
    }

    fn roll(&self, state: &mut LedgerState) -> bool {
        let today = utc_day(self.time_provider.now_millis());
        if today == state.day {
            return false;
        }

        info!(
            day = %state.day,
            analyses = state.daily.analyses,
            cache_hits = state.daily.cache_hits,
            failures = state.daily.failures,
            tokens = state.daily.tokens,
            "Daily usage closed"
        );
        state.daily = UsageCounters::default();

        if (today.year(), today.month()) != (state.day.year(), state.day.month()) {
            info!(
                month = %format!("{:04}-{:02}", state.day.year(), state.day.month()),
                analyses = state.monthly.analyses,
                tokens = state.monthly.tokens,
                "Monthly usage closed"
            );
            state.monthly = UsageCounters::default();
        }
        state.day = today;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn utc_day(millis: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .date_naive()
}

fn token_count(usage: &serde_json::Value) -> u64 {
    if let Some(total) = usage.get("total_tokens").and_then(|v| v.as_u64()) {
        return total;
    }
    ["prompt_tokens", "completion_tokens", "input_tokens", "output_tokens"]
        .iter()
        .filter_map(|k| usage.get(*k).and_then(|v| v.as_u64()))
        .sum()
}
