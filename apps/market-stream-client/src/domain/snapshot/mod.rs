//! Snapshot Baselines and Partial Updates
//!
//! A [`SymbolSnapshot`] is the last known full state of one instrument as the
//! UI displays it. Snapshots originate with the caller; the streaming side
//! only ever computes a [`PartialUpdate`] (the fields touched by one feed
//! message) and merges it onto the baseline, field over field.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::streaming::{InstrumentKey, TickPayload};

/// Candle interval used for the session-level open/high/low fields.
const DAY_INTERVAL: &str = "D";

/// Percent change from the previous session close.
///
/// Returns `None` when the previous close is missing or zero, so the field
/// is omitted rather than producing an infinity or NaN-like artifact.
#[must_use]
pub fn percent_change_today(prev_close: Option<Decimal>, last_price: Decimal) -> Option<Decimal> {
    match prev_close {
        Some(prev) if !prev.is_zero() => Some((last_price - prev) / prev * Decimal::ONE_HUNDRED),
        _ => None,
    }
}

// =============================================================================
// Symbol Snapshot
// =============================================================================

/// Full cached state of one instrument as displayed to the user.
///
/// Every displayed field is optional except the key: a freshly-built
/// watchlist row may know nothing but the instrument it points at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolSnapshot {
    /// Instrument this snapshot describes.
    pub key: InstrumentKey,
    /// Display name.
    pub description: Option<String>,
    /// Previous session close.
    pub prev_close: Option<Decimal>,
    /// Last traded price.
    pub last_price: Option<Decimal>,
    /// Running close for the current session.
    pub day_close: Option<Decimal>,
    /// Percent change versus the previous close.
    pub change_today_pct: Option<Decimal>,
    /// Session open.
    pub day_open: Option<Decimal>,
    /// Session high.
    pub day_high: Option<Decimal>,
    /// Session low.
    pub day_low: Option<Decimal>,
    /// Cumulative session volume.
    pub volume: Option<u64>,
    /// Option delta.
    pub delta: Option<Decimal>,
    /// Option gamma.
    pub gamma: Option<Decimal>,
    /// Option theta.
    pub theta: Option<Decimal>,
    /// Option vega.
    pub vega: Option<Decimal>,
    /// Implied volatility.
    pub implied_volatility: Option<Decimal>,
    /// Timestamp of the last live update applied.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SymbolSnapshot {
    /// Create an empty snapshot for `key`.
    #[must_use]
    pub fn new(key: impl Into<InstrumentKey>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Merge a partial update onto this snapshot, overwriting only the
    /// fields the update carries.
    pub fn apply(&mut self, partial: &PartialUpdate) {
        self.prev_close = partial.prev_close.or(self.prev_close);
        self.last_price = partial.last_price.or(self.last_price);
        self.day_close = partial.day_close.or(self.day_close);
        self.change_today_pct = partial.change_today_pct.or(self.change_today_pct);
        self.day_open = partial.day_open.or(self.day_open);
        self.day_high = partial.day_high.or(self.day_high);
        self.day_low = partial.day_low.or(self.day_low);
        self.volume = partial.volume.or(self.volume);
        self.delta = partial.delta.or(self.delta);
        self.gamma = partial.gamma.or(self.gamma);
        self.theta = partial.theta.or(self.theta);
        self.vega = partial.vega.or(self.vega);
        self.implied_volatility = partial.implied_volatility.or(self.implied_volatility);
        self.updated_at = partial.updated_at.or(self.updated_at);
    }

    /// A copy of this snapshot with `partial` merged in.
    #[must_use]
    pub fn merged(&self, partial: &PartialUpdate) -> Self {
        let mut next = self.clone();
        next.apply(partial);
        next
    }
}

// =============================================================================
// Partial Update
// =============================================================================

/// The subset of snapshot fields touched by one feed message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartialUpdate {
    /// Previous session close, when the tick carried it.
    pub prev_close: Option<Decimal>,
    /// Last traded price.
    pub last_price: Option<Decimal>,
    /// Running close for the current session.
    pub day_close: Option<Decimal>,
    /// Percent change versus the previous close.
    pub change_today_pct: Option<Decimal>,
    /// Session open.
    pub day_open: Option<Decimal>,
    /// Session high.
    pub day_high: Option<Decimal>,
    /// Session low.
    pub day_low: Option<Decimal>,
    /// Cumulative session volume.
    pub volume: Option<u64>,
    /// Option delta.
    pub delta: Option<Decimal>,
    /// Option gamma.
    pub gamma: Option<Decimal>,
    /// Option theta.
    pub theta: Option<Decimal>,
    /// Option vega.
    pub vega: Option<Decimal>,
    /// Implied volatility.
    pub implied_volatility: Option<Decimal>,
    /// Venue timestamp of the tick.
    pub updated_at: Option<DateTime<Utc>>,
}

impl PartialUpdate {
    /// Extract the update a tick payload implies for a baseline whose
    /// previous close is `baseline_prev_close`.
    ///
    /// The tick's own previous close takes precedence over the baseline's
    /// when computing the percent change; a missing or zero previous close
    /// omits the field entirely.
    #[must_use]
    pub fn from_payload(payload: &TickPayload, baseline_prev_close: Option<Decimal>) -> Self {
        match payload {
            TickPayload::Light(tick) => {
                let prev = tick.prev_close.or(baseline_prev_close);
                Self {
                    prev_close: tick.prev_close,
                    last_price: Some(tick.last_price),
                    day_close: Some(tick.last_price),
                    change_today_pct: percent_change_today(prev, tick.last_price),
                    updated_at: Some(tick.timestamp),
                    ..Self::default()
                }
            }
            TickPayload::Full(tick) => {
                let prev = tick.prev_close.or(baseline_prev_close);
                let day = tick.candles.get(DAY_INTERVAL);
                Self {
                    prev_close: tick.prev_close,
                    last_price: Some(tick.last_price),
                    day_close: Some(tick.last_price),
                    change_today_pct: percent_change_today(prev, tick.last_price),
                    day_open: day.map(|c| c.open),
                    day_high: day.map(|c| c.high),
                    day_low: day.map(|c| c.low),
                    volume: tick.volume,
                    updated_at: Some(tick.timestamp),
                    ..Self::default()
                }
            }
            TickPayload::Derived(tick) => Self {
                delta: tick.delta,
                gamma: tick.gamma,
                theta: tick.theta,
                vega: tick.vega,
                implied_volatility: tick.implied_volatility,
                ..Self::default()
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
