//! Market Data Streaming Types
//!
//! Canonical types for the live-tick path: outbound wire requests and the
//! decoded per-instrument payloads carried by inbound feed messages. These
//! types are codec-agnostic; the MessagePack framing lives in
//! `infrastructure::feed`.
//!
//! # Payload Tiers
//!
//! Every tracked instrument streams at exactly one detail tier:
//!
//! - `light`: last traded price (and previous close when the venue supplies it)
//! - `full`: last traded price plus an interval-keyed candle set and volume
//! - `derived`: computed analytics (option greeks, implied volatility)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::subscription::DetailTier;

/// Opaque identifier for one tradable instrument in the vendor's addressing
/// scheme (exchange + identifier). Compared by string equality.
pub type InstrumentKey = String;

// =============================================================================
// Outbound Requests
// =============================================================================

/// Wire method for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMethod {
    /// Subscribe the given instruments at a detail tier.
    Sub,
    /// Unsubscribe the given instruments.
    Unsub,
    /// Re-subscribe the given instruments at a new tier without a data gap.
    ChangeMode,
}

/// Request payload: the instruments addressed and, for subscribe/change
/// requests, the requested tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequestData {
    /// Instrument keys addressed by this request.
    #[serde(rename = "instrumentKeys")]
    pub instrument_keys: Vec<InstrumentKey>,

    /// Requested detail tier (absent for unsubscribe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DetailTier>,
}

/// One outbound request envelope.
///
/// # Wire Format (MessagePack map)
/// ```json
/// {
///   "requestId": "7f6b1c1e-...",
///   "method": "sub",
///   "data": {"instrumentKeys": ["NYSE:ACME"], "mode": "full"}
/// }
/// ```
///
/// The request id is a client-generated token the server uses for
/// correlation; the client itself is fire-and-forget and never waits on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Client-generated unique token for this request.
    #[serde(rename = "requestId")]
    pub request_id: String,

    /// Request method.
    pub method: WireMethod,

    /// Request payload.
    pub data: WireRequestData,
}

impl WireRequest {
    /// Create a subscribe request for `keys` at `tier`.
    #[must_use]
    pub fn subscribe(keys: Vec<InstrumentKey>, tier: DetailTier) -> Self {
        Self::new(WireMethod::Sub, keys, Some(tier))
    }

    /// Create an unsubscribe request for `keys`.
    #[must_use]
    pub fn unsubscribe(keys: Vec<InstrumentKey>) -> Self {
        Self::new(WireMethod::Unsub, keys, None)
    }

    /// Create a change-mode request moving `keys` to `tier`.
    #[must_use]
    pub fn change_mode(keys: Vec<InstrumentKey>, tier: DetailTier) -> Self {
        Self::new(WireMethod::ChangeMode, keys, Some(tier))
    }

    fn new(method: WireMethod, keys: Vec<InstrumentKey>, mode: Option<DetailTier>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            data: WireRequestData {
                instrument_keys: keys,
                mode,
            },
        }
    }
}

// =============================================================================
// Inbound Payloads
// =============================================================================

/// One OHLC candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing (or latest) price.
    pub close: Decimal,
}

/// Light-tier tick: last traded price only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightTick {
    /// Last traded price.
    pub last_price: Decimal,

    /// Previous session close, when the venue includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<Decimal>,

    /// Venue timestamp of the trade.
    pub timestamp: DateTime<Utc>,
}

/// Full-tier tick: last price plus candles and volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTick {
    /// Last traded price.
    pub last_price: Decimal,

    /// Previous session close, when the venue includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<Decimal>,

    /// Candles keyed by interval name (`"1m"`, `"1h"`, `"D"`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub candles: BTreeMap<String, Candle>,

    /// Cumulative session volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,

    /// Venue timestamp of the trade.
    pub timestamp: DateTime<Utc>,
}

/// Derived-tier tick: computed analytics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivedTick {
    /// Option delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Decimal>,

    /// Option gamma.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<Decimal>,

    /// Option theta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<Decimal>,

    /// Option vega.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vega: Option<Decimal>,

    /// Implied volatility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implied_volatility: Option<Decimal>,
}

/// Tier-specific payload for one instrument, tagged by tier on the wire.
///
/// # Wire Format (MessagePack map)
/// ```json
/// {"tier": "light", "last_price": 105.2, "timestamp": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum TickPayload {
    /// Last-traded-price tick.
    Light(LightTick),
    /// Full order/OHLC tick.
    Full(FullTick),
    /// Computed-analytics tick.
    Derived(DerivedTick),
}

impl TickPayload {
    /// The tier this payload belongs to.
    #[must_use]
    pub const fn tier(&self) -> DetailTier {
        match self {
            Self::Light(_) => DetailTier::Light,
            Self::Full(_) => DetailTier::Full,
            Self::Derived(_) => DetailTier::Derived,
        }
    }
}

/// One decoded inbound data frame: a mapping from instrument key to its
/// tier-specific payload. Ephemeral: handed to subscribers for the current
/// delivery cycle only, never retained.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedMessage {
    /// Per-instrument payloads in this frame.
    pub ticks: BTreeMap<InstrumentKey, TickPayload>,
}

impl FeedMessage {
    /// Check whether the frame carries no payloads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}
