//! Subscription Bookkeeping
//!
//! Domain types for tracking which instruments are subscribed at which
//! detail tier, independent of the physical connection. This state is the
//! source of truth: the socket's view is always treated as potentially
//! stale and resynchronized from here on every (re)connect.
//!
//! # Design
//!
//! Two layers of bookkeeping:
//!
//! - [`SubscriptionState`]: the wire-level desired state, one tier-exclusive
//!   set per [`DetailTier`]. Mutated only by explicit subscribe, unsubscribe,
//!   and change-tier calls, never by network events.
//! - [`ListenerRegistry`]: per-consumer interest with reference counting, so
//!   that many independent registrations for the same instrument collapse
//!   into one wire subscription, released only when the last registration
//!   goes away.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::streaming::InstrumentKey;

// =============================================================================
// Detail Tier
// =============================================================================

/// Granularity of live data requested for an instrument.
///
/// Ordered by data richness. An instrument is tracked in at most one tier's
/// set at any moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailTier {
    /// Last-traded-price only.
    Light,
    /// Complete order/OHLC feed.
    Full,
    /// Computed analytics (e.g. option greeks).
    Derived,
}

impl DetailTier {
    /// Get all tiers.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Light, Self::Full, Self::Derived]
    }

    /// The tier name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Full => "full",
            Self::Derived => "derived",
        }
    }
}

impl std::fmt::Display for DetailTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Subscription State
// =============================================================================

/// Desired wire-level subscriptions: one key set per tier.
///
/// Invariant: a key appears in at most one tier's set. Inserting a key into
/// a tier removes it from every other tier first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    light: HashSet<InstrumentKey>,
    full: HashSet<InstrumentKey>,
    derived: HashSet<InstrumentKey>,
}

impl SubscriptionState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `keys` to `tier`, removing each key from any other tier it was in.
    pub fn insert(&mut self, keys: &[InstrumentKey], tier: DetailTier) {
        for key in keys {
            for other in DetailTier::all() {
                if *other != tier {
                    self.set_mut(*other).remove(key);
                }
            }
            self.set_mut(tier).insert(key.clone());
        }
    }

    /// Remove `keys` from every tier's set.
    ///
    /// Removal is unconditional across all tiers so callers need not track
    /// which tier currently holds a key. Returns the keys that were actually
    /// present somewhere.
    pub fn remove(&mut self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let mut removed = Vec::new();
        for key in keys {
            let mut was_present = false;
            for tier in DetailTier::all() {
                was_present |= self.set_mut(*tier).remove(key);
            }
            if was_present {
                removed.push(key.clone());
            }
        }
        removed
    }

    /// Empty all tier sets.
    pub fn clear(&mut self) {
        self.light.clear();
        self.full.clear();
        self.derived.clear();
    }

    /// Check whether any tier has subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.light.is_empty() && self.full.is_empty() && self.derived.is_empty()
    }

    /// The tier currently holding `key`, if any.
    #[must_use]
    pub fn tier_of(&self, key: &str) -> Option<DetailTier> {
        DetailTier::all()
            .iter()
            .copied()
            .find(|tier| self.set(*tier).contains(key))
    }

    /// The key set for one tier.
    #[must_use]
    pub const fn set(&self, tier: DetailTier) -> &HashSet<InstrumentKey> {
        match tier {
            DetailTier::Light => &self.light,
            DetailTier::Full => &self.full,
            DetailTier::Derived => &self.derived,
        }
    }

    /// Every non-empty `(tier, sorted keys)` pair, for replay on reconnect.
    #[must_use]
    pub fn non_empty(&self) -> Vec<(DetailTier, Vec<InstrumentKey>)> {
        DetailTier::all()
            .iter()
            .filter(|tier| !self.set(**tier).is_empty())
            .map(|tier| {
                let mut keys: Vec<_> = self.set(*tier).iter().cloned().collect();
                keys.sort_unstable();
                (*tier, keys)
            })
            .collect()
    }

    /// Per-tier subscription counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            light: self.light.len(),
            full: self.full.len(),
            derived: self.derived.len(),
        }
    }

    const fn set_mut(&mut self, tier: DetailTier) -> &mut HashSet<InstrumentKey> {
        match tier {
            DetailTier::Light => &mut self.light,
            DetailTier::Full => &mut self.full,
            DetailTier::Derived => &mut self.derived,
        }
    }
}

/// Subscription counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Instruments subscribed at the light tier.
    pub light: usize,
    /// Instruments subscribed at the full tier.
    pub full: usize,
    /// Instruments subscribed at the derived tier.
    pub derived: usize,
}

impl SubscriptionStats {
    /// Total subscribed instruments across tiers.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.light + self.full + self.derived
    }
}

// =============================================================================
// Listener Registry
// =============================================================================

/// Handle for one registered consumer interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug)]
struct Registration {
    tier: DetailTier,
    keys: HashSet<InstrumentKey>,
}

/// Reference-counted consumer registrations.
///
/// Multiple consumers (e.g. one per open chart) may register interest in the
/// same instrument. The registry tracks a refcount per key so the wire level
/// sees exactly one subscribe per key, and one unsubscribe only when the
/// last registration for that key is dropped.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: u64,
    registrations: HashMap<u64, Registration>,
    refcount: HashMap<InstrumentKey, usize>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `keys` at `tier`.
    ///
    /// Returns the registration handle and the keys whose refcount went
    /// 0 → 1 (the ones that need a wire subscribe).
    pub fn add(
        &mut self,
        keys: &[InstrumentKey],
        tier: DetailTier,
    ) -> (ListenerId, Vec<InstrumentKey>) {
        let id = self.next_id;
        self.next_id += 1;

        let mut key_set = HashSet::new();
        let mut newly_referenced = Vec::new();

        for key in keys {
            if !key_set.insert(key.clone()) {
                continue;
            }

            let count = self.refcount.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                newly_referenced.push(key.clone());
            }
        }

        self.registrations.insert(
            id,
            Registration {
                tier,
                keys: key_set,
            },
        );

        (ListenerId(id), newly_referenced)
    }

    /// Drop a registration.
    ///
    /// Returns the registration's tier and the keys whose refcount went
    /// 1 → 0 (the ones that need a wire unsubscribe). `None` for an unknown
    /// handle.
    pub fn remove(&mut self, id: ListenerId) -> Option<(DetailTier, Vec<InstrumentKey>)> {
        let registration = self.registrations.remove(&id.0)?;

        let mut released = Vec::new();
        for key in &registration.keys {
            if let Some(count) = self.refcount.get_mut(key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.refcount.remove(key);
                    released.push(key.clone());
                }
            }
        }
        released.sort_unstable();

        Some((registration.tier, released))
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Check whether the registry has no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn keys(names: &[&str]) -> Vec<InstrumentKey> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn insert_adds_to_requested_tier() {
        let mut state = SubscriptionState::new();
        state.insert(&keys(&["NYSE:ACME"]), DetailTier::Light);

        assert_eq!(state.tier_of("NYSE:ACME"), Some(DetailTier::Light));
        assert_eq!(state.stats().total(), 1);
    }

    #[test]
    fn insert_moves_key_between_tiers() {
        let mut state = SubscriptionState::new();
        state.insert(&keys(&["NYSE:ACME"]), DetailTier::Light);
        state.insert(&keys(&["NYSE:ACME"]), DetailTier::Derived);

        assert_eq!(state.tier_of("NYSE:ACME"), Some(DetailTier::Derived));
        assert!(!state.set(DetailTier::Light).contains("NYSE:ACME"));
        assert_eq!(state.stats().total(), 1);
    }

    #[test]
    fn remove_is_unconditional_across_tiers() {
        let mut state = SubscriptionState::new();
        state.insert(&keys(&["A"]), DetailTier::Light);
        state.insert(&keys(&["B"]), DetailTier::Full);

        let removed = state.remove(&keys(&["A", "B", "C"]));

        assert_eq!(removed, keys(&["A", "B"]));
        assert!(state.is_empty());
    }

    #[test]
    fn remove_absent_key_reports_nothing() {
        let mut state = SubscriptionState::new();
        let removed = state.remove(&keys(&["GHOST"]));
        assert!(removed.is_empty());
    }

    #[test]
    fn non_empty_skips_empty_tiers_and_sorts_keys() {
        let mut state = SubscriptionState::new();
        state.insert(&keys(&["B", "A"]), DetailTier::Full);

        let pairs = state.non_empty();

        assert_eq!(pairs, vec![(DetailTier::Full, keys(&["A", "B"]))]);
    }

    #[test]
    fn clear_empties_every_tier() {
        let mut state = SubscriptionState::new();
        state.insert(&keys(&["A"]), DetailTier::Light);
        state.insert(&keys(&["B"]), DetailTier::Derived);

        state.clear();

        assert!(state.is_empty());
        assert_eq!(state.stats().total(), 0);
    }

    #[test]
    fn registry_first_registration_needs_wire_subscribe() {
        let mut registry = ListenerRegistry::new();

        let (_, new) = registry.add(&keys(&["A"]), DetailTier::Light);

        assert_eq!(new, keys(&["A"]));
    }

    #[test]
    fn registry_second_registration_needs_nothing() {
        let mut registry = ListenerRegistry::new();
        registry.add(&keys(&["A"]), DetailTier::Light);

        let (_, new) = registry.add(&keys(&["A"]), DetailTier::Light);

        assert!(new.is_empty());
    }

    #[test]
    fn registry_releases_only_on_last_drop() {
        let mut registry = ListenerRegistry::new();
        let (first, _) = registry.add(&keys(&["A"]), DetailTier::Light);
        let (second, _) = registry.add(&keys(&["A"]), DetailTier::Light);

        let (_, released) = registry.remove(first).unwrap();
        assert!(released.is_empty());

        let (_, released) = registry.remove(second).unwrap();
        assert_eq!(released, keys(&["A"]));
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_duplicate_keys_in_one_registration_count_once() {
        let mut registry = ListenerRegistry::new();

        let (id, new) = registry.add(&keys(&["A", "A"]), DetailTier::Full);
        assert_eq!(new, keys(&["A"]));

        let (_, released) = registry.remove(id).unwrap();
        assert_eq!(released, keys(&["A"]));
    }

    #[test]
    fn registry_unknown_handle_is_none() {
        let mut registry = ListenerRegistry::new();
        let (id, _) = registry.add(&keys(&["A"]), DetailTier::Light);
        registry.remove(id);

        assert!(registry.remove(id).is_none());
    }

    fn arb_op() -> impl Strategy<Value = (u8, String, DetailTier)> {
        (
            0u8..3,
            prop::sample::select(vec!["A", "B", "C", "D"]).prop_map(str::to_string),
            prop::sample::select(vec![DetailTier::Light, DetailTier::Full, DetailTier::Derived]),
        )
    }

    proptest! {
        // A key never shows up in two tier sets, whatever the call sequence.
        #[test]
        fn tier_exclusivity_holds(ops in prop::collection::vec(arb_op(), 0..64)) {
            let mut state = SubscriptionState::new();

            for (op, key, tier) in ops {
                match op {
                    0 => state.insert(&[key], tier),
                    1 => { state.remove(&[key]); }
                    _ => state.insert(&[key], tier), // change-tier is an insert
                }

                for key in ["A", "B", "C", "D"] {
                    let holders = DetailTier::all()
                        .iter()
                        .filter(|t| state.set(**t).contains(key))
                        .count();
                    prop_assert!(holders <= 1, "{key} held by {holders} tiers");
                }
            }
        }
    }
}
