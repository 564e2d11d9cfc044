//! Staleness rule deciding when a stage regresses.
//!
//! A state is stale once the time since its last activity anchor meets or
//! exceeds the threshold. A state that has never had an anchor is never
//! stale: it waits for first activity instead of decaying.

use chrono::{DateTime, Duration, Utc};

/// Return whether `last_activity_at` is at least `threshold` before `now`.
///
/// The boundary is inclusive: exactly `threshold` elapsed is stale. An
/// absent anchor is never stale. An anchor in the future (clock skew) is
/// not stale.
pub fn is_stale(
    last_activity_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    last_activity_at.is_some_and(|last| now.signed_duration_since(last) >= threshold)
}

/// The staleness rule with its threshold bound in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayPolicy {
    threshold: Duration,
}

impl DecayPolicy {
    /// Create a policy with the given threshold.
    pub const fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// See [`is_stale`].
    pub fn is_stale(&self, last_activity_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        is_stale(last_activity_at, now, self.threshold)
    }

    /// Time left before the state becomes stale.
    ///
    /// `None` when there is no anchor (the state cannot go stale). Zero
    /// when it is already stale.
    pub fn time_until_stale(
        &self,
        last_activity_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let last = last_activity_at?;
        let elapsed = now.signed_duration_since(last);
        let remaining = self
            .threshold
            .checked_sub(&elapsed)
            .unwrap_or(Duration::zero());
        Some(remaining.max(Duration::zero()))
    }
}

impl Default for DecayPolicy {
    /// One calendar day.
    fn default() -> Self {
        Self::new(Duration::days(1))
    }
}
