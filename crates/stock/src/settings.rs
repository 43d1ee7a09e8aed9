use std::time::Duration;

use chrono::{DateTime, Utc};

/// Reservation lifetime and sweep cadence.
#[derive(Debug, Clone)]
pub struct ReservationSettings {
    /// How long a reservation holds stock before the sweep expires it.
    pub reservation_ttl: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
}

impl ReservationSettings {
    /// Expiry timestamp for a reservation made at `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.reservation_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Item cache configuration.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub key_prefix: String,
}

impl CacheSettings {
    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            key_prefix: "item:".to_string(),
        }
    }
}
