use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use std::time::Duration;

use common::{Error, Result};

/// KRX continuous trading session, local time.
const OPEN: (u32, u32) = (9, 0);
const CLOSE: (u32, u32) = (15, 30);

/// Market-hours clock for a single exchange timezone.
///
/// The trading session is weekdays 09:00–15:30 inclusive in the configured
/// timezone (KRX in Asia/Seoul by default).
#[derive(Debug, Clone)]
pub struct MarketClock {
    tz: Tz,
}

impl MarketClock {
    /// Build from an IANA timezone name, e.g. `"Asia/Seoul"`.
    pub fn new(tz_name: &str) -> Result<Self> {
        let tz: Tz = tz_name
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone '{tz_name}'")))?;
        Ok(Self { tz })
    }

    pub fn is_open_now(&self) -> bool {
        self.is_open_at(Utc::now())
    }

    /// Whether the instant falls inside market hours.
    pub fn is_open_at(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.tz);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let now = (local.hour(), local.minute());
        OPEN <= now && now <= CLOSE
    }

    /// Time until the next absolute `interval_min`-minute boundary in the
    /// exchange timezone. Exactly on a boundary, waits a full interval.
    pub fn until_next_boundary(&self, interval_min: u32) -> Duration {
        self.until_next_boundary_at(Utc::now(), interval_min)
    }

    fn until_next_boundary_at(&self, instant: DateTime<Utc>, interval_min: u32) -> Duration {
        let interval_min = interval_min.max(1) as u64;
        let local = instant.with_timezone(&self.tz);
        let into = (local.minute() as u64 % interval_min) * 60 + local.second() as u64;
        Duration::from_secs(interval_min * 60 - into)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}
