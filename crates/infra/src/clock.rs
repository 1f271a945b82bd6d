//! Wall-clock access in the seller's timezone.
//!
//! "Today" and "yesterday" are calendar days in the configured timezone, not UTC.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn timezone(&self) -> Tz;

    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.timezone()).date_naive()
    }

    /// Last full day; every sales window ends here.
    fn yesterday(&self) -> NaiveDate {
        let today = self.today();
        today.pred_opt().unwrap_or(today)
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn timezone(&self) -> Tz {
        (**self).timezone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// Settable clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
    tz: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now: RwLock::new(now),
            tz,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.now.write() {
            *guard += chrono::Duration::days(days);
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|g| *g).unwrap_or_else(|p| *p.into_inner())
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_follows_the_configured_timezone() {
        // 22:30 UTC is already the next day in Moscow (UTC+3).
        let clock = FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 31, 22, 30, 0).unwrap(),
            chrono_tz::Europe::Moscow,
        );
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(clock.yesterday(), NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(), chrono_tz::UTC);
        clock.advance_days(7);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 5, 8).unwrap());
    }
}
