use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use pricepilot_core::{DomainError, DomainResult};

/// Inclusive calendar-day range `[start, end]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DomainResult<Self> {
        if start > end {
            return Err(DomainError::validation(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` whole days ending on `end` (inclusive). `days` of 0 is treated as 1.
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let span = u64::from(days.max(1) - 1);
        let start = end.checked_sub_days(Days::new(span)).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// The window of equal length immediately before this one.
    pub fn preceding(&self) -> Self {
        let len = self.days();
        let end = self.start.pred_opt().unwrap_or(NaiveDate::MIN);
        Self::trailing(end, len)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered (at least 1).
    pub fn days(&self) -> u32 {
        (self.end - self.start).num_days() as u32 + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take_while({
            let end = self.end;
            move |d| *d <= end
        })
    }
}

impl core::fmt::Display for DateRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
